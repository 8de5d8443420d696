//! Object model for structured JPEG image metadata.
//!
//! Metadata is a tree of named [`MetadataNode`]s. Each node carries string attributes, child
//! nodes, and optionally a [`UserObject`] (quantization tables are attached this way). Lookups by
//! element name walk the tree depth-first in document order.

use std::fmt;

use crate::error::{Error, ErrorKind, Result};

/// Format tag of the native JPEG metadata tree.
pub const NATIVE_FORMAT: &str = "jpeg_image_1.0";

/// A table of 64 quantization step sizes in natural (row-major) order.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QuantizationTable {
    values: [u16; 64],
}

impl QuantizationTable {
    /// Sample luminance table from Annex K (Table K.1) of ITU-T T.81.
    pub const ANNEX_K_LUMA: Self = Self {
        values: [
            16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57,
            69, 56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55,
            64, 81, 104, 113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100,
            103, 99,
        ],
    };

    /// Sample chrominance table from Annex K (Table K.2) of ITU-T T.81.
    pub const ANNEX_K_CHROMA: Self = Self {
        values: [
            17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99,
            99, 99, 47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
            99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
        ],
    };

    /// Creates a table from 64 step sizes in natural order.
    ///
    /// Fails with [`ErrorKind::InvalidParameter`] if any entry is 0.
    pub fn new(values: [u16; 64]) -> Result<Self> {
        if let Some(pos) = values.iter().position(|&v| v == 0) {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("quantization table entry {pos} is 0"),
            ));
        }
        Ok(Self { values })
    }

    /// Creates a table where every entry is `value`.
    pub fn flat(value: u16) -> Result<Self> {
        Self::new([value; 64])
    }

    /// Scales the table for an IJG quality percentage (1-100, 50 leaves the table unchanged).
    ///
    /// Scaled entries are clamped to 1..=255 so the result stays a baseline table.
    pub fn with_quality(&self, quality: u8) -> Self {
        let quality = u32::from(quality.clamp(1, 100));
        let scale = if quality < 50 {
            5000 / quality
        } else {
            200 - quality * 2
        };
        let mut values = self.values;
        for v in &mut values {
            *v = ((u32::from(*v) * scale + 50) / 100).clamp(1, 255) as u16;
        }
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[u16; 64] {
        &self.values
    }

    /// Returns the element precision as stored in a DQT segment.
    ///
    /// - 0: every entry fits in 8 bits
    /// - 1: 16-bit entries are needed
    pub fn precision(&self) -> u8 {
        if self.values.iter().all(|&v| v <= 0xff) {
            0
        } else {
            1
        }
    }
}

impl fmt::Debug for QuantizationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationTable")
            .field("precision", &self.precision())
            .field("values", &self.values)
            .finish()
    }
}

/// An opaque object attached to a [`MetadataNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UserObject {
    QuantizationTable(QuantizationTable),
}

/// A named element of a metadata tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<MetadataNode>,
    user_object: Option<UserObject>,
}

impl MetadataNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            user_object: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: MetadataNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_user_object(mut self, object: UserObject) -> Self {
        self.user_object = Some(object);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[inline]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Sets an attribute, replacing an existing value of the same name in place.
    pub fn set_attribute(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(n, _)| n == name)?;
        Some(self.attributes.remove(pos).1)
    }

    #[inline]
    pub fn children(&self) -> &[MetadataNode] {
        &self.children
    }

    pub fn append_child(&mut self, child: MetadataNode) {
        self.children.push(child);
    }

    #[inline]
    pub fn user_object(&self) -> Option<&UserObject> {
        self.user_object.as_ref()
    }

    pub fn set_user_object(&mut self, object: Option<UserObject>) {
        self.user_object = object;
    }

    /// Returns the quantization table attached to this node, if any.
    pub fn quantization_table(&self) -> Option<&QuantizationTable> {
        match &self.user_object {
            Some(UserObject::QuantizationTable(table)) => Some(table),
            None => None,
        }
    }

    /// Returns the first descendant named `tag`, in document order.
    pub fn first_element(&self, tag: &str) -> Option<&MetadataNode> {
        for child in &self.children {
            if child.name == tag {
                return Some(child);
            }
            if let Some(found) = child.first_element(tag) {
                return Some(found);
            }
        }
        None
    }

    pub fn first_element_mut(&mut self, tag: &str) -> Option<&mut MetadataNode> {
        for child in &mut self.children {
            if child.name == tag {
                return Some(child);
            }
            if let Some(found) = child.first_element_mut(tag) {
                return Some(found);
            }
        }
        None
    }

    /// Returns all descendants named `tag`, in document order.
    pub fn elements(&self, tag: &str) -> Vec<&MetadataNode> {
        fn collect<'a>(node: &'a MetadataNode, tag: &str, out: &mut Vec<&'a MetadataNode>) {
            for child in &node.children {
                if child.name == tag {
                    out.push(child);
                }
                collect(child, tag, out);
            }
        }

        let mut out = Vec::new();
        collect(self, tag, &mut out);
        out
    }

    /// Returns mutable references to all descendants named `tag`, in document order.
    ///
    /// Matching elements are not searched for nested matches.
    pub fn elements_mut(&mut self, tag: &str) -> Vec<&mut MetadataNode> {
        fn collect<'a>(node: &'a mut MetadataNode, tag: &str, out: &mut Vec<&'a mut MetadataNode>) {
            for child in &mut node.children {
                if child.name == tag {
                    out.push(child);
                } else {
                    collect(child, tag, out);
                }
            }
        }

        let mut out = Vec::new();
        collect(self, tag, &mut out);
        out
    }

    /// Removes every descendant named `tag` and returns how many were removed.
    pub fn remove_elements(&mut self, tag: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|child| child.name != tag);
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            removed += child.remove_elements(tag);
        }
        removed
    }

    fn dump(&self, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.name, indent = depth * 2)?;
        for (name, value) in &self.attributes {
            write!(f, " {name}=\"{value}\"")?;
        }
        if let Some(UserObject::QuantizationTable(table)) = &self.user_object {
            write!(f, " <table {:?}..>", &table.values()[..4])?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.dump(depth + 1, f)?;
        }
        Ok(())
    }
}

/// Prints the tree rooted at this node, one element per line.
impl fmt::Display for MetadataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(0, f)
    }
}

/// Metadata of one image: a tree together with the format tag it is expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    root: MetadataNode,
}

impl ImageMetadata {
    /// Wraps a tree. The name of `root` is the format tag.
    pub fn new(root: MetadataNode) -> Self {
        Self { root }
    }

    #[inline]
    pub fn native_format_name(&self) -> &str {
        self.root.name()
    }

    /// Returns the tree in the requested format.
    pub fn as_tree(&self, format: &str) -> Result<&MetadataNode> {
        self.check_format(format)?;
        Ok(&self.root)
    }

    pub fn as_tree_mut(&mut self, format: &str) -> Result<&mut MetadataNode> {
        self.check_format(format)?;
        Ok(&mut self.root)
    }

    pub fn into_tree(self) -> MetadataNode {
        self.root
    }

    fn check_format(&self, format: &str) -> Result<()> {
        if self.root.name() != format {
            return Err(Error::malformed(format!(
                "metadata format '{format}' requested, but only '{}' is available",
                self.root.name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    fn sample() -> MetadataNode {
        MetadataNode::new(NATIVE_FORMAT)
            .with_child(
                MetadataNode::new("JPEGvariety")
                    .with_child(MetadataNode::new("app0JFIF").with_attribute("majorVersion", 1)),
            )
            .with_child(
                MetadataNode::new("markerSequence")
                    .with_child(
                        MetadataNode::new("dqt").with_child(
                            MetadataNode::new("dqtable")
                                .with_attribute("qtableId", 0)
                                .with_user_object(UserObject::QuantizationTable(
                                    QuantizationTable::ANNEX_K_LUMA,
                                )),
                        ),
                    )
                    .with_child(
                        MetadataNode::new("sof")
                            .with_child(MetadataNode::new("componentSpec").with_attribute("componentId", 1))
                            .with_child(MetadataNode::new("componentSpec").with_attribute("componentId", 2)),
                    ),
            )
    }

    #[test]
    fn dump() {
        expect![[r#"
            jpeg_image_1.0
              JPEGvariety
                app0JFIF majorVersion="1"
              markerSequence
                dqt
                  dqtable qtableId="0" <table [16, 11, 10, 16]..>
                sof
                  componentSpec componentId="1"
                  componentSpec componentId="2"
        "#]]
        .assert_eq(&sample().to_string());
    }

    #[test]
    fn element_lookup() {
        let tree = sample();
        let specs = tree.elements("componentSpec");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].attribute("componentId"), Some("1"));
        assert_eq!(specs[1].attribute("componentId"), Some("2"));
        assert!(tree.first_element("dri").is_none());
        assert_eq!(
            tree.first_element("dqtable").unwrap().quantization_table(),
            Some(&QuantizationTable::ANNEX_K_LUMA)
        );
    }

    #[test]
    fn mutation() {
        let mut tree = sample();
        for (i, spec) in tree.elements_mut("componentSpec").into_iter().enumerate() {
            spec.set_attribute("componentId", i);
            spec.set_attribute("QtableSelector", 0);
        }
        let specs = tree.elements("componentSpec");
        assert_eq!(specs[0].attribute("componentId"), Some("0"));
        assert_eq!(specs[1].attribute("componentId"), Some("1"));
        assert_eq!(
            specs[1].attributes().collect::<Vec<_>>(),
            [("componentId", "1"), ("QtableSelector", "0")]
        );

        assert_eq!(tree.remove_elements("app0JFIF"), 1);
        assert_eq!(tree.remove_elements("app0JFIF"), 0);
        assert!(tree.first_element("JPEGvariety").is_some());

        let sof = tree.first_element_mut("sof").unwrap();
        assert_eq!(sof.remove_attribute("missing"), None);
        sof.set_attribute("numFrameComponents", 2);
        assert_eq!(sof.remove_attribute("numFrameComponents").as_deref(), Some("2"));
    }

    #[test]
    fn format_tag() {
        let mut metadata = ImageMetadata::new(sample());
        assert_eq!(metadata.native_format_name(), NATIVE_FORMAT);
        assert!(metadata.as_tree(NATIVE_FORMAT).is_ok());
        let err = metadata.as_tree_mut("other_format").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadata);
    }

    #[test]
    fn table_precision() {
        assert_eq!(QuantizationTable::ANNEX_K_CHROMA.precision(), 0);
        assert_eq!(QuantizationTable::flat(300).unwrap().precision(), 1);
        let mut values = [1; 64];
        values[63] = 0;
        let err = QuantizationTable::new(values).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn quality_scaling() {
        let luma = QuantizationTable::ANNEX_K_LUMA;
        assert_eq!(luma.with_quality(50), luma);
        assert_eq!(luma.with_quality(75).values()[..4], [8, 6, 5, 8]);
        assert!(luma.with_quality(100).values().iter().all(|&v| v == 1));
        assert!(luma.with_quality(1).values().iter().all(|&v| v == 255));
    }
}
