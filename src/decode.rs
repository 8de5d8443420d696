//! Read-only access to the coding parameters recorded in a decoder's metadata tree.

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use crate::{
    codec::ImageReader,
    error::{Error, ErrorKind, Result},
    metadata::{MetadataNode, QuantizationTable, NATIVE_FORMAT},
};

/// Coding parameters of one decoded image.
///
/// A new view is unbound; [`DecodeParams::bind`] fetches and caches the metadata of an image.
/// Until then, all queries except [`DecodeParams::has_header_marker`] fail with
/// [`ErrorKind::NotBound`].
#[derive(Debug, Clone)]
pub struct DecodeParams {
    state: State,
    decode_to_component_layout: bool,
}

#[derive(Debug, Clone)]
enum State {
    Unbound,
    Bound(Bound),
}

#[derive(Debug, Clone)]
struct Bound {
    tree: MetadataNode,
    components: Vec<MetadataNode>,
    tables: Vec<MetadataNode>,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            state: State::Unbound,
            decode_to_component_layout: true,
        }
    }
}

impl DecodeParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the view to the metadata of image `image_index` of `reader`.
    ///
    /// On failure, the view keeps whatever it was bound to before.
    pub fn bind(&mut self, reader: &mut dyn ImageReader, image_index: usize) -> Result<()> {
        let metadata = match reader.image_metadata(image_index) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                return Err(Error::new(
                    ErrorKind::MetadataUnavailable,
                    format!(
                        "no metadata for image {image_index} (reader has {} images)",
                        reader.image_count()
                    ),
                ))
            }
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::MetadataUnavailable,
                    format!("failed to read metadata of image {image_index}: {e}"),
                ))
            }
        };

        let tree = metadata.as_tree(NATIVE_FORMAT)?;
        let components = tree
            .elements("componentSpec")
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        if components.is_empty() {
            return Err(Error::malformed("metadata contains no componentSpec element"));
        }
        let tables = tree
            .elements("dqtable")
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        if tables.is_empty() {
            return Err(Error::malformed("metadata contains no dqtable element"));
        }

        log::debug!(
            "bound to image {image_index}: {} components, {} quantization tables",
            components.len(),
            tables.len()
        );
        self.state = State::Bound(Bound {
            tree: metadata.into_tree(),
            components,
            tables,
        });
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, State::Bound(_))
    }

    fn bound(&self) -> Result<&Bound> {
        match &self.state {
            State::Bound(bound) => Ok(bound),
            State::Unbound => Err(Error::new(
                ErrorKind::NotBound,
                "decode parameters are not bound to any image metadata",
            )),
        }
    }

    /// Number of components recorded in the bound metadata.
    pub fn component_count(&self) -> Result<usize> {
        Ok(self.bound()?.components.len())
    }

    /// Number of quantization table entries recorded in the bound metadata.
    pub fn table_count(&self) -> Result<usize> {
        Ok(self.bound()?.tables.len())
    }

    pub fn h_subsampling(&self, component: usize) -> Result<i32> {
        self.bound()?.component_attr(component, "HsamplingFactor")
    }

    pub fn v_subsampling(&self, component: usize) -> Result<i32> {
        self.bound()?.component_attr(component, "VsamplingFactor")
    }

    /// Returns the table slot the component refers to.
    ///
    /// This is not necessarily the index of a table entry: components can share a slot.
    pub fn quant_table_selector(&self, component: usize) -> Result<i32> {
        self.bound()?.component_attr(component, "QtableSelector")
    }

    /// Returns the quantization table of entry `index`.
    pub fn quant_table(&self, index: usize) -> Result<&QuantizationTable> {
        let bound = self.bound()?;
        let node = bound.tables.get(index).ok_or_else(|| {
            Error::new(
                ErrorKind::IndexOutOfRange,
                format!(
                    "quantization table index {index} out of range (metadata has {} tables)",
                    bound.tables.len()
                ),
            )
        })?;
        node.quantization_table().ok_or_else(|| {
            Error::new(
                ErrorKind::MissingQuantTable,
                format!("quantization table entry {index} carries no table"),
            )
        })
    }

    /// Returns the restart interval in MCUs, 0 if restart markers are disabled.
    pub fn restart_interval(&self) -> Result<i32> {
        let bound = self.bound()?;
        let dri = bound
            .tree
            .first_element("dri")
            .ok_or_else(|| Error::malformed("metadata contains no dri element"))?;
        match dri.attribute("interval") {
            None => Ok(0),
            Some(value) => value
                .parse::<i32>()
                .ok()
                .filter(|&v| v >= 0)
                .ok_or_else(|| Error::malformed(format!("invalid restart interval '{value}'"))),
        }
    }

    /// Returns whether the image has a JFIF header. An unbound view has none.
    pub fn has_header_marker(&self) -> bool {
        match &self.state {
            State::Bound(bound) => bound.tree.first_element("app0JFIF").is_some(),
            State::Unbound => false,
        }
    }

    /// Checks that the quantization tables are consistent with the components using them.
    ///
    /// Returns `false` if an entry has an invalid slot id or no table, if more than 4 slots are
    /// defined, or if a component refers to a slot that no entry defines.
    pub fn is_table_info_valid(&self) -> Result<bool> {
        let bound = self.bound()?;
        let mut slots = BTreeSet::new();
        for table in &bound.tables {
            let Some(slot) = parse_attr(table, "qtableId").filter(|id| (0..=3).contains(id)) else {
                log::debug!("quantization table entry has no valid qtableId");
                return Ok(false);
            };
            if table.quantization_table().is_none() {
                log::debug!("quantization table entry for slot {slot} carries no table");
                return Ok(false);
            }
            slots.insert(slot);
        }
        if slots.is_empty() || slots.len() > 4 {
            return Ok(false);
        }

        for (i, component) in bound.components.iter().enumerate() {
            match parse_attr(component, "QtableSelector") {
                Some(slot) if slots.contains(&slot) => {}
                selector => {
                    log::debug!("component {i} refers to undefined table slot {selector:?}");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Checks the frame header: component count, sampling factors and component ids.
    pub fn is_image_info_valid(&self) -> Result<bool> {
        let bound = self.bound()?;
        let Some(sof) = bound.tree.first_element("sof") else {
            log::debug!("metadata contains no sof element");
            return Ok(false);
        };

        let count = bound.components.len();
        if ![1, 3, 4].contains(&count) {
            log::debug!("unsupported component count {count}");
            return Ok(false);
        }
        if sof.has_attribute("numFrameComponents")
            && parse_attr(sof, "numFrameComponents") != Some(count as i32)
        {
            log::debug!(
                "numFrameComponents={:?} does not match {count} components",
                sof.attribute("numFrameComponents")
            );
            return Ok(false);
        }

        let mut ids = BTreeSet::new();
        for component in &bound.components {
            for name in ["HsamplingFactor", "VsamplingFactor"] {
                if !parse_attr(component, name).map_or(false, |f| (1..=4).contains(&f)) {
                    log::debug!("invalid {name} {:?}", component.attribute(name));
                    return Ok(false);
                }
            }
            match parse_attr(component, "componentId") {
                Some(id) if ids.insert(id) => {}
                id => {
                    log::debug!("missing or repeated componentId {id:?}");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    pub fn decode_to_component_layout(&self) -> bool {
        self.decode_to_component_layout
    }

    /// Sets whether downstream decoders should produce one raster per component instead of a
    /// converted color image. This is not interpreted by the view itself.
    pub fn set_decode_to_component_layout(&mut self, value: bool) {
        self.decode_to_component_layout = value;
    }
}

impl Bound {
    fn component_attr(&self, component: usize, name: &str) -> Result<i32> {
        let node = self.components.get(component).ok_or_else(|| {
            Error::new(
                ErrorKind::IndexOutOfRange,
                format!(
                    "component index {component} out of range (metadata has {} components)",
                    self.components.len()
                ),
            )
        })?;
        let value = node.attribute(name).ok_or_else(|| {
            Error::malformed(format!("componentSpec {component} has no {name} attribute"))
        })?;
        value.parse().map_err(|_| {
            Error::malformed(format!(
                "{name} of componentSpec {component} is not an integer: '{value}'"
            ))
        })
    }
}

fn parse_attr(node: &MetadataNode, name: &str) -> Option<i32> {
    node.attribute(name)?.parse().ok()
}
