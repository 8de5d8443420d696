use crate::{
    codec::ImageReader,
    error::{Error, ErrorKind, Result},
    metadata::{ImageMetadata, MetadataNode, QuantizationTable, UserObject, NATIVE_FORMAT},
    reader::JpegReader,
};

use super::DecodeParams;

/// Hands out a fixed metadata tree for image 0.
struct StaticReader(Option<ImageMetadata>);

impl ImageReader for StaticReader {
    fn image_count(&self) -> usize {
        1
    }

    fn image_metadata(&mut self, index: usize) -> Result<Option<ImageMetadata>> {
        Ok(if index == 0 { self.0.clone() } else { None })
    }
}

struct FailingReader;

impl ImageReader for FailingReader {
    fn image_count(&self) -> usize {
        1
    }

    fn image_metadata(&mut self, _: usize) -> Result<Option<ImageMetadata>> {
        Err(Error::malformed("truncated stream"))
    }
}

/// Builds a tree with one `componentSpec` per `(H, V, slot)` and one `dqtable` per slot.
fn tree(components: &[(u8, u8, u8)], slots: &[u8]) -> MetadataNode {
    let mut dqt = MetadataNode::new("dqt");
    for &slot in slots {
        dqt.append_child(
            MetadataNode::new("dqtable")
                .with_attribute("elementPrecision", 0)
                .with_attribute("qtableId", slot)
                .with_user_object(UserObject::QuantizationTable(
                    QuantizationTable::flat(u16::from(slot) + 1).unwrap(),
                )),
        );
    }
    let mut sof = MetadataNode::new("sof").with_attribute("numFrameComponents", components.len());
    for (i, &(h, v, slot)) in components.iter().enumerate() {
        sof.append_child(
            MetadataNode::new("componentSpec")
                .with_attribute("componentId", i + 1)
                .with_attribute("HsamplingFactor", h)
                .with_attribute("VsamplingFactor", v)
                .with_attribute("QtableSelector", slot),
        );
    }
    MetadataNode::new(NATIVE_FORMAT)
        .with_child(MetadataNode::new("JPEGvariety").with_child(MetadataNode::new("app0JFIF")))
        .with_child(
            MetadataNode::new("markerSequence")
                .with_child(dqt)
                .with_child(MetadataNode::new("dri").with_attribute("interval", 8))
                .with_child(sof),
        )
}

fn ycbcr() -> MetadataNode {
    tree(&[(2, 2, 0), (1, 1, 1), (1, 1, 1)], &[0, 1])
}

fn bound(root: MetadataNode) -> DecodeParams {
    let mut params = DecodeParams::new();
    params
        .bind(&mut StaticReader(Some(ImageMetadata::new(root))), 0)
        .unwrap();
    params
}

fn edited(edit: impl FnOnce(&mut MetadataNode)) -> DecodeParams {
    let mut root = ycbcr();
    edit(&mut root);
    bound(root)
}

#[test]
fn unbound() {
    let params = DecodeParams::new();
    assert!(!params.is_bound());
    assert!(!params.has_header_marker());
    assert!(params.decode_to_component_layout());

    let errors = [
        params.h_subsampling(0).unwrap_err(),
        params.v_subsampling(0).unwrap_err(),
        params.quant_table_selector(0).unwrap_err(),
        params.quant_table(0).unwrap_err(),
        params.restart_interval().unwrap_err(),
        params.is_table_info_valid().unwrap_err(),
        params.is_image_info_valid().unwrap_err(),
        params.component_count().unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.kind(), ErrorKind::NotBound);
    }
}

#[test]
fn queries() {
    let params = bound(ycbcr());
    assert!(params.is_bound());
    assert_eq!(params.component_count().unwrap(), 3);
    assert_eq!(params.table_count().unwrap(), 2);

    assert_eq!(params.h_subsampling(0).unwrap(), 2);
    assert_eq!(params.v_subsampling(0).unwrap(), 2);
    assert_eq!(params.h_subsampling(2).unwrap(), 1);
    assert_eq!(params.quant_table_selector(0).unwrap(), 0);
    assert_eq!(params.quant_table_selector(2).unwrap(), 1);
    assert_eq!(params.quant_table(0).unwrap().values(), &[1; 64]);
    assert_eq!(params.quant_table(1).unwrap().values(), &[2; 64]);
    assert_eq!(params.restart_interval().unwrap(), 8);
    assert!(params.has_header_marker());
    assert!(params.is_table_info_valid().unwrap());
    assert!(params.is_image_info_valid().unwrap());
}

#[test]
fn out_of_range() {
    let params = bound(ycbcr());
    for err in [
        params.h_subsampling(3).unwrap_err(),
        params.v_subsampling(3).unwrap_err(),
        params.quant_table_selector(7).unwrap_err(),
        params.quant_table(2).unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }
}

#[test]
fn malformed_attributes() {
    let params = edited(|root| {
        let mut specs = root.elements_mut("componentSpec");
        specs[0].set_attribute("HsamplingFactor", "two");
        specs[1].remove_attribute("VsamplingFactor");
    });
    assert_eq!(
        params.h_subsampling(0).unwrap_err().kind(),
        ErrorKind::MalformedMetadata
    );
    assert_eq!(
        params.v_subsampling(1).unwrap_err().kind(),
        ErrorKind::MalformedMetadata
    );
    assert!(!params.is_image_info_valid().unwrap());

    let params = edited(|root| {
        let mut tables = root.elements_mut("dqtable");
        tables[1].set_user_object(None);
    });
    let err = params.quant_table(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingQuantTable);
    assert!(!params.is_table_info_valid().unwrap());
}

#[test]
fn restart_interval() {
    let params = edited(|root| {
        root.first_element_mut("dri").unwrap().remove_attribute("interval");
    });
    assert_eq!(params.restart_interval().unwrap(), 0);

    let params = edited(|root| {
        root.remove_elements("dri");
    });
    let err = params.restart_interval().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedMetadata);
    assert_eq!(err.to_string(), "metadata contains no dri element");

    for value in ["-1", "x"] {
        let params = edited(|root| {
            root.first_element_mut("dri").unwrap().set_attribute("interval", value);
        });
        let err = params.restart_interval().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadata);
    }
}

#[test]
fn header_marker() {
    let params = edited(|root| {
        root.remove_elements("app0JFIF");
    });
    assert!(!params.has_header_marker());
}

#[test]
fn bind_failures() {
    let mut params = DecodeParams::new();

    let err = params.bind(&mut StaticReader(None), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    let err = params.bind(&mut FailingReader, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    assert_eq!(
        err.to_string(),
        "failed to read metadata of image 0: truncated stream"
    );

    let foreign = ImageMetadata::new(MetadataNode::new("javax_imageio_1.0"));
    let err = params.bind(&mut StaticReader(Some(foreign)), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedMetadata);

    let mut no_components = ycbcr();
    no_components.remove_elements("componentSpec");
    let err = params
        .bind(&mut StaticReader(Some(ImageMetadata::new(no_components))), 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedMetadata);

    let mut no_tables = ycbcr();
    no_tables.remove_elements("dqtable");
    let err = params
        .bind(&mut StaticReader(Some(ImageMetadata::new(no_tables))), 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedMetadata);

    assert!(!params.is_bound());
}

#[test]
fn failed_rebind_keeps_previous_tree() {
    let mut params = bound(ycbcr());
    let mut reader = StaticReader(Some(ImageMetadata::new(tree(&[(1, 1, 0)], &[0]))));

    let err = params.bind(&mut reader, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    assert_eq!(params.component_count().unwrap(), 3);

    params.bind(&mut reader, 0).unwrap();
    assert_eq!(params.component_count().unwrap(), 1);
    assert_eq!(params.h_subsampling(0).unwrap(), 1);
}

#[test]
fn table_validity() {
    // Component 2 refers to slot 2, which is never defined.
    let params = bound(tree(&[(2, 2, 0), (1, 1, 1), (1, 1, 2)], &[0, 1]));
    assert!(!params.is_table_info_valid().unwrap());

    let params = edited(|root| {
        let mut tables = root.elements_mut("dqtable");
        tables[0].set_attribute("qtableId", 4);
    });
    assert!(!params.is_table_info_valid().unwrap());

    // Redefining a slot is fine.
    let params = bound(tree(&[(1, 1, 0)], &[0, 0]));
    assert!(params.is_table_info_valid().unwrap());
}

#[test]
fn image_validity() {
    let params = edited(|root| {
        root.first_element_mut("sof")
            .unwrap()
            .set_attribute("numFrameComponents", 4);
    });
    assert!(!params.is_image_info_valid().unwrap());

    let params = edited(|root| {
        root.first_element_mut("sof")
            .unwrap()
            .remove_attribute("numFrameComponents");
    });
    assert!(params.is_image_info_valid().unwrap());

    let params = edited(|root| {
        let mut specs = root.elements_mut("componentSpec");
        specs[2].set_attribute("componentId", 1);
    });
    assert!(!params.is_image_info_valid().unwrap());

    let params = bound(tree(&[(5, 1, 0)], &[0]));
    assert!(!params.is_image_info_valid().unwrap());

    let params = bound(tree(&[(1, 1, 0), (1, 1, 0)], &[0]));
    assert!(!params.is_image_info_valid().unwrap());
    assert!(params.is_table_info_valid().unwrap());

    let params = edited(|root| {
        root.remove_elements("sof");
        root.first_element_mut("markerSequence")
            .unwrap()
            .append_child(MetadataNode::new("componentSpec").with_attribute("componentId", 1));
    });
    assert!(!params.is_image_info_valid().unwrap());
}

#[test]
fn component_layout_flag() {
    let mut params = DecodeParams::new();
    params.set_decode_to_component_layout(false);
    assert!(!params.decode_to_component_layout());
    params.bind(&mut StaticReader(Some(ImageMetadata::new(ycbcr()))), 0).unwrap();
    assert!(!params.decode_to_component_layout());
}

#[test]
fn from_jpeg_reader() {
    let mut jpeg = vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xDB, 0x00, 0x43, 0x00, // DQT, Tq=0
    ];
    jpeg.extend([16; 64]);
    jpeg.extend([
        0xFF, 0xDD, 0x00, 0x04, 0x00, 0x02, // DRI
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x10, 0x00, 0x10, 0x01, 0x01, 0x21, 0x00, // SOF0
        0xFF, 0xD9, // EOI
    ]);

    let mut params = DecodeParams::new();
    params.bind(&mut JpegReader::new(&jpeg), 0).unwrap();
    assert_eq!(params.h_subsampling(0).unwrap(), 2);
    assert_eq!(params.v_subsampling(0).unwrap(), 1);
    assert_eq!(params.quant_table_selector(0).unwrap(), 0);
    assert_eq!(params.quant_table(0).unwrap().values(), &[16; 64]);
    assert_eq!(params.restart_interval().unwrap(), 2);
    assert!(!params.has_header_marker());
    assert!(params.is_table_info_valid().unwrap());
    assert!(params.is_image_info_valid().unwrap());
}
