//! Builds native metadata trees from the marker segments of a JPEG stream.

use crate::{
    codec::ImageReader,
    error::{Error, Result},
    file::{JpegParser, SegmentKind},
    metadata::{ImageMetadata, MetadataNode, QuantizationTable, UserObject, NATIVE_FORMAT},
};

/// An [`ImageReader`] over an in-memory JPEG file.
///
/// The metadata of the (single) image is read from the marker segments in front of the first
/// scan and cached after the first request.
pub struct JpegReader<'a> {
    jpeg: &'a [u8],
    cached: Option<ImageMetadata>,
}

impl<'a> JpegReader<'a> {
    pub fn new(jpeg: &'a [u8]) -> Self {
        Self { jpeg, cached: None }
    }
}

impl<'a> ImageReader for JpegReader<'a> {
    fn image_count(&self) -> usize {
        1
    }

    fn image_metadata(&mut self, index: usize) -> Result<Option<ImageMetadata>> {
        if index != 0 {
            return Ok(None);
        }
        if self.cached.is_none() {
            self.cached = Some(read_metadata(self.jpeg)?);
        }
        Ok(self.cached.clone())
    }
}

/// Reads the native metadata tree of a JPEG stream.
pub fn read_metadata(jpeg: &[u8]) -> Result<ImageMetadata> {
    let mut variety = MetadataNode::new("JPEGvariety");
    let mut markers = MetadataNode::new("markerSequence");
    let mut seen_dri = false;
    let mut seen_sof = false;

    let mut parser = JpegParser::new(jpeg)?;
    while let Some(segment) = parser.next_segment()? {
        log::trace!("ff {:02x} at {:#x}", segment.marker(), segment.offset());
        let Some(kind) = segment.into_segment_kind() else {
            continue;
        };
        match kind {
            SegmentKind::Jfif(jfif) => {
                if variety.first_element("app0JFIF").is_some() {
                    log::warn!("ignoring repeated JFIF header");
                    continue;
                }
                variety.append_child(
                    MetadataNode::new("app0JFIF")
                        .with_attribute("majorVersion", jfif.major_version())
                        .with_attribute("minorVersion", jfif.minor_version())
                        .with_attribute("resUnits", jfif.units())
                        .with_attribute("Xdensity", jfif.density_x())
                        .with_attribute("Ydensity", jfif.density_y())
                        .with_attribute("thumbWidth", jfif.thumbnail_width())
                        .with_attribute("thumbHeight", jfif.thumbnail_height()),
                );
            }
            SegmentKind::Dqt(dqt) => {
                let mut node = MetadataNode::new("dqt");
                for table in dqt.tables() {
                    let values = QuantizationTable::new(table.natural_order()).map_err(|_| {
                        Error::malformed(format!("quantization table {} contains 0", table.Tq()))
                    })?;
                    node.append_child(
                        MetadataNode::new("dqtable")
                            .with_attribute("elementPrecision", table.Pq())
                            .with_attribute("qtableId", table.Tq())
                            .with_user_object(UserObject::QuantizationTable(values)),
                    );
                }
                markers.append_child(node);
            }
            SegmentKind::Dri(dri) => {
                seen_dri = true;
                markers.append_child(MetadataNode::new("dri").with_attribute("interval", dri.Ri()));
            }
            SegmentKind::Com(com) => {
                markers.append_child(MetadataNode::new("com").with_attribute("comment", com.text()));
            }
            SegmentKind::Sof(sof) => {
                if seen_sof {
                    return Err(Error::malformed("encountered multiple SOF markers"));
                }
                seen_sof = true;

                let Some(process) = sof.sof().process() else {
                    return Err(Error::malformed(format!("invalid SOF marker {:?}", sof.sof())));
                };
                let mut node = MetadataNode::new("sof")
                    .with_attribute("process", process)
                    .with_attribute("samplePrecision", sof.P())
                    .with_attribute("numLines", sof.Y())
                    .with_attribute("samplesPerLine", sof.X())
                    .with_attribute("numFrameComponents", sof.components().len());
                for component in sof.components() {
                    log::trace!("{:?}", component);
                    node.append_child(
                        MetadataNode::new("componentSpec")
                            .with_attribute("componentId", component.Ci())
                            .with_attribute("HsamplingFactor", component.Hi())
                            .with_attribute("VsamplingFactor", component.Vi())
                            .with_attribute("QtableSelector", component.Tqi()),
                    );
                }
                markers.append_child(node);
            }
            SegmentKind::Sos(sos) => {
                let mut node = MetadataNode::new("sos")
                    .with_attribute("numScanComponents", sos.components().len())
                    .with_attribute("startSpectralSelection", sos.Ss())
                    .with_attribute("endSpectralSelection", sos.Se())
                    .with_attribute("approxHigh", sos.Ah())
                    .with_attribute("approxLow", sos.Al());
                for component in sos.components() {
                    node.append_child(
                        MetadataNode::new("scanComponentSpec")
                            .with_attribute("componentSelector", component.Csj())
                            .with_attribute("dcHuffTable", component.Tdj())
                            .with_attribute("acHuffTable", component.Taj()),
                    );
                }
                markers.append_child(node);
            }
        }
    }

    if !seen_sof {
        return Err(Error::malformed("JPEG stream contains no SOF marker"));
    }

    // Without a DRI segment restart markers are disabled; record that as a `dri` without value.
    if !seen_dri {
        markers.append_child(MetadataNode::new("dri"));
    }

    Ok(ImageMetadata::new(
        MetadataNode::new(NATIVE_FORMAT)
            .with_child(variety)
            .with_child(markers),
    ))
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::ErrorKind;

    fn baseline_gray() -> Vec<u8> {
        let mut jpeg = vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x02, 0x01, 0x00, 0x48,
            0x00, 0x48, 0x00, 0x00, // APP0 JFIF
            0xFF, 0xDB, 0x00, 0x43, 0x00, // DQT, Tq=0
        ];
        jpeg.extend(1..=64u8);
        jpeg.extend([
            0xFF, 0xFE, 0x00, 0x05, b'a', b'b', b'c', // COM
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00, // SOF0
            0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // SOS
            0x00, 0x00, 0xFF, 0xD9, // scan data, EOI
        ]);
        jpeg
    }

    #[test]
    fn tree() {
        let metadata = read_metadata(&baseline_gray()).unwrap();
        expect![[r#"
            jpeg_image_1.0
              JPEGvariety
                app0JFIF majorVersion="1" minorVersion="2" resUnits="1" Xdensity="72" Ydensity="72" thumbWidth="0" thumbHeight="0"
              markerSequence
                dqt
                  dqtable elementPrecision="0" qtableId="0" <table [1, 2, 6, 7]..>
                com comment="abc"
                sof process="0" samplePrecision="8" numLines="8" samplesPerLine="8" numFrameComponents="1"
                  componentSpec componentId="1" HsamplingFactor="1" VsamplingFactor="1" QtableSelector="0"
                sos numScanComponents="1" startSpectralSelection="0" endSpectralSelection="63" approxHigh="0" approxLow="0"
                  scanComponentSpec componentSelector="1" dcHuffTable="0" acHuffTable="0"
                dri
        "#]]
        .assert_eq(&metadata.as_tree(NATIVE_FORMAT).unwrap().to_string());
    }

    #[test]
    fn reader() {
        let jpeg = baseline_gray();
        let mut reader = JpegReader::new(&jpeg);
        assert_eq!(reader.image_count(), 1);
        assert!(reader.image_metadata(1).unwrap().is_none());
        let first = reader.image_metadata(0).unwrap().unwrap();
        assert_eq!(reader.image_metadata(0).unwrap(), Some(first));
    }

    #[test]
    fn missing_frame() {
        let err = read_metadata(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadata);
        assert_eq!(err.to_string(), "JPEG stream contains no SOF marker");

        let err = read_metadata(b"not a jpeg").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMetadata);
    }
}
