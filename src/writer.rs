//! [`ImageWriter`] backed by the `jpeg-encoder` crate.

use std::io::Write;

use jpeg_encoder::{ColorType, Encoder, QuantizationTableType, SamplingFactor};

use crate::{
    codec::{CodingUnit, CompressionMode, ImageWriter, WriteParams, JPEG_FORMAT_NAME},
    color::{ColorModel, ColorSpace},
    error::{Error, ErrorKind, Result},
    file::{JpegParser, SegmentKind},
    metadata::{ImageMetadata, MetadataNode, QuantizationTable, UserObject, NATIVE_FORMAT},
    tile::TileLayout,
};

/// Writes baseline JPEG streams.
///
/// The metadata tree passed to [`ImageWriter::write`] controls the sampling factors, the
/// quantization tables, the restart interval and whether a JFIF header is written. Only layouts
/// the encoder can produce are accepted: one "primary" component (the luma component, or K for
/// CMYK) may be subsampled and uses its own table slot, all other components are 1x1 and share
/// one slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegWriter {
    _p: (),
}

impl JpegWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Default `(H, V, slot)` of each component of the given color space.
fn component_defaults(space: ColorSpace) -> &'static [(u8, u8, u8)] {
    match space {
        ColorSpace::Gray => &[(1, 1, 0)],
        ColorSpace::YCbCr => &[(2, 2, 0), (1, 1, 1), (1, 1, 1)],
        ColorSpace::Cmyk => &[(1, 1, 1), (1, 1, 1), (1, 1, 1), (1, 1, 0)],
    }
}

/// Index of the component carrying the luma table slot and the sampling factor.
fn primary_component(space: ColorSpace) -> usize {
    match space {
        ColorSpace::Gray | ColorSpace::YCbCr => 0,
        ColorSpace::Cmyk => 3,
    }
}

impl ImageWriter for JpegWriter {
    fn format_name(&self) -> &str {
        JPEG_FORMAT_NAME
    }

    fn default_image_metadata(
        &self,
        color_model: &ColorModel,
        layout: &TileLayout,
    ) -> Result<ImageMetadata> {
        if layout.bands() != color_model.num_components() {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!(
                    "tile has {} bands, but the color model has {} components",
                    layout.bands(),
                    color_model.num_components()
                ),
            ));
        }

        let quality = quality_percent(WriteParams::default().compression_quality());
        let defaults = component_defaults(color_model.color_space());

        let mut dqt = MetadataNode::new("dqt");
        let mut sof = MetadataNode::new("sof")
            .with_attribute("process", 0)
            .with_attribute("samplePrecision", 8)
            .with_attribute("numLines", layout.height())
            .with_attribute("samplesPerLine", layout.width())
            .with_attribute("numFrameComponents", defaults.len());
        for (i, &(h, v, slot)) in defaults.iter().enumerate() {
            let table = match slot {
                0 => QuantizationTable::ANNEX_K_LUMA,
                _ => QuantizationTable::ANNEX_K_CHROMA,
            };
            dqt.append_child(
                MetadataNode::new("dqtable")
                    .with_attribute("elementPrecision", 0)
                    .with_attribute("qtableId", slot)
                    .with_user_object(UserObject::QuantizationTable(table.with_quality(quality))),
            );
            sof.append_child(
                MetadataNode::new("componentSpec")
                    .with_attribute("componentId", i + 1)
                    .with_attribute("HsamplingFactor", h)
                    .with_attribute("VsamplingFactor", v)
                    .with_attribute("QtableSelector", slot),
            );
        }

        let jfif = MetadataNode::new("app0JFIF")
            .with_attribute("majorVersion", 1)
            .with_attribute("minorVersion", 2)
            .with_attribute("resUnits", 0)
            .with_attribute("Xdensity", 1)
            .with_attribute("Ydensity", 1)
            .with_attribute("thumbWidth", 0)
            .with_attribute("thumbHeight", 0);

        Ok(ImageMetadata::new(
            MetadataNode::new(NATIVE_FORMAT)
                .with_child(MetadataNode::new("JPEGvariety").with_child(jfif))
                .with_child(
                    MetadataNode::new("markerSequence")
                        .with_child(dqt)
                        .with_child(MetadataNode::new("dri").with_attribute("interval", 0))
                        .with_child(sof),
                ),
        ))
    }

    fn write(
        &mut self,
        metadata: Option<ImageMetadata>,
        unit: CodingUnit<'_>,
        params: &WriteParams,
        out: &mut dyn Write,
    ) -> Result<()> {
        let tile = unit.tile();
        let layout = tile.layout();
        let space = ColorModel::select(layout.bands())?.color_space();
        let width = dimension(layout.width())?;
        let height = dimension(layout.height())?;

        let explicit = params.compression_mode() == CompressionMode::Explicit;
        let quality = quality_percent(if explicit {
            params.compression_quality()
        } else {
            self.default_write_params().compression_quality()
        });

        let settings = match &metadata {
            Some(metadata) => Some(CodingSettings::from_tree(
                metadata.as_tree(NATIVE_FORMAT)?,
                space,
            )?),
            None => None,
        };

        let mut encoded = Vec::new();
        let mut encoder = Encoder::new(&mut encoded, quality);
        if let Some(settings) = &settings {
            log::debug!("coding settings from metadata: {:?}", settings);
            encoder.set_sampling_factor(settings.sampling);
            if explicit {
                log::debug!("explicit quality {quality} replaces the quantization tables");
            } else {
                encoder.set_quantization_tables(settings.luma.clone(), settings.chroma.clone());
            }
            encoder.set_restart_interval(settings.restart_interval);
        }

        let color_type = match space {
            ColorSpace::Gray => ColorType::Luma,
            ColorSpace::YCbCr => ColorType::Ycbcr,
            ColorSpace::Cmyk => ColorType::Cmyk,
        };
        encoder
            .encode(tile.data(), width, height, color_type)
            .map_err(|e| Error::new(ErrorKind::EncodeIo, format!("JPEG encoding failed: {e}")))?;

        match settings {
            Some(settings) if !settings.jfif => out.write_all(&strip_jfif(&encoded)?)?,
            _ => out.write_all(&encoded)?,
        }
        Ok(())
    }
}

/// Encoder settings derived from a native metadata tree.
#[derive(Debug)]
struct CodingSettings {
    sampling: SamplingFactor,
    luma: QuantizationTableType,
    chroma: QuantizationTableType,
    restart_interval: u16,
    jfif: bool,
}

impl CodingSettings {
    fn from_tree(tree: &MetadataNode, space: ColorSpace) -> Result<Self> {
        let specs = tree.elements("componentSpec");
        let expected = component_defaults(space).len();
        if specs.len() != expected {
            return Err(Error::malformed(format!(
                "expected {expected} componentSpec elements, found {}",
                specs.len()
            )));
        }

        let primary_index = primary_component(space);
        let primary = &specs[primary_index];
        let h = sampling_attr(primary, "HsamplingFactor")?;
        let v = sampling_attr(primary, "VsamplingFactor")?;
        let primary_slot = slot_attr(primary)?;

        let sampling = if space == ColorSpace::Gray {
            if (h, v) != (1, 1) {
                log::warn!("sampling factors {h}x{v} have no effect on a single component image");
            }
            SamplingFactor::F_1_1
        } else {
            SamplingFactor::from_factors(h, v).ok_or_else(|| {
                Error::new(
                    ErrorKind::UnsupportedCoding,
                    format!("sampling factors {h}x{v} are not supported by the encoder"),
                )
            })?
        };

        let mut secondary_slot = None;
        for (i, spec) in specs.iter().enumerate() {
            if i == primary_index {
                continue;
            }
            let h = sampling_attr(spec, "HsamplingFactor")?;
            let v = sampling_attr(spec, "VsamplingFactor")?;
            if (h, v) != (1, 1) {
                return Err(Error::new(
                    ErrorKind::UnsupportedCoding,
                    format!("component {i} uses sampling factors {h}x{v}, but only 1x1 is supported"),
                ));
            }
            let slot = slot_attr(spec)?;
            match secondary_slot {
                None => secondary_slot = Some(slot),
                Some(s) if s == slot => {}
                Some(s) => {
                    return Err(Error::new(
                        ErrorKind::UnsupportedCoding,
                        format!("component {i} uses table slot {slot}, but other components use slot {s}"),
                    ))
                }
            }
        }

        if primary_slot != 0 || secondary_slot.map_or(false, |s| s != 1) {
            log::warn!(
                "table slots {primary_slot}/{secondary_slot:?} are renumbered to 0/1 in the output"
            );
        }

        let luma = table_for_slot(tree, primary_slot)?;
        let chroma = match secondary_slot {
            Some(slot) => table_for_slot(tree, slot)?,
            None => QuantizationTableType::Default,
        };

        let restart_interval = match tree.first_element("dri").and_then(|dri| dri.attribute("interval")) {
            Some(value) => value.parse::<u16>().map_err(|_| {
                Error::new(
                    ErrorKind::UnsupportedCoding,
                    format!("restart interval '{value}' is not in range 0-65535"),
                )
            })?,
            None => 0,
        };

        Ok(Self {
            sampling,
            luma,
            chroma,
            restart_interval,
            jfif: tree.first_element("app0JFIF").is_some(),
        })
    }
}

fn sampling_attr(spec: &MetadataNode, name: &str) -> Result<u8> {
    spec.attribute(name)
        .and_then(|value| value.parse::<u8>().ok())
        .ok_or_else(|| Error::malformed(format!("componentSpec has no valid {name}")))
}

fn slot_attr(spec: &MetadataNode) -> Result<u8> {
    spec.attribute("QtableSelector")
        .and_then(|value| value.parse::<u8>().ok())
        .ok_or_else(|| Error::malformed("componentSpec has no valid QtableSelector"))
}

/// Returns the table defined last for `slot`, as later definitions replace earlier ones.
fn table_for_slot(tree: &MetadataNode, slot: u8) -> Result<QuantizationTableType> {
    let slot_str = slot.to_string();
    let node = tree
        .elements("dqtable")
        .into_iter()
        .rev()
        .find(|node| node.attribute("qtableId") == Some(slot_str.as_str()))
        .ok_or_else(|| Error::malformed(format!("no quantization table defined for slot {slot}")))?;
    match node.quantization_table() {
        // The encoder only emits 8-bit DQT segments.
        Some(table) if table.precision() != 0 => Err(Error::new(
            ErrorKind::UnsupportedCoding,
            format!("quantization table for slot {slot} needs 16-bit entries"),
        )),
        Some(table) => Ok(QuantizationTableType::Custom(Box::new(*table.values()))),
        None => Ok(QuantizationTableType::Default),
    }
}

/// Converts a quality in `(0, 1]` to the 1-100 scale of the encoder.
fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn dimension(value: u32) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidParameter,
                format!("tile dimension {value} is not in range 1-65535"),
            )
        })
}

/// Removes the JFIF APP0 segment from an encoded stream.
fn strip_jfif(jpeg: &[u8]) -> Result<Vec<u8>> {
    let mut parser = JpegParser::new(jpeg)?;
    while let Some(segment) = parser.next_segment()? {
        if let Some(SegmentKind::Jfif(_)) = segment.as_segment_kind() {
            let start = segment.offset();
            let end = start + segment.encoded_len();
            let mut out = Vec::with_capacity(jpeg.len() - (end - start));
            out.extend_from_slice(&jpeg[..start]);
            out.extend_from_slice(&jpeg[end..]);
            return Ok(out);
        }
    }
    Ok(jpeg.to_vec())
}
