//! Encoding tiles from generic coding parameters.


use std::{
    io::Write,
    ops::{Deref, DerefMut},
};

use crate::{
    codec::{CodecRegistry, CodingUnit, CompressionMode, ImageWriter, JPEG_FORMAT_NAME},
    color::ColorModel,
    error::{Error, ErrorKind, Result},
    metadata::{ImageMetadata, UserObject, NATIVE_FORMAT},
    params::{
        quantization_table_name, ParameterList, HORIZONTAL_SUBSAMPLING, QUALITY, QUALITY_SET,
        QUANTIZATION_TABLE_MAPPING, RESTART_INTERVAL, VERTICAL_SUBSAMPLING, WRITE_JFIF_HEADER,
    },
    tile::{PixelTile, TileLayout},
};

/// Builds the metadata tree `writer` should encode a tile of the given layout with.
///
/// The tree starts out as the writer's template. For every band whose `quantizationTable{i}`
/// parameter is set, the band's `componentSpec` and `dqtable` entries are overwritten with the
/// band's sampling factors, table slot and table; bands without a table keep the template
/// settings. The restart interval is always written, and the JFIF header is removed if
/// `writeJFIFHeader` is `false`.
///
/// Returns `Ok(None)` if there is no layout, in which case the writer should use its defaults.
pub fn build_metadata(
    writer: &dyn ImageWriter,
    params: &ParameterList,
    layout: Option<&TileLayout>,
) -> Result<Option<ImageMetadata>> {
    let Some(layout) = layout else {
        return Ok(None);
    };
    let color_model = ColorModel::select(layout.bands())?;
    let bands = color_model.num_components();

    let h_sampling = band_array(params, HORIZONTAL_SUBSAMPLING, bands)?;
    let v_sampling = band_array(params, VERTICAL_SUBSAMPLING, bands)?;
    let selectors = band_array(params, QUANTIZATION_TABLE_MAPPING, bands)?;
    let tables = (0..bands)
        .map(|band| params.quantization_table(&quantization_table_name(band)))
        .collect::<Result<Vec<_>>>()?;
    let restart_interval = params.int(RESTART_INTERVAL)?;
    if restart_interval < 0 {
        return Err(Error::new(
            ErrorKind::InvalidParameter,
            format!("restart interval must not be negative, got {restart_interval}"),
        ));
    }
    let write_jfif = params.bool(WRITE_JFIF_HEADER)?;

    let mut metadata = writer.default_image_metadata(&color_model, layout)?;
    let tree = metadata.as_tree_mut(NATIVE_FORMAT)?;

    // Counted with the same traversal that is edited below.
    let component_count = tree.elements_mut("componentSpec").len();
    let table_count = tree.elements_mut("dqtable").len();
    if component_count < bands || table_count < bands {
        return Err(Error::malformed(format!(
            "template of the {} writer has {component_count} componentSpec and {table_count} \
             dqtable elements, but the tile has {bands} bands",
            writer.format_name()
        )));
    }
    if tree.first_element("dri").is_none() {
        return Err(Error::malformed(format!(
            "template of the {} writer contains no dri element",
            writer.format_name()
        )));
    }

    let mut components = tree.elements_mut("componentSpec");
    for (band, table) in tables.iter().enumerate() {
        if table.is_none() {
            log::debug!("no quantization table for band {band}, keeping encoder defaults");
            continue;
        }
        let spec = &mut components[band];
        spec.set_attribute("componentId", band);
        spec.set_attribute("HsamplingFactor", h_sampling[band]);
        spec.set_attribute("VsamplingFactor", v_sampling[band]);
        spec.set_attribute("QtableSelector", selectors[band]);
    }

    let mut dqtables = tree.elements_mut("dqtable");
    for (band, table) in tables.iter().enumerate() {
        let Some(table) = table else { continue };
        let entry = &mut dqtables[band];
        entry.set_attribute("elementPrecision", table.precision());
        entry.set_attribute("qtableId", selectors[band]);
        entry.set_user_object(Some(UserObject::QuantizationTable(**table)));
    }

    if let Some(dri) = tree.first_element_mut("dri") {
        dri.set_attribute("interval", restart_interval);
    }

    if !write_jfif {
        let removed = tree.remove_elements("app0JFIF");
        log::debug!("removed {removed} JFIF header elements");
    }

    Ok(Some(metadata))
}

fn band_array<'a>(params: &'a ParameterList, name: &str, bands: usize) -> Result<&'a [i32]> {
    let values = params.int_array(name)?;
    if values.len() != bands {
        return Err(Error::new(
            ErrorKind::ArrayLengthMismatch,
            format!(
                "parameter '{name}' has {} entries, but the tile has {bands} bands",
                values.len()
            ),
        ));
    }
    Ok(values)
}

/// Encodes pixel tiles as JPEG using a writer from a [`CodecRegistry`].
#[derive(Debug)]
pub struct TileEncoder {
    registry: CodecRegistry,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(CodecRegistry::with_defaults())
    }
}

impl TileEncoder {
    pub fn new(registry: CodecRegistry) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Encodes `tile` into `out` as configured by `params`.
    ///
    /// `out` is flushed on success and dropped before this returns. The writer is disposed on
    /// every path once it has been created.
    pub fn encode<W: Write>(
        &self,
        tile: Option<&PixelTile>,
        params: &ParameterList,
        mut out: W,
    ) -> Result<()> {
        let tile = tile.ok_or_else(|| Error::new(ErrorKind::NullTile, "no tile to encode"))?;
        let writer = self.registry.writer_for(JPEG_FORMAT_NAME).ok_or_else(|| {
            Error::new(
                ErrorKind::EncoderUnavailable,
                format!("no writer registered for format '{JPEG_FORMAT_NAME}'"),
            )
        })?;
        let mut writer = DisposeOnDrop(writer);

        let metadata = build_metadata(&*writer, params, Some(tile.layout()))?;

        let mut write_params = writer.default_write_params();
        if params.bool(QUALITY_SET)? {
            let quality = params.float(QUALITY)?;
            if !(quality > 0.0 && quality <= 1.0) {
                return Err(Error::new(
                    ErrorKind::InvalidParameter,
                    format!("quality must be in (0, 1], got {quality}"),
                ));
            }
            write_params.set_compression_mode(CompressionMode::Explicit);
            write_params.set_compression_quality(quality);
        }

        log::debug!(
            "encoding {}x{} tile with {} bands ({:?})",
            tile.layout().width(),
            tile.layout().height(),
            tile.layout().bands(),
            write_params,
        );
        writer.write(metadata, CodingUnit::new(tile), &write_params, &mut out)?;
        out.flush()?;
        Ok(())
    }
}

/// Owns a writer and disposes it when dropped.
struct DisposeOnDrop(Box<dyn ImageWriter>);

impl Deref for DisposeOnDrop {
    type Target = dyn ImageWriter;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for DisposeOnDrop {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for DisposeOnDrop {
    fn drop(&mut self) {
        log::trace!("disposing {} writer", self.0.format_name());
        self.0.dispose();
    }
}
