//! Interfaces to the codec backends that do the actual encoding and decoding.

use std::{fmt, io::Write};

use crate::{
    color::ColorModel,
    error::Result,
    metadata::ImageMetadata,
    tile::{PixelTile, TileLayout},
    writer::JpegWriter,
};

/// Format name under which the JPEG writer is registered.
pub const JPEG_FORMAT_NAME: &str = "jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// Let the encoder pick its compression settings.
    Default,
    /// Use the quality set via [`WriteParams::set_compression_quality`].
    Explicit,
}

/// Per-write settings of an [`ImageWriter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteParams {
    mode: CompressionMode,
    quality: f32,
}

impl Default for WriteParams {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Default,
            quality: 0.75,
        }
    }
}

impl WriteParams {
    #[inline]
    pub fn compression_mode(&self) -> CompressionMode {
        self.mode
    }

    pub fn set_compression_mode(&mut self, mode: CompressionMode) {
        self.mode = mode;
    }

    /// Returns the compression quality in `(0, 1]`.
    #[inline]
    pub fn compression_quality(&self) -> f32 {
        self.quality
    }

    pub fn set_compression_quality(&mut self, quality: f32) {
        self.quality = quality;
    }
}

/// A single image handed to an [`ImageWriter`]: pixel data only, without thumbnails.
#[derive(Debug, Clone, Copy)]
pub struct CodingUnit<'a> {
    tile: &'a PixelTile,
}

impl<'a> CodingUnit<'a> {
    pub fn new(tile: &'a PixelTile) -> Self {
        Self { tile }
    }

    #[inline]
    pub fn tile(&self) -> &'a PixelTile {
        self.tile
    }
}

/// An encoder backend producing a bitstream from pixels and a metadata tree.
pub trait ImageWriter {
    fn format_name(&self) -> &str;

    /// Returns the metadata tree the writer would use for an image with the given color model
    /// and layout. Callers adjust this template and pass it back to [`ImageWriter::write`].
    fn default_image_metadata(
        &self,
        color_model: &ColorModel,
        layout: &TileLayout,
    ) -> Result<ImageMetadata>;

    fn default_write_params(&self) -> WriteParams {
        WriteParams::default()
    }

    /// Encodes `unit` to `out`.
    ///
    /// Without `metadata`, the writer uses its defaults for everything.
    fn write(
        &mut self,
        metadata: Option<ImageMetadata>,
        unit: CodingUnit<'_>,
        params: &WriteParams,
        out: &mut dyn Write,
    ) -> Result<()>;

    /// Releases resources held by the writer. The writer is not used afterwards.
    fn dispose(&mut self) {}
}

/// A decoder backend that exposes the metadata of the images in a stream.
pub trait ImageReader {
    fn image_count(&self) -> usize;

    /// Returns the metadata of image `index`, or `None` if the stream has no such image.
    fn image_metadata(&mut self, index: usize) -> Result<Option<ImageMetadata>>;
}

type WriterFactory = Box<dyn Fn() -> Box<dyn ImageWriter>>;

/// Maps format names to [`ImageWriter`] factories.
#[derive(Default)]
pub struct CodecRegistry {
    writers: Vec<(String, WriterFactory)>,
}

impl CodecRegistry {
    /// Creates a registry without any writers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in [`JpegWriter`] registered as `"jpeg"`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_writer(JPEG_FORMAT_NAME, || Box::new(JpegWriter::new()));
        registry
    }

    pub fn register_writer<F>(&mut self, format: &str, factory: F)
    where
        F: Fn() -> Box<dyn ImageWriter> + 'static,
    {
        self.writers.push((format.to_string(), Box::new(factory)));
    }

    /// Creates a writer for `format`. When several are registered, the last one wins.
    pub fn writer_for(&self, format: &str) -> Option<Box<dyn ImageWriter>> {
        self.writers
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case(format))
            .map(|(_, factory)| factory())
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.writers.iter().map(|(name, _)| name))
            .finish()
    }
}
