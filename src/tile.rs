use crate::error::{Error, ErrorKind, Result};

/// Dimensions and band count of a pixel tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    width: u32,
    height: u32,
    bands: usize,
}

impl TileLayout {
    pub fn new(width: u32, height: u32, bands: usize) -> Self {
        Self {
            width,
            height,
            bands,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Number of samples in a tile with this layout.
    pub fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize * self.bands
    }
}

/// A rectangular block of 8-bit samples, stored pixel-interleaved in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelTile {
    layout: TileLayout,
    data: Vec<u8>,
}

impl PixelTile {
    /// Creates a tile of `width` x `height` pixels with `bands` samples each.
    ///
    /// `data` must hold exactly `width * height * bands` samples.
    pub fn new(width: u32, height: u32, bands: usize, data: Vec<u8>) -> Result<Self> {
        let layout = TileLayout::new(width, height, bands);
        if data.len() != layout.sample_count() {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!(
                    "{width}x{height} tile with {bands} bands needs {} samples, got {}",
                    layout.sample_count(),
                    data.len()
                ),
            ));
        }
        Ok(Self { layout, data })
    }

    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
