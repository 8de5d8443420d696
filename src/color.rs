//! Color models for the band counts a JPEG frame can carry.

use crate::error::{Error, ErrorKind, Result};

/// The band counts that have a JPEG color model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandCount {
    One,
    Three,
    Four,
}

impl BandCount {
    #[inline]
    pub fn get(self) -> usize {
        match self {
            Self::One => 1,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

impl TryFrom<usize> for BandCount {
    type Error = Error;

    fn try_from(bands: usize) -> Result<Self> {
        match bands {
            1 => Ok(Self::One),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            n => Err(Error::new(
                ErrorKind::UnsupportedBandCount,
                format!("no JPEG color model for {n} bands (only 1, 3 and 4 are supported)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    YCbCr,
    Cmyk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
}

/// Storage type of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
}

/// Describes how the bands of a pixel tile are interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorModel {
    space: ColorSpace,
    bits: Vec<u8>,
    has_alpha: bool,
    premultiplied: bool,
    transparency: Transparency,
    sample_type: SampleType,
}

impl ColorModel {
    /// Returns the color model used for encoding a tile with `band_count` bands.
    ///
    /// 1 band is grayscale, 3 bands are YCbCr, 4 bands are CMYK, all with 8 bits per band. Any
    /// other band count fails with [`ErrorKind::UnsupportedBandCount`].
    pub fn select(band_count: usize) -> Result<Self> {
        let bands = BandCount::try_from(band_count)?;
        let space = match bands {
            BandCount::One => ColorSpace::Gray,
            BandCount::Three => ColorSpace::YCbCr,
            BandCount::Four => ColorSpace::Cmyk,
        };
        Ok(Self {
            space,
            bits: vec![8; bands.get()],
            has_alpha: false,
            premultiplied: false,
            transparency: Transparency::Opaque,
            sample_type: SampleType::U8,
        })
    }

    #[inline]
    pub fn color_space(&self) -> ColorSpace {
        self.space
    }

    #[inline]
    pub fn num_components(&self) -> usize {
        self.bits.len()
    }

    /// Returns the number of bits of each band.
    #[inline]
    pub fn component_bits(&self) -> &[u8] {
        &self.bits
    }

    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    #[inline]
    pub fn is_alpha_premultiplied(&self) -> bool {
        self.premultiplied
    }

    #[inline]
    pub fn transparency(&self) -> Transparency {
        self.transparency
    }

    #[inline]
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }
}
