//! Generic, codec-agnostic tile coding parameters.

use std::collections::HashMap;

use crate::error::{Error, ErrorKind, Result};
use crate::metadata::QuantizationTable;

/// Whether [`QUALITY`] should be forced on the encoder (`bool`).
pub const QUALITY_SET: &str = "qualitySet";
/// Compression quality in `(0, 1]` (`f32`).
pub const QUALITY: &str = "quality";
/// Horizontal sampling factor of each band (`i32` array).
pub const HORIZONTAL_SUBSAMPLING: &str = "horizontalSubsampling";
/// Vertical sampling factor of each band (`i32` array).
pub const VERTICAL_SUBSAMPLING: &str = "verticalSubsampling";
/// Quantization table slot of each band (`i32` array).
pub const QUANTIZATION_TABLE_MAPPING: &str = "quantizationTableMapping";
/// Restart interval in MCUs, 0 disables restart markers (`i32`).
pub const RESTART_INTERVAL: &str = "restartInterval";
/// Whether the JFIF APP0 header is written (`bool`).
pub const WRITE_JFIF_HEADER: &str = "writeJFIFHeader";

/// Name of the quantization table parameter of band `band`.
pub fn quantization_table_name(band: usize) -> String {
    format!("quantizationTable{band}")
}

/// The value of a single named parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Float(f32),
    Int(i32),
    IntArray(Vec<i32>),
    QuantizationTable(QuantizationTable),
    /// The parameter has no value and no default; the codec decides.
    NoDefault,
}

impl ParameterValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::IntArray(_) => "int array",
            Self::QuantizationTable(_) => "quantization table",
            Self::NoDefault => "no value",
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}
impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}
impl From<Vec<i32>> for ParameterValue {
    fn from(value: Vec<i32>) -> Self {
        Self::IntArray(value)
    }
}
impl<const N: usize> From<[i32; N]> for ParameterValue {
    fn from(value: [i32; N]) -> Self {
        Self::IntArray(value.to_vec())
    }
}
impl From<QuantizationTable> for ParameterValue {
    fn from(value: QuantizationTable) -> Self {
        Self::QuantizationTable(value)
    }
}

/// A set of named parameter values.
///
/// Values are assumed to have been checked against their descriptor already; the typed getters
/// only fail when an entry is missing or has an unexpected type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    values: HashMap<String, ParameterValue>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default JPEG tile codec parameters for a 3-band tile.
    ///
    /// Quality is not forced, chroma is subsampled 2x2 with luma on table slot 0 and both chroma
    /// bands on slot 1, quantization tables are left to the encoder, restart markers are
    /// disabled and the JFIF header is written.
    pub fn jpeg_defaults() -> Self {
        let mut list = Self::new();
        list.set(QUALITY_SET, false);
        list.set(QUALITY, 0.75f32);
        list.set(HORIZONTAL_SUBSAMPLING, [2, 1, 1]);
        list.set(VERTICAL_SUBSAMPLING, [2, 1, 1]);
        list.set(QUANTIZATION_TABLE_MAPPING, [0, 1, 1]);
        for band in 0..3 {
            list.set(&quantization_table_name(band), ParameterValue::NoDefault);
        }
        list.set(RESTART_INTERVAL, 0);
        list.set(WRITE_JFIF_HEADER, true);
        list
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParameterValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<ParameterValue>) -> Self {
        self.set(name, value);
        self
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.require(name)? {
            ParameterValue::Bool(v) => Ok(*v),
            other => Err(mistyped(name, "bool", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32> {
        match self.require(name)? {
            ParameterValue::Float(v) => Ok(*v),
            other => Err(mistyped(name, "float", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i32> {
        match self.require(name)? {
            ParameterValue::Int(v) => Ok(*v),
            other => Err(mistyped(name, "int", other)),
        }
    }

    pub fn int_array(&self, name: &str) -> Result<&[i32]> {
        match self.require(name)? {
            ParameterValue::IntArray(v) => Ok(v),
            other => Err(mistyped(name, "int array", other)),
        }
    }

    /// Returns the quantization table stored under `name`.
    ///
    /// `Ok(None)` means the table was not set (the entry is absent or [`ParameterValue::NoDefault`])
    /// and the encoder should use its own.
    pub fn quantization_table(&self, name: &str) -> Result<Option<&QuantizationTable>> {
        match self.values.get(name) {
            None | Some(ParameterValue::NoDefault) => Ok(None),
            Some(ParameterValue::QuantizationTable(table)) => Ok(Some(table)),
            Some(other) => Err(mistyped(name, "quantization table", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&ParameterValue> {
        match self.values.get(name) {
            None | Some(ParameterValue::NoDefault) => Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("parameter '{name}' has no value"),
            )),
            Some(value) => Ok(value),
        }
    }
}

fn mistyped(name: &str, expected: &str, actual: &ParameterValue) -> Error {
    Error::new(
        ErrorKind::InvalidParameter,
        format!(
            "parameter '{name}' should be a {expected}, but is a {}",
            actual.type_name()
        ),
    )
}
