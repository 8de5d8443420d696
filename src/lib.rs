//! Translation between generic tile coding parameters and JPEG image metadata.
//!
//! On the encode side, [`build_metadata`] turns a [`ParameterList`] (per-band sampling factors,
//! quantization table slots and tables, restart interval, JFIF header toggle) into the native
//! metadata tree of an [`ImageWriter`], and [`TileEncoder`] drives a writer to encode a
//! [`PixelTile`] with it.
//!
//! On the decode side, [`DecodeParams`] binds to the metadata an [`ImageReader`] produces and
//! answers queries about how the image was coded.
//!
//! The built-in backends are [`JpegWriter`], which delegates the actual compression to the
//! `jpeg-encoder` crate, and [`JpegReader`], which reads the marker segments of a JPEG stream
//! (see also the low-level [`file`] module).

mod codec;
mod color;
mod decode;
mod encode;
mod error;
pub mod file;
mod metadata;
mod params;
mod reader;
mod tile;
mod writer;


pub use codec::{
    CodecRegistry, CodingUnit, CompressionMode, ImageReader, ImageWriter, WriteParams,
    JPEG_FORMAT_NAME,
};
pub use color::{BandCount, ColorModel, ColorSpace, SampleType, Transparency};
pub use decode::DecodeParams;
pub use encode::{build_metadata, TileEncoder};
pub use error::{Error, ErrorKind, Result};
pub use metadata::{ImageMetadata, MetadataNode, QuantizationTable, UserObject, NATIVE_FORMAT};
pub use params::{
    quantization_table_name, ParameterList, ParameterValue, HORIZONTAL_SUBSAMPLING, QUALITY,
    QUALITY_SET, QUANTIZATION_TABLE_MAPPING, RESTART_INTERVAL, VERTICAL_SUBSAMPLING,
    WRITE_JFIF_HEADER,
};
pub use reader::{read_metadata, JpegReader};
pub use tile::{PixelTile, TileLayout};
pub use writer::JpegWriter;
