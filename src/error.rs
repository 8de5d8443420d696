use core::fmt;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations of this crate.
pub struct Error {
    repr: Repr,
}

pub(crate) enum Repr {
    Other(ErrorKind, String),
    Io(io::Error),
}

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The band count has no JPEG color model (only 1, 3 and 4 bands are supported).
    UnsupportedBandCount,
    /// A per-band parameter array does not have one entry per band.
    ArrayLengthMismatch,
    /// A component or table index exceeds what the metadata records.
    IndexOutOfRange,
    /// Expected metadata structure is absent or could not be parsed.
    MalformedMetadata,
    /// A quantization table entry carries no table.
    MissingQuantTable,
    /// The decoder could not produce metadata for the requested image.
    MetadataUnavailable,
    /// No encoder is registered for the target format.
    EncoderUnavailable,
    /// No tile was passed to the encoder.
    NullTile,
    /// Writing the encoded image failed.
    EncodeIo,
    /// A parameter query was made before the view was bound to any metadata.
    NotBound,
    /// A parameter is missing, has the wrong type, or has an invalid value.
    InvalidParameter,
    /// The metadata asks for a coding layout the encoder backend cannot express.
    UnsupportedCoding,
}

impl From<(ErrorKind, String)> for Repr {
    fn from((kind, msg): (ErrorKind, String)) -> Self {
        Self::Other(kind, msg)
    }
}
impl<'a> From<(ErrorKind, &'a str)> for Repr {
    fn from((kind, msg): (ErrorKind, &'a str)) -> Self {
        Self::Other(kind, msg.into())
    }
}
impl From<io::Error> for Repr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl Error {
    pub(crate) fn from(e: impl Into<Repr>) -> Self {
        Self { repr: e.into() }
    }

    pub(crate) fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self::from((kind, msg.into()))
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedMetadata, msg)
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::Other(kind, _) => *kind,
            Repr::Io(_) => ErrorKind::EncodeIo,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self {
            repr: Repr::Io(value),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Other(kind, s) => write!(f, "{kind:?}: {s}"),
            Repr::Io(e) => write!(f, "EncodeIo: {e:?}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Other(_, s) => s.fmt(f),
            Repr::Io(e) => write!(f, "I/O error while writing encoded image: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.repr {
            Repr::Other(..) => None,
            Repr::Io(e) => Some(e),
        }
    }
}
