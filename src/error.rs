//! Error taxonomy for the header/field codec and the reader/writer pipeline.

use std::io;
use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

/// Failure decoding or encoding a single field's bytes.
///
/// These never escape on their own; they are always wrapped by
/// [`DBaseErrorKind::FieldConvert`] or [`DBaseErrorKind::RecordEncode`],
/// which attach the record index and field name.
#[derive(Error, Debug)]
pub enum FieldConvertError {
    #[error("value {value:?} is not valid under encoding {encoding}")]
    InvalidText { value: Vec<u8>, encoding: &'static str },

    #[error("value {value:?} is not a valid number")]
    InvalidNumber { value: String },

    #[error("value {value:?} is not a valid date")]
    InvalidDate { value: String },

    #[error("encoded value is {actual} bytes long, expected exactly {expected}")]
    WrongWidth { expected: usize, actual: usize },

    #[error("expected a {expected} value")]
    TypeMismatch { expected: &'static str },

    #[error(transparent)]
    Number(#[from] ParseIntError),

    #[error(transparent)]
    Float(#[from] ParseFloatError),
}

/// The error type for every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum DBaseErrorKind {
    #[error("signature {0:#04x} is not a supported dBASE variant (expected 0x03, 0x04 or 0x05)")]
    UnsupportedSignature(u8),

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("unknown field type {0:?}")]
    UnsupportedFieldType(char),

    #[error(
        "unicode mode requested but no encoding could be resolved \
         (language byte {language_byte:#04x} is unmapped and no explicit encoding was given)"
    )]
    UnresolvableEncoding { language_byte: u8 },

    #[error("encoding {0:?} has no known DBF language byte")]
    UnsupportedEncoding(String),

    #[error("consistency check failed: {0}")]
    ConsistencyError(String),

    #[error("record {index}, field '{field}': {source}")]
    FieldConvert {
        index: usize,
        field: String,
        #[source]
        source: FieldConvertError,
    },

    #[error("record {index}, field '{field}': {source}")]
    RecordEncode {
        index: usize,
        field: String,
        #[source]
        source: FieldConvertError,
    },

    #[error("record {index} is missing field '{field}'")]
    MissingField { index: usize, field: String },

    #[error("unrecognized open mode {0:?} (expected \"read\" or \"write\")")]
    InvalidMode(String),

    #[error("the writer is closed")]
    WriterClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DBaseResult<T> = Result<T, DBaseErrorKind>;
