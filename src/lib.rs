//! Streaming reader and writer for xBase/DBF table files (dBASE
//! III/IV/5, the flat variants without memo or index side-files).
//!
//! The crate is organized leaf-first: [`encoding`] and [`layout`] are
//! the byte-level primitives; [`field`] builds the per-field value
//! codec on top of them; [`header`] parses/emits the file header and
//! field descriptor table; [`reader`], [`strict`], and [`writer`]
//! build the streaming pipeline; this module provides the `open`
//! façade that dispatches between them by mode.

pub mod encoding;
pub mod error;
pub mod field;
pub mod header;
pub mod layout;
pub mod reader;
pub mod strict;
pub mod writer;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub use error::{DBaseErrorKind, DBaseResult, FieldConvertError};
pub use field::{Decimal, FieldSpec, FieldType, TextValue, Value};
pub use header::{FileHeader, Signature};
pub use reader::{Reader, ReaderOptions, Record, Records, DELETION_FLAG_KEY};
pub use writer::{Closed, Open, TableWriter, Writing, WriterOptions};

/// A table opened by the [`open`] façade: either a [`Reader`] ready for
/// iteration, or a [`TableWriter`] ready to accept records (spec §4.7).
pub enum Table {
    Reader(Reader<BufReader<File>>),
    Writer(TableWriter<BufWriter<File>, Writing>),
}

/// The schema and options needed to open a table for writing. Required
/// only when `mode == "write"`, since a writer has no header to read
/// its schema from.
pub struct WriteSchema {
    pub fields: Vec<FieldSpec>,
    pub options: WriterOptions,
}

/// Open a table at `path` for either reading or writing.
///
/// `mode` must be `"read"` or `"write"`; anything else fails with
/// [`DBaseErrorKind::InvalidMode`]. `write_schema` is required when
/// `mode == "write"` and ignored otherwise (spec §4.7).
pub fn open(
    path: impl AsRef<Path>,
    mode: &str,
    reader_options: ReaderOptions,
    write_schema: Option<WriteSchema>,
) -> DBaseResult<Table> {
    match mode {
        "read" => {
            let file = File::open(path)?;
            let total_bytes = file.metadata()?.len();
            let reader_options = ReaderOptions { total_bytes: Some(total_bytes), ..reader_options };
            let reader = Reader::open(BufReader::new(file), reader_options)?;
            Ok(Table::Reader(reader))
        }
        "write" => {
            let WriteSchema { fields, options } = write_schema.ok_or_else(|| {
                DBaseErrorKind::ConsistencyError("write mode requires a WriteSchema".to_string())
            })?;
            let file = File::create(path)?;
            let writer = TableWriter::create(BufWriter::new(file), fields, options)?.writing();
            Ok(Table::Writer(writer))
        }
        other => Err(DBaseErrorKind::InvalidMode(other.to_string())),
    }
}
