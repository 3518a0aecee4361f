//! The writer (spec §4.5): typestate `Open -> Writing -> Closed`,
//! mirroring the teacher's `TableWriter<S: TableWriterState>` pattern.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use chrono::NaiveDate;

use crate::encoding::TextEncoding;
use crate::error::DBaseErrorKind;
use crate::field::{self, ConverterKind, FieldSpec, Value};
use crate::header::{self, FileHeader, Signature};
use crate::layout;
use crate::reader::Record;

const FLUSH_INTERVAL: u32 = 1000;

/// Open-time options for a [`TableWriter`] (spec §4.5, §9 configuration).
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub encoding: Option<String>,
    pub unicode_mode: bool,
    pub last_modified: Option<NaiveDate>,
}

/// Marker trait for writer states. Never implemented outside this module.
pub trait TableWriterState: private::Sealed {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Open {}
    impl Sealed for super::Writing {}
    impl Sealed for super::Closed {}
}

pub struct Open;
pub struct Writing;
pub struct Closed;

impl TableWriterState for Open {}
impl TableWriterState for Writing {}
impl TableWriterState for Closed {}

/// A table opened for writing. The state parameter tracks the writer's
/// lifecycle: construction emits a provisional header and enters
/// [`Open`]; the first successful `write` enters [`Writing`]; `close`
/// enters [`Closed`], after which all operations fail (spec §4.5).
pub struct TableWriter<W, S: TableWriterState> {
    sink: W,
    fields: Vec<FieldSpec>,
    kinds: Vec<ConverterKind>,
    codec: Option<TextEncoding>,
    signature: Signature,
    last_modified: NaiveDate,
    language_byte: u8,
    n_records: u32,
    header_length: u16,
    record_length: u16,
    _state: S,
}

impl<W: Write + Seek> TableWriter<W, Open> {
    /// Open a table for writing. The schema and encoding are fixed for
    /// the lifetime of the writer; construction immediately writes a
    /// provisional header with `numrec = 0` (spec §4.5).
    pub fn create(mut sink: W, fields: Vec<FieldSpec>, opts: WriterOptions) -> Result<Self, DBaseErrorKind> {
        let language_byte = match &opts.encoding {
            Some(name) => {
                let encoding = TextEncoding::from_name(name)
                    .ok_or_else(|| DBaseErrorKind::UnsupportedEncoding(name.clone()))?;
                crate::encoding::language_byte_for(encoding.name())
                    .ok_or_else(|| DBaseErrorKind::UnsupportedEncoding(name.clone()))?
            }
            None => 0x00,
        };
        let codec = opts.encoding.as_deref().and_then(TextEncoding::from_name);

        let kinds = fields
            .iter()
            .map(|f| field::resolve(f.field_type, f.decimal, opts.unicode_mode))
            .collect();

        let last_modified = opts.last_modified.unwrap_or_else(|| chrono::Utc::now().date_naive());
        let header_length = header::header_length_of(fields.len());
        let record_length = header::record_length_of(&fields);

        let header = FileHeader {
            signature: Signature::DBase3,
            last_updated: last_modified,
            n_records: 0,
            header_length,
            record_length,
            language_byte,
            fields: fields.clone(),
        };
        header::write_header(&mut sink, &header)?;
        sink.seek(SeekFrom::Start(header_length as u64))?;

        Ok(TableWriter {
            sink,
            fields,
            kinds,
            codec,
            signature: Signature::DBase3,
            last_modified,
            language_byte,
            n_records: 0,
            header_length,
            record_length,
            _state: Open,
        })
    }

    /// Begin writing records.
    pub fn writing(self) -> TableWriter<W, Writing> {
        TableWriter {
            sink: self.sink,
            fields: self.fields,
            kinds: self.kinds,
            codec: self.codec,
            signature: self.signature,
            last_modified: self.last_modified,
            language_byte: self.language_byte,
            n_records: self.n_records,
            header_length: self.header_length,
            record_length: self.record_length,
            _state: Writing,
        }
    }
}

impl<W: Write + Seek> TableWriter<W, Writing> {
    /// Write a stream of records. Transitions lazily happen on the first
    /// call; every `FLUSH_INTERVAL` records the header is rewritten in
    /// place to keep `numrec` current, and the append position is
    /// restored afterward (spec §4.5).
    pub fn write<I: IntoIterator<Item = Record>>(&mut self, records: I) -> Result<(), DBaseErrorKind> {
        for record in records.into_iter() {
            let index = self.n_records as usize;
            let encoded = match self.encode_one(&record) {
                Ok(buf) => buf,
                Err(failure) => {
                    self.flush()?;
                    return Err(annotate(index, failure));
                }
            };
            if let Err(e) = self.sink.write_all(&encoded) {
                self.flush()?;
                return Err(e.into());
            }
            self.n_records += 1;
            if self.n_records % FLUSH_INTERVAL == 0 {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn encode_one(&self, record: &Record) -> Result<Vec<u8>, RecordEncodeFailure> {
        let mut buf = Vec::with_capacity(self.record_length as usize);
        buf.push(layout::LIVE_FLAG);

        for (spec, kind) in self.fields.iter().zip(self.kinds.iter()) {
            let value = record
                .get(&spec.name)
                .ok_or_else(|| RecordEncodeFailure { field: spec.name.clone(), source: None })?;
            let encoded = field::encode_field(*kind, value, spec, self.codec)
                .map_err(|e| RecordEncodeFailure { field: spec.name.clone(), source: Some(e) })?;
            if encoded.len() != spec.length as usize {
                return Err(RecordEncodeFailure {
                    field: spec.name.clone(),
                    source: Some(crate::error::FieldConvertError::WrongWidth {
                        expected: spec.length as usize,
                        actual: encoded.len(),
                    }),
                });
            }
            buf.extend_from_slice(&encoded);
        }

        Ok(buf)
    }

    /// Force a header rewrite and flush the sink.
    pub fn flush(&mut self) -> Result<(), DBaseErrorKind> {
        log::info!("amortized header rewrite at {} records", self.n_records);
        let header = self.current_header();
        header::write_header(&mut self.sink, &header)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Rewrite the header one last time, append the EOF marker, flush,
    /// and transition to [`Closed`]. After this, all operations fail.
    pub fn close(mut self) -> Result<TableWriter<W, Closed>, DBaseErrorKind> {
        self.flush()?;
        self.sink.write_all(&[layout::EOF_MARKER])?;
        self.sink.flush()?;
        Ok(TableWriter {
            sink: self.sink,
            fields: self.fields,
            kinds: self.kinds,
            codec: self.codec,
            signature: self.signature,
            last_modified: self.last_modified,
            language_byte: self.language_byte,
            n_records: self.n_records,
            header_length: self.header_length,
            record_length: self.record_length,
            _state: Closed,
        })
    }

}

impl<W> TableWriter<W, Closed> {
    /// Recover the underlying sink after closing, e.g. to inspect the
    /// bytes written to an in-memory buffer.
    pub fn into_sink(self) -> W {
        self.sink
    }
}

impl<W: Write + Seek> TableWriter<W, Writing> {
    fn current_header(&self) -> FileHeader {
        FileHeader {
            signature: self.signature,
            last_updated: self.last_modified,
            n_records: self.n_records,
            header_length: self.header_length,
            record_length: self.record_length,
            language_byte: self.language_byte,
            fields: self.fields.clone(),
        }
    }
}

struct RecordEncodeFailure {
    field: String,
    source: Option<crate::error::FieldConvertError>,
}

fn annotate(index: usize, failure: RecordEncodeFailure) -> DBaseErrorKind {
    match failure.source {
        Some(source) => DBaseErrorKind::RecordEncode { index, field: failure.field, source },
        None => DBaseErrorKind::MissingField { index, field: failure.field },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use std::io::Cursor;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("INT_FLD", FieldType::Numeric, 4, 0).unwrap(),
            FieldSpec::new("FLT_FLD", FieldType::Numeric, 5, 2).unwrap(),
            FieldSpec::new("CHR_FLD", FieldType::Character, 6, 0).unwrap(),
            FieldSpec::new("DTE_FLD", FieldType::Date, 8, 0).unwrap(),
            FieldSpec::new("BLN_FLD", FieldType::Logical, 1, 0).unwrap(),
        ]
    }

    fn record(
        int_fld: i128,
        flt_fld: &str,
        chr_fld: &str,
        date: NaiveDate,
        bln_fld: bool,
    ) -> Record {
        use crate::field::{Decimal, TextValue};
        let mut r = Record::new();
        r.insert("INT_FLD".into(), Value::Integer(Some(int_fld)));
        r.insert("FLT_FLD".into(), Value::Decimal(Some(Decimal::parse_quantized(flt_fld, 2).unwrap())));
        r.insert("CHR_FLD".into(), Value::Text(Some(TextValue::Raw(chr_fld.as_bytes().to_vec()))));
        r.insert("DTE_FLD".into(), Value::Date(Some(date)));
        r.insert("BLN_FLD".into(), Value::Boolean(bln_fld));
        r
    }

    #[test]
    fn writer_produces_expected_record_bytes() {
        let sink = Cursor::new(Vec::new());
        let opts = WriterOptions {
            last_modified: NaiveDate::from_ymd_opt(2006, 6, 19),
            ..Default::default()
        };
        let writer = TableWriter::create(sink, fields(), opts).unwrap();
        let mut writer = writer.writing();

        writer
            .write(vec![record(25, "12.34", "test", NaiveDate::from_ymd_opt(2006, 5, 7).unwrap(), true)])
            .unwrap();
        let writer = writer.close().unwrap();

        let bytes = writer.into_sink().into_inner();
        // header(32) + 1 field desc(32) * 5 + terminator(1) = 193
        let header_len = 32 + 32 * 5 + 1;
        assert_eq!(bytes[0], 0x03);
        let record_start = header_len;
        assert_eq!(bytes[record_start], 0x20);
        assert_eq!(&bytes[record_start + 1..record_start + 5], b"  25");
        assert_eq!(&bytes[record_start + 5..record_start + 10], b"12.34");
        assert_eq!(&bytes[record_start + 10..record_start + 16], b"test  ");
        assert_eq!(&bytes[record_start + 16..record_start + 24], b"20060507");
        assert_eq!(bytes[record_start + 24], b'T');
        assert_eq!(*bytes.last().unwrap(), 0x1a);
    }

    #[test]
    fn error_index_accounts_for_earlier_write_calls() {
        let sink = Cursor::new(Vec::new());
        let writer = TableWriter::create(sink, fields(), WriterOptions::default()).unwrap();
        let mut writer = writer.writing();

        writer
            .write(vec![record(1, "1.00", "a", NaiveDate::from_ymd_opt(2006, 1, 1).unwrap(), true)])
            .unwrap();

        let mut incomplete = Record::new();
        incomplete.insert("INT_FLD".into(), Value::Integer(Some(2)));
        let err = writer.write(vec![incomplete]).unwrap_err();
        match err {
            DBaseErrorKind::MissingField { index, .. } => assert_eq!(index, 1),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_raises_missing_field_error() {
        let sink = Cursor::new(Vec::new());
        let writer = TableWriter::create(sink, fields(), WriterOptions::default()).unwrap();
        let mut writer = writer.writing();

        let mut incomplete = Record::new();
        incomplete.insert("INT_FLD".into(), Value::Integer(Some(1)));

        let err = writer.write(vec![incomplete]).unwrap_err();
        assert!(matches!(err, DBaseErrorKind::MissingField { .. }));
    }
}
