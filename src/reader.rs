//! The restartable, lazy record reader (spec §4.4).

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::encoding::{self, TextEncoding};
use crate::error::DBaseErrorKind;
use crate::field::{self, ConverterKind, Value};
use crate::header::{self, FileHeader};
use crate::layout;

/// The reserved record key exposing the deletion flag when
/// `show_deleted` is requested (spec §4.4).
pub const DELETION_FLAG_KEY: &str = "_deletion_flag";

/// A decoded record: field name to typed value, plus the reserved
/// [`DELETION_FLAG_KEY`] entry when requested.
pub type Record = HashMap<String, Value>;

/// Open-time options for a [`Reader`] (spec §4.4, §9 configuration).
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    pub unicode_mode: bool,
    pub encoding: Option<String>,
    pub strict: bool,
    /// Total byte length of the source, if known, enabling the strict
    /// overlay's file-size cross-check (spec §4.6, SPEC_FULL.md §E.3).
    pub total_bytes: Option<u64>,
}

/// A table opened for reading. Owns the byte source and the parsed,
/// immutable header for its lifetime; [`Reader::records`] hands out a
/// fresh, re-seeking iterator on every call (spec §4.4, §5).
pub struct Reader<R> {
    source: R,
    header: FileHeader,
    kinds: Vec<ConverterKind>,
    codec: Option<TextEncoding>,
}

impl<R: Read + Seek> Reader<R> {
    /// Open a table for reading. `unicode_mode` selects whether `C`
    /// fields decode to `Value::Text(TextValue::Unicode)` (using
    /// `encoding`, falling back to the header's language byte) or raw
    /// bytes.
    pub fn open(mut source: R, opts: ReaderOptions) -> Result<Self, DBaseErrorKind> {
        let header = header::read_header(&mut source)?;

        let codec = if opts.unicode_mode {
            let encoding = match &opts.encoding {
                Some(name) => TextEncoding::from_name(name)
                    .ok_or_else(|| DBaseErrorKind::UnsupportedEncoding(name.clone()))?,
                None => encoding::encoding_for(header.language_byte)
                    .ok_or(DBaseErrorKind::UnresolvableEncoding { language_byte: header.language_byte })?,
            };
            Some(encoding)
        } else {
            None
        };

        let kinds = header
            .fields
            .iter()
            .map(|f| field::resolve(f.field_type, f.decimal, opts.unicode_mode))
            .collect();

        let reader = Reader { source, header, kinds, codec };

        if opts.strict {
            crate::strict::validate(&reader.header, opts.total_bytes)?;
        }

        Ok(reader)
    }

    /// The header parsed at construction time.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Number of live+deleted records declared in the header.
    pub fn len(&self) -> usize {
        self.header.n_records as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over records starting at `start_from` (default 0), for at
    /// most `limit` examined records (default `len() - start_from`). When
    /// `show_deleted` is false, deleted records are skipped but still
    /// count toward `limit` (spec §4.4, open question #1 resolved in
    /// favor of the source's "examined" semantics).
    pub fn records(&mut self, start_from: usize, limit: Option<usize>, show_deleted: bool) -> Records<'_, R> {
        let total = self.len();
        let start_from = start_from.min(total);
        let limit = limit.unwrap_or(total.saturating_sub(start_from));

        let offset = self.header.header_length as u64 + (self.header.record_size() as u64) * start_from as u64;
        Records {
            reader: self,
            offset,
            remaining: limit,
            show_deleted,
            started: false,
            index: start_from,
        }
    }
}

/// A lazy, restartable iterator over a [`Reader`]'s records.
pub struct Records<'a, R> {
    reader: &'a mut Reader<R>,
    offset: u64,
    remaining: usize,
    show_deleted: bool,
    started: bool,
    /// Absolute position of the next record to examine (spec §4.4:
    /// errors carry the record's index in the stream, not its position
    /// within this iteration window).
    index: usize,
}

impl<'a, R: Read + Seek> Iterator for Records<'a, R> {
    type Item = Result<Record, DBaseErrorKind>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            if let Err(e) = self.reader.source.seek(SeekFrom::Start(self.offset)) {
                self.started = true;
                return Some(Err(e.into()));
            }
            self.started = true;
        }

        let record_size = self.reader.header.record_size();
        let mut buf = vec![0u8; record_size];

        loop {
            if self.remaining == 0 {
                return None;
            }
            if let Err(e) = self.reader.source.read_exact(&mut buf) {
                return Some(Err(e.into()));
            }
            self.remaining -= 1;
            let record_index = self.index;
            self.index += 1;

            let is_deleted = buf[0] == layout::DELETED_FLAG;
            if is_deleted && !self.show_deleted {
                log::debug!("skipping deleted record {record_index}");
                continue;
            }

            let mut record = Record::with_capacity(self.reader.header.fields.len() + 1);
            if self.show_deleted {
                record.insert(DELETION_FLAG_KEY.to_string(), Value::Boolean(is_deleted));
            }

            let mut pos = 1usize;
            for (spec, kind) in self.reader.header.fields.iter().zip(self.reader.kinds.iter()) {
                let width = spec.length as usize;
                let raw = &buf[pos..pos + width];
                match field::decode_field(*kind, raw, spec, self.reader.codec) {
                    Ok(value) => {
                        record.insert(spec.name.clone(), value);
                    }
                    Err(source) => {
                        return Some(Err(DBaseErrorKind::FieldConvert {
                            index: record_index,
                            field: spec.name.clone(),
                            source,
                        }))
                    }
                }
                pos += width;
            }

            return Some(Ok(record));
        }
    }
}
