//! Table header: signature, last-updated date, record counts, and the
//! field descriptor table (spec §3, §6).

use std::io::{Read, Seek, SeekFrom, Write};

use chrono::{Datelike, NaiveDate};

use crate::error::DBaseErrorKind;
use crate::field::{FieldSpec, FieldType};
use crate::layout::{self, file_header_layout, field_descriptor_layout};

/// The dBASE variant a table claims in its signature byte (spec §3).
/// Memo-file variants (0x83 and friends) are an explicit non-goal
/// (spec §1) and are rejected as `UnsupportedSignature`, not parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    DBase3,
    DBase4,
}

impl Signature {
    fn from_byte(b: u8) -> Result<Self, DBaseErrorKind> {
        match b {
            0x03 => Ok(Signature::DBase3),
            0x04 | 0x05 => Ok(Signature::DBase4),
            other => Err(DBaseErrorKind::UnsupportedSignature(other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Signature::DBase3 => 0x03,
            Signature::DBase4 => 0x04,
        }
    }
}

/// The parsed file header plus its field descriptor table.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub signature: Signature,
    pub last_updated: NaiveDate,
    pub n_records: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub language_byte: u8,
    pub fields: Vec<FieldSpec>,
}

impl FileHeader {
    /// Size in bytes of one on-disk record, including the leading
    /// deletion-flag byte.
    pub fn record_size(&self) -> usize {
        self.record_length as usize
    }
}

fn yymmdd_to_date(year: u8, month: u8, day: u8) -> Result<NaiveDate, DBaseErrorKind> {
    // Two-digit year tolerance (spec §3 / open question #2): years below
    // 1950 are assumed to mean the 2000s, matching real-world DBF writers
    // that never expected their files to survive past Y2K.
    let mut full_year = 1900 + year as i32;
    if full_year < 1950 {
        full_year += 100;
    }
    NaiveDate::from_ymd_opt(full_year, month as u32, day as u32)
        .ok_or_else(|| DBaseErrorKind::CorruptHeader(format!("invalid last-updated date {full_year}-{month:02}-{day:02}")))
}

pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<FileHeader, DBaseErrorKind> {
    reader.seek(SeekFrom::Start(0))?;
    let mut buf = vec![0u8; layout::HEADER_SIZE];
    reader.read_exact(&mut buf)?;
    let view = file_header_layout::View::new(&buf[..]);

    let signature = Signature::from_byte(view.signature().read())?;
    let ymd = view.last_updated();
    let last_updated = yymmdd_to_date(ymd.year().read(), ymd.month().read(), ymd.day().read())?;
    let n_records = view.n_records().read();
    let header_length = view.n_header_bytes().read();
    let record_length = view.n_record_bytes().read();
    let language_byte = view.language_byte().read();

    if (header_length as usize) < layout::HEADER_SIZE + layout::FIELD_DESCRIPTOR_SIZE + 1 {
        return Err(DBaseErrorKind::CorruptHeader(format!(
            "header length {header_length} is too small to hold any field descriptors"
        )));
    }
    let num_fields = (header_length as usize - layout::HEADER_SIZE - 1) / layout::FIELD_DESCRIPTOR_SIZE;

    log::info!("header length {header_length}, record length {record_length}, {num_fields} fields");

    let mut fields = Vec::with_capacity(num_fields);
    for i in 0..num_fields {
        let mut fd_buf = vec![0u8; layout::FIELD_DESCRIPTOR_SIZE];
        reader.read_exact(&mut fd_buf)?;
        let fd = field_descriptor_layout::View::new(&fd_buf[..]);

        let name_bytes = fd.name();
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let field_type = FieldType::from_code(fd.f_type().read())
            .ok_or_else(|| DBaseErrorKind::UnsupportedFieldType(fd.f_type().read() as char))?;
        let length = fd.length().read();
        let decimal_count = fd.decimal_count().read();

        let spec = FieldSpec::new(name, field_type, length, decimal_count)
            .map_err(|e| DBaseErrorKind::CorruptHeader(format!("field #{i}: {e}")))?;
        log::trace!("field #{i}: {} ({} width {length})", spec.name, spec.field_type);
        fields.push(spec);
    }

    let mut terminator = [0u8; 1];
    reader.read_exact(&mut terminator)?;
    if terminator[0] != layout::TERMINATOR {
        return Err(DBaseErrorKind::CorruptHeader(format!(
            "expected field descriptor terminator 0x0d, found {:#04x}",
            terminator[0]
        )));
    }

    Ok(FileHeader { signature, last_updated, n_records, header_length, record_length, language_byte, fields })
}

/// Compute the on-disk record length (leading deletion-flag byte plus
/// every field's width) from a field list.
pub fn record_length_of(fields: &[FieldSpec]) -> u16 {
    1 + fields.iter().map(|f| f.length as u32).sum::<u32>() as u16
}

/// Compute the on-disk header length from a field count.
pub fn header_length_of(num_fields: usize) -> u16 {
    (layout::HEADER_SIZE + num_fields * layout::FIELD_DESCRIPTOR_SIZE + 1) as u16
}

pub fn write_header<W: Write + Seek>(writer: &mut W, header: &FileHeader) -> Result<(), DBaseErrorKind> {
    log::info!(
        "writing header: {} fields, header length {}, record length {}, n_records {}",
        header.fields.len(),
        header.header_length,
        header.record_length,
        header.n_records
    );
    let pos = writer.stream_position()?;
    writer.seek(SeekFrom::Start(0))?;

    let mut buf = vec![0u8; layout::HEADER_SIZE];
    {
        let mut view = file_header_layout::View::new(&mut buf);
        view.signature_mut().write(header.signature.to_byte());
        let year = (header.last_updated.year() - 1900).rem_euclid(100) as u8;
        let mut ymd = view.last_updated_mut();
        ymd.year_mut().write(year);
        ymd.month_mut().write(header.last_updated.month() as u8);
        ymd.day_mut().write(header.last_updated.day() as u8);
        view.n_records_mut().write(header.n_records);
        view.n_header_bytes_mut().write(header.header_length);
        view.n_record_bytes_mut().write(header.record_length);
        view.language_byte_mut().write(header.language_byte);
    }
    writer.write_all(&buf)?;

    for field in &header.fields {
        let mut fd_buf = vec![0u8; layout::FIELD_DESCRIPTOR_SIZE];
        {
            let mut view = field_descriptor_layout::View::new(&mut fd_buf);
            let mut name_bytes = [0u8; 11];
            let name = field.name.as_bytes();
            name_bytes[..name.len()].copy_from_slice(name);
            view.name_mut().copy_from_slice(&name_bytes);
            view.f_type_mut().write(field.field_type.code());
            view.length_mut().write(field.length);
            view.decimal_count_mut().write(field.decimal);
        }
        writer.write_all(&fd_buf)?;
    }
    writer.write_all(&[layout::TERMINATOR])?;

    writer.seek(SeekFrom::Start(pos))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("INT_FLD", FieldType::Numeric, 4, 0).unwrap(),
            FieldSpec::new("FLT_FLD", FieldType::Numeric, 5, 2).unwrap(),
            FieldSpec::new("CHR_FLD", FieldType::Character, 6, 0).unwrap(),
            FieldSpec::new("DTE_FLD", FieldType::Date, 8, 0).unwrap(),
            FieldSpec::new("BLN_FLD", FieldType::Logical, 1, 0).unwrap(),
        ]
    }

    #[test]
    fn header_round_trips_through_write_then_read() {
        let fields = sample_fields();
        let header = FileHeader {
            signature: Signature::DBase3,
            last_updated: NaiveDate::from_ymd_opt(2006, 6, 19).unwrap(),
            n_records: 3,
            header_length: header_length_of(fields.len()),
            record_length: record_length_of(&fields),
            language_byte: 0x00,
            fields,
        };

        let mut cursor = Cursor::new(vec![0u8; 1024]);
        write_header(&mut cursor, &header).unwrap();
        let read_back = read_header(&mut cursor).unwrap();

        assert_eq!(read_back.signature, Signature::DBase3);
        assert_eq!(read_back.last_updated, header.last_updated);
        assert_eq!(read_back.n_records, 3);
        assert_eq!(read_back.fields.len(), 5);
        assert_eq!(read_back.fields[0].name, "INT_FLD");
        assert_eq!(read_back.fields[1].decimal, 2);
    }

    #[test]
    fn two_digit_year_below_50_means_2000s() {
        let date = yymmdd_to_date(6, 6, 19).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2006, 6, 19).unwrap());
    }

    #[test]
    fn two_digit_year_at_or_above_50_means_1900s() {
        let date = yymmdd_to_date(99, 1, 1).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1999, 1, 1).unwrap());
    }

    #[test]
    fn rejects_unsupported_signature() {
        assert!(matches!(Signature::from_byte(0x30), Err(DBaseErrorKind::UnsupportedSignature(0x30))));
    }

    #[test]
    fn rejects_memo_signature() {
        assert!(matches!(Signature::from_byte(0x83), Err(DBaseErrorKind::UnsupportedSignature(0x83))));
    }
}
