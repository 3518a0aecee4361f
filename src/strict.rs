//! Strict-validation overlay (spec §4.6): extra invariants layered over
//! a parsed header, implemented as composition rather than inheritance
//! so the non-strict [`crate::reader::Reader`] stays usable on files
//! that violate these extra checks (spec §9).

use crate::error::DBaseErrorKind;
use crate::header::{FileHeader, Signature};

/// Validate `header` against the strict invariants from spec §4.6.
/// `total_bytes`, when known, enables the file-size cross-check (mirrors
/// `YDbfStrictReader.checkConsistency`'s `os.stat` use in the original
/// Python implementation, generalized to an optional caller-supplied
/// length since not every byte source has a discoverable size).
pub fn validate(header: &FileHeader, total_bytes: Option<u64>) -> Result<(), DBaseErrorKind> {
    let record_length = header.record_length as usize;
    let num_fields = header.fields.len();

    check(record_length > 1, "record_length must be greater than 1")?;
    check(record_length < 32768, "record_length must be less than 32768")?;

    match header.signature {
        Signature::DBase3 => {
            check(record_length < 4000, "record_length must be less than 4000 for signature 0x03")?;
            check(num_fields < 128, "num_fields must be less than 128 for signature 0x03")?;
        }
        Signature::DBase4 => {
            check(record_length < 4000, "record_length must be less than 4000 for signature 0x04")?;
            check(num_fields < 256, "num_fields must be less than 256 for signature 0x04")?;
        }
    }

    check(num_fields > 0, "num_fields must be greater than 0")?;

    for field in &header.fields {
        use crate::field::FieldType;
        match field.field_type {
            FieldType::Numeric => check(
                (field.length as usize) < 20,
                &format!("numeric field '{}' width must be less than 20", field.name),
            )?,
            FieldType::Character => check(
                (field.length as usize) < 255,
                &format!("character field '{}' width must be less than 255", field.name),
            )?,
            FieldType::Logical => check(
                field.length == 1,
                &format!("logical field '{}' width must be 1", field.name),
            )?,
            FieldType::Date => {}
        }
    }

    if let Some(total_bytes) = total_bytes {
        let expected = header.header_length as u64 + 1 + header.n_records as u64 * header.record_length as u64;
        check(
            total_bytes == expected,
            &format!("file size {total_bytes} does not match expected {expected} (header_length + 1 + num_records * record_length)"),
        )?;
    }

    Ok(())
}

fn check(cond: bool, message: &str) -> Result<(), DBaseErrorKind> {
    if cond {
        Ok(())
    } else {
        Err(DBaseErrorKind::ConsistencyError(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldSpec, FieldType};
    use chrono::NaiveDate;

    fn header_with(fields: Vec<FieldSpec>, record_length: u16) -> FileHeader {
        FileHeader {
            signature: Signature::DBase3,
            last_updated: NaiveDate::from_ymd_opt(2006, 6, 19).unwrap(),
            n_records: 3,
            header_length: crate::header::header_length_of(fields.len()),
            record_length,
            language_byte: 0,
            fields,
        }
    }

    #[test]
    fn accepts_a_well_formed_header() {
        let fields = vec![FieldSpec::new("ID", FieldType::Numeric, 4, 0).unwrap()];
        let header = header_with(fields, 5);
        assert!(validate(&header, None).is_ok());
    }

    #[test]
    fn rejects_zero_fields() {
        let header = header_with(vec![], 1);
        assert!(validate(&header, None).is_err());
    }

    #[test]
    fn rejects_file_size_mismatch() {
        let fields = vec![FieldSpec::new("ID", FieldType::Numeric, 4, 0).unwrap()];
        let header = header_with(fields, 5);
        let wrong_size = header.header_length as u64 + 1 + header.n_records as u64 * header.record_length as u64 + 1;
        assert!(validate(&header, Some(wrong_size)).is_err());
    }

    #[test]
    fn rejects_too_many_fields_for_dbase3() {
        let fields: Vec<FieldSpec> = (0..130)
            .map(|i| FieldSpec::new(format!("F{i}"), FieldType::Numeric, 4, 0).unwrap())
            .collect();
        let record_length = 1 + fields.len() as u16 * 4;
        let header = header_with(fields, record_length);
        assert!(validate(&header, None).is_err());
    }
}
