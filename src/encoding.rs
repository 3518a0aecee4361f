//! The language-byte <-> text-encoding table, and the codec used to decode
//! and encode `C`-typed field bytes under unicode mode.
//!
//! The table is deliberately a subset of the full DBF language-driver
//! table (see spec §6): only the encodings this crate can actually decode
//! are listed, rather than every byte value xBase implementations have
//! historically used.

use std::sync::OnceLock;

use crate::error::FieldConvertError;

mod cp437;
mod cp850;
mod cp852;

/// A single-byte text encoding usable for `C` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Ascii,
    Cp437,
    Cp850,
    Cp852,
    Cp866,
    Cp1250,
    Cp1251,
    Cp1252,
    Cp1253,
    Cp1254,
}

impl TextEncoding {
    /// The canonical name used both for display and for reverse lookup
    /// from a name to a language byte (spec §3, "Encoding mapping").
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Ascii => "ascii",
            TextEncoding::Cp437 => "cp437",
            TextEncoding::Cp850 => "cp850",
            TextEncoding::Cp852 => "cp852",
            TextEncoding::Cp866 => "cp866",
            TextEncoding::Cp1250 => "cp1250",
            TextEncoding::Cp1251 => "cp1251",
            TextEncoding::Cp1252 => "cp1252",
            TextEncoding::Cp1253 => "cp1253",
            TextEncoding::Cp1254 => "cp1254",
        }
    }

    /// Resolve an encoding by its canonical or alias name (e.g. `"cp1251"`,
    /// `"windows-1251"`), for callers that accept an explicit encoding
    /// argument rather than relying on the header's language byte.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "ascii" | "us-ascii" => TextEncoding::Ascii,
            "cp437" | "ibm437" => TextEncoding::Cp437,
            "cp850" | "ibm850" => TextEncoding::Cp850,
            "cp852" | "ibm852" => TextEncoding::Cp852,
            "cp866" | "ibm866" => TextEncoding::Cp866,
            "cp1250" | "windows-1250" => TextEncoding::Cp1250,
            "cp1251" | "windows-1251" => TextEncoding::Cp1251,
            "cp1252" | "windows-1252" => TextEncoding::Cp1252,
            "cp1253" | "windows-1253" => TextEncoding::Cp1253,
            "cp1254" | "windows-1254" => TextEncoding::Cp1254,
            _ => return None,
        })
    }

    /// Decode a byte slice using this encoding. Always succeeds: every
    /// single-byte encoding we support maps every byte to some code point.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Ascii => bytes.iter().map(|&b| (b & 0x7f) as char).collect(),
            TextEncoding::Cp437 => decode_dos_table(bytes, &cp437::HIGH_HALF),
            TextEncoding::Cp850 => decode_dos_table(bytes, &cp850::HIGH_HALF),
            TextEncoding::Cp852 => decode_dos_table(bytes, &cp852::HIGH_HALF),
            TextEncoding::Cp866 => encoding_rs::IBM866.decode_without_bom_handling(bytes).0.into_owned(),
            TextEncoding::Cp1250 => encoding_rs::WINDOWS_1250.decode_without_bom_handling(bytes).0.into_owned(),
            TextEncoding::Cp1251 => encoding_rs::WINDOWS_1251.decode_without_bom_handling(bytes).0.into_owned(),
            TextEncoding::Cp1252 => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
            TextEncoding::Cp1253 => encoding_rs::WINDOWS_1253.decode_without_bom_handling(bytes).0.into_owned(),
            TextEncoding::Cp1254 => encoding_rs::WINDOWS_1254.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }

    /// Encode a string using this encoding. Fails if a character has no
    /// representation in the target encoding.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, FieldConvertError> {
        let bytes = match self {
            TextEncoding::Ascii => {
                if text.is_ascii() {
                    text.as_bytes().to_vec()
                } else {
                    return Err(unmappable(text, self));
                }
            }
            TextEncoding::Cp437 => encode_dos_table(text, &cp437::HIGH_HALF, self)?,
            TextEncoding::Cp850 => encode_dos_table(text, &cp850::HIGH_HALF, self)?,
            TextEncoding::Cp852 => encode_dos_table(text, &cp852::HIGH_HALF, self)?,
            TextEncoding::Cp866 => encode_whatwg(text, encoding_rs::IBM866, self)?,
            TextEncoding::Cp1250 => encode_whatwg(text, encoding_rs::WINDOWS_1250, self)?,
            TextEncoding::Cp1251 => encode_whatwg(text, encoding_rs::WINDOWS_1251, self)?,
            TextEncoding::Cp1252 => encode_whatwg(text, encoding_rs::WINDOWS_1252, self)?,
            TextEncoding::Cp1253 => encode_whatwg(text, encoding_rs::WINDOWS_1253, self)?,
            TextEncoding::Cp1254 => encode_whatwg(text, encoding_rs::WINDOWS_1254, self)?,
        };
        Ok(bytes)
    }
}

fn unmappable(text: &str, encoding: TextEncoding) -> FieldConvertError {
    FieldConvertError::InvalidText {
        value: text.as_bytes().to_vec(),
        encoding: encoding.name(),
    }
}

fn encode_whatwg(
    text: &str,
    encoding: &'static encoding_rs::Encoding,
    for_error: TextEncoding,
) -> Result<Vec<u8>, FieldConvertError> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(unmappable(text, for_error));
    }
    Ok(bytes.into_owned())
}

fn decode_dos_table(bytes: &[u8], high_half: &[char; 128]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { b as char } else { high_half[(b - 0x80) as usize] })
        .collect()
}

fn encode_dos_table(
    text: &str,
    high_half: &[char; 128],
    for_error: TextEncoding,
) -> Result<Vec<u8>, FieldConvertError> {
    static REVERSE_CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<usize, std::collections::HashMap<char, u8>>>> =
        OnceLock::new();
    // keyed by the address of the table (stable for the lifetime of the static arrays)
    let key = high_half.as_ptr() as usize;
    let cache = REVERSE_CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut guard = cache.lock().unwrap();
    let reverse = guard.entry(key).or_insert_with(|| {
        let mut map = std::collections::HashMap::with_capacity(128);
        for (i, &c) in high_half.iter().enumerate() {
            map.entry(c).or_insert((0x80 + i) as u8);
        }
        map
    });

    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c as u8);
        } else if let Some(&b) = reverse.get(&c) {
            out.push(b);
        } else {
            return Err(unmappable(text, for_error));
        }
    }
    Ok(out)
}

/// Resolve a DBF language byte to a text encoding (reader direction).
pub fn encoding_for(language_byte: u8) -> Option<TextEncoding> {
    Some(match language_byte {
        0x00 => TextEncoding::Ascii,
        0x01 => TextEncoding::Cp437,
        0x02 => TextEncoding::Cp850,
        0x03 => TextEncoding::Cp1252,
        0x64 => TextEncoding::Cp852,
        0x65 => TextEncoding::Cp866,
        0xC8 => TextEncoding::Cp1250,
        0xC9 => TextEncoding::Cp1251,
        0xCA => TextEncoding::Cp1254,
        0xCB => TextEncoding::Cp1253,
        _ => return None,
    })
}

/// Resolve an encoding name to the DBF language byte that writes it
/// (writer direction). Forms the other half of the involution tested in
/// spec §8 ("Encoding symmetry").
pub fn language_byte_for(name: &str) -> Option<u8> {
    let encoding = TextEncoding::from_name(name)?;
    Some(match encoding {
        TextEncoding::Ascii => 0x00,
        TextEncoding::Cp437 => 0x01,
        TextEncoding::Cp850 => 0x02,
        TextEncoding::Cp1252 => 0x03,
        TextEncoding::Cp852 => 0x64,
        TextEncoding::Cp866 => 0x65,
        TextEncoding::Cp1250 => 0xC8,
        TextEncoding::Cp1251 => 0xC9,
        TextEncoding::Cp1254 => 0xCA,
        TextEncoding::Cp1253 => 0xCB,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn involution_over_every_table_entry() {
        for byte in [0x00, 0x01, 0x02, 0x03, 0x64, 0x65, 0xC8, 0xC9, 0xCA, 0xCB] {
            let encoding = encoding_for(byte).expect("byte is in the table");
            let round_tripped = language_byte_for(encoding.name()).expect("name is in the table");
            assert_eq!(byte, round_tripped, "encoding {:?} did not round-trip", encoding.name());
        }
    }

    #[test]
    fn unmapped_language_byte_resolves_to_none() {
        assert!(encoding_for(0x42).is_none());
    }

    #[test]
    fn cp437_high_half_round_trips() {
        let text = "r\u{00e9}sum\u{00e9}"; // r,e-acute,s,u,m,e-acute
        let bytes = TextEncoding::Cp437.encode(text).unwrap();
        assert_eq!(TextEncoding::Cp437.decode(&bytes), text);
    }

    #[test]
    fn ascii_rejects_non_ascii() {
        assert!(TextEncoding::Ascii.encode("caf\u{00e9}").is_err());
    }

    #[test]
    fn cp1251_round_trips_cyrillic() {
        let text = "\u{041f}\u{0440}\u{0438}\u{0432}\u{0435}\u{0442}"; // Привет
        let bytes = TextEncoding::Cp1251.encode(text).unwrap();
        assert_eq!(TextEncoding::Cp1251.decode(&bytes), text);
    }

    #[test]
    fn cp1252_rejects_cyrillic() {
        let text = "\u{041f}\u{0440}\u{0438}\u{0432}\u{0435}\u{0442}";
        assert!(TextEncoding::Cp1252.encode(text).is_err());
    }
}
