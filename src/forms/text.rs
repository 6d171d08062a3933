//! PDF text strings (ISO 32000-1, 7.9.2.2).
//!
//! Field values and names are text strings: either PDFDocEncoding bytes or
//! UTF-16BE prefixed with the `FE FF` byte order mark.

const UTF16BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Decode a text string.
///
/// ```
/// use form_oxide::forms::text::decode_text_string;
///
/// assert_eq!(decode_text_string(b"item2"), "item2");
/// assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x41, 0x20, 0xAC]), "A\u{20ac}");
/// ```
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&UTF16BE_BOM) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&UTF8_BOM) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().filter_map(|&b| pdfdoc_to_char(b)).collect()
}

/// Encode a text string, preferring PDFDocEncoding and falling back to
/// UTF-16BE when any character has no PDFDocEncoding code.
///
/// ```
/// use form_oxide::forms::text::encode_text_string;
///
/// assert_eq!(encode_text_string("Caf\u{e9}"), b"Caf\xE9".to_vec());
/// assert_eq!(encode_text_string("\u{4e2d}"), vec![0xFE, 0xFF, 0x4E, 0x2D]);
/// ```
pub fn encode_text_string(text: &str) -> Vec<u8> {
    let single_byte: Option<Vec<u8>> = text.chars().map(char_to_pdfdoc).collect();
    match single_byte {
        // A leading "þÿ" or "ï»¿" would read back as a byte order mark
        Some(bytes) if !bytes.starts_with(&UTF16BE_BOM) && !bytes.starts_with(&UTF8_BOM) => bytes,
        _ => {
            let mut bytes = UTF16BE_BOM.to_vec();
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            bytes
        },
    }
}

/// Keep the first `max_chars` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// PDFDocEncoding byte to char (ISO 32000-1, Annex D.2).
fn pdfdoc_to_char(code: u8) -> Option<char> {
    let c = match code {
        0x18 => '\u{02D8}', // breve
        0x19 => '\u{02C7}', // caron
        0x1A => '\u{02C6}', // circumflex
        0x1B => '\u{02D9}', // dotaccent
        0x1C => '\u{02DD}', // hungarumlaut
        0x1D => '\u{02DB}', // ogonek
        0x1E => '\u{02DA}', // ring
        0x1F => '\u{02DC}', // tilde
        0x7F | 0x9F | 0xAD => return None,
        0x80 => '\u{2022}', // bullet
        0x81 => '\u{2020}', // dagger
        0x82 => '\u{2021}', // daggerdbl
        0x83 => '\u{2026}', // ellipsis
        0x84 => '\u{2014}', // emdash
        0x85 => '\u{2013}', // endash
        0x86 => '\u{0192}', // florin
        0x87 => '\u{2044}', // fraction
        0x88 => '\u{2039}', // guilsinglleft
        0x89 => '\u{203A}', // guilsinglright
        0x8A => '\u{2212}', // minus
        0x8B => '\u{2030}', // perthousand
        0x8C => '\u{201E}', // quotedblbase
        0x8D => '\u{201C}', // quotedblleft
        0x8E => '\u{201D}', // quotedblright
        0x8F => '\u{2018}', // quoteleft
        0x90 => '\u{2019}', // quoteright
        0x91 => '\u{201A}', // quotesinglbase
        0x92 => '\u{2122}', // trademark
        0x93 => '\u{FB01}', // fi
        0x94 => '\u{FB02}', // fl
        0x95 => '\u{0141}', // Lslash
        0x96 => '\u{0152}', // OE
        0x97 => '\u{0160}', // Scaron
        0x98 => '\u{0178}', // Ydieresis
        0x99 => '\u{017D}', // Zcaron
        0x9A => '\u{0131}', // dotlessi
        0x9B => '\u{0142}', // lslash
        0x9C => '\u{0153}', // oe
        0x9D => '\u{0161}', // scaron
        0x9E => '\u{017E}', // zcaron
        0xA0 => '\u{20AC}', // Euro
        _ => code as char,
    };
    Some(c)
}

/// Inverse of [`pdfdoc_to_char`], restricted to printable text plus tab,
/// line feed and carriage return.
fn char_to_pdfdoc(c: char) -> Option<u8> {
    match c {
        '\t' | '\n' | '\r' | ' '..='~' => return Some(c as u8),
        '\u{00A1}'..='\u{00FF}' if c != '\u{00AD}' => return Some(c as u32 as u8),
        _ => {},
    }
    (0x18..=0x1Fu8)
        .chain(0x80..=0xA0)
        .find(|&code| pdfdoc_to_char(code) == Some(c))
}
