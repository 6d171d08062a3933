//! Cross-reference parsing.
//!
//! The xref maps object numbers to byte offsets (or to a slot inside an
//! object stream). Both traditional tables and cross-reference streams are
//! supported, including hybrid files (`/XRefStm`) and `/Prev` chains left
//! behind by earlier incremental updates. Newer sections win.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object};
use std::collections::{BTreeMap, HashSet};

/// Maximum number of chained xref sections followed through /Prev.
const MAX_XREF_CHAIN: usize = 100;

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Entry for an object stored at a byte offset
    Uncompressed,
    /// Entry for an object inside an object stream
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed), object stream number (compressed) or next free object
    pub offset: u64,
    /// Generation number (uncompressed/free) or index within the object stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Object stored directly in the file at `offset`.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Object number `index` inside object stream `stream_obj_num`.
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Syntax of an xref section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// `xref` keyword, fixed-width text entries, `trailer` dictionary
    Table,
    /// `/Type /XRef` stream with binary entries
    Stream,
}

/// Merged cross-reference information for a whole document.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dict,
    kind: XRefKind,
    offset: usize,
}

impl CrossRefTable {
    fn new(kind: XRefKind, offset: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            trailer: Dict::new(),
            kind,
            offset,
        }
    }

    /// Look up an object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Iterate entries in object-number order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(num, entry)| (*num, entry))
    }

    /// Trailer dictionary of the newest section (the stream dictionary for xref streams).
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Syntax of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Byte offset of the newest section, as named by `startxref`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One past the highest object number in use, or the trailer /Size if larger.
    pub fn size(&self) -> u32 {
        let from_entries = self.entries.keys().next_back().map_or(0, |n| n + 1);
        let from_trailer = self
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .unwrap_or(0)
            .clamp(0, u32::MAX as i64) as u32;
        from_entries.max(from_trailer)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill in entries that the newer section did not define.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
    }
}

/// Find the offset named by the last `startxref` in the file.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];

    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|window| window == keyword)
        .ok_or(Error::InvalidXref)?;

    match token(&tail[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as usize)
        },
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the xref chain starting at `offset`, following /XRefStm and /Prev.
pub fn parse_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut merged = parse_section(data, offset)?;
    visited.insert(offset);

    let mut next = section_links(&merged.trailer);
    while let Some(prev_offset) = next.pop() {
        if !visited.insert(prev_offset) {
            return Err(Error::InvalidPdf(format!(
                "xref chain loops back to offset {}",
                prev_offset
            )));
        }
        if visited.len() > MAX_XREF_CHAIN {
            return Err(Error::InvalidPdf(format!(
                "xref /Prev chain longer than {}",
                MAX_XREF_CHAIN
            )));
        }

        log::debug!("Following xref chain to offset {}", prev_offset);
        let older = parse_section(data, prev_offset)?;
        let older_links = section_links(&older.trailer);
        merged.merge_older(older);
        next.extend(older_links);
    }

    Ok(merged)
}

/// Offsets this section links to, in stack order: /XRefStm is consulted
/// before /Prev.
fn section_links(trailer: &Dict) -> Vec<usize> {
    let offset_of = |key: &str| {
        trailer
            .get(key)
            .and_then(Object::as_integer)
            .filter(|off| *off >= 0)
            .map(|off| off as usize)
    };
    let mut links = Vec::new();
    links.extend(offset_of("Prev"));
    links.extend(offset_of("XRefStm"));
    links
}

fn parse_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let section = data.get(offset..).ok_or(Error::InvalidXref)?;
    let start = section
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .ok_or(Error::InvalidXref)?;

    if section[start..].starts_with(b"xref") {
        log::debug!("Traditional xref at offset {}", offset);
        parse_traditional_xref(data, offset + start)
    } else if section[start].is_ascii_digit() {
        log::debug!("Xref stream at offset {}", offset);
        parse_xref_stream(data, offset + start)
    } else {
        Err(Error::InvalidXref)
    }
}

/// Split the next line off `input`, accepting LF, CRLF or a bare CR.
fn next_line(input: &[u8]) -> Option<(&[u8], &[u8])> {
    if input.is_empty() {
        return None;
    }
    let end = input
        .iter()
        .position(|&c| c == b'\n' || c == b'\r')
        .unwrap_or(input.len());
    let mut rest = &input[end..];
    if rest.starts_with(b"\r\n") {
        rest = &rest[2..];
    } else if !rest.is_empty() {
        rest = &rest[1..];
    }
    Some((&input[..end], rest))
}

fn parse_u64(field: &[u8]) -> Option<u64> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Parse a traditional table and the trailer dictionary after it.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000017 00000 n
/// 0000000081 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut xref = CrossRefTable::new(XRefKind::Table, offset);
    let mut cursor = &data[offset + b"xref".len()..];
    let mut current: Option<(u32, u32, u32)> = None; // (start, count, seen)

    while let Some((line, rest)) = next_line(cursor) {
        let trimmed = line.trim_ascii();
        if trimmed.starts_with(b"trailer") {
            let leading = line.iter().take_while(|c| c.is_ascii_whitespace()).count();
            let after_keyword = data.len() - cursor.len() + leading + b"trailer".len();
            let (_, trailer) = parse_object(&data[after_keyword..]).map_err(|_| {
                Error::ParseError {
                    offset: after_keyword,
                    reason: "unreadable trailer dictionary".to_string(),
                }
            })?;
            xref.trailer = match trailer {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Dictionary".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            return Ok(xref);
        }
        cursor = rest;

        if trimmed.is_empty() {
            continue;
        }

        let fields: Vec<&[u8]> = trimmed
            .split(|c| c.is_ascii_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        let in_subsection = matches!(current, Some((_, count, seen)) if seen < count);
        if !in_subsection {
            if fields.len() != 2 {
                return Err(Error::InvalidXref);
            }
            let start = parse_u64(fields[0])
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(Error::InvalidXref)?;
            let count = parse_u64(fields[1])
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(Error::InvalidXref)?;
            // Every object number in the subsection must fit
            start.checked_add(count).ok_or(Error::InvalidXref)?;
            current = Some((start, count, 0));
            continue;
        }

        if let Some((start, _, seen)) = current.as_mut() {
            let object_number = start.checked_add(*seen).ok_or(Error::InvalidXref)?;
            *seen += 1;

            if fields.len() < 3 {
                log::warn!("Malformed xref entry for object {}: {:?}", object_number, String::from_utf8_lossy(trimmed));
                continue;
            }
            let entry_offset = parse_u64(fields[0]).ok_or(Error::InvalidXref)?;
            let generation = parse_u64(fields[1]).ok_or(Error::InvalidXref)?.min(u16::MAX as u64) as u16;
            let entry = match fields[2].first() {
                Some(b'n') => XRefEntry::uncompressed(entry_offset, generation),
                _ => XRefEntry::free(entry_offset, generation),
            };
            xref.entries.insert(object_number, entry);
        }
    }

    Err(Error::InvalidPdf(format!("xref table at {} has no trailer", offset)))
}

/// Parse a cross-reference stream (`/Type /XRef`, `/W`, optional `/Index`).
fn parse_xref_stream(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, object)) = parse_indirect_object(&data[offset..]).map_err(|_| Error::ParseError {
        offset,
        reason: "unreadable cross-reference stream".to_string(),
    })?;

    let decoded = object.decode_stream_data()?;
    let dict = match object {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "XRef" {
            return Err(Error::InvalidPdf(format!("expected /Type /XRef, got /Type /{}", type_name)));
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|n| n.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::InvalidPdf("invalid /W array in xref stream".to_string()));
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let entry_size = w1 + w2 + w3;

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("missing /Size in xref stream".to_string()))?
        .max(0) as u32;

    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((start.as_integer()?, count.as_integer()?)),
                _ => None,
            })
            .map(|(start, count)| -> Result<(u32, u32)> {
                let start = u32::try_from(start).map_err(|_| Error::InvalidXref)?;
                let count = u32::try_from(count).map_err(|_| Error::InvalidXref)?;
                start.checked_add(count).ok_or(Error::InvalidXref)?;
                Ok((start, count))
            })
            .collect::<Result<_>>()?,
        None => vec![(0, size)],
    };

    let mut xref = CrossRefTable::new(XRefKind::Stream, offset);
    let mut rows = decoded.chunks_exact(entry_size.max(1));

    for (start, count) in ranges {
        for i in 0..count {
            let row = rows
                .next()
                .ok_or_else(|| Error::InvalidPdf("truncated xref stream data".to_string()))?;

            // A zero-width type field defaults to 1
            let entry_type = if w1 > 0 { read_int(&row[..w1]) } else { 1 };
            let field2 = read_int(&row[w1..w1 + w2]);
            let field3 = read_int(&row[w1 + w2..entry_size]);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                // Unknown types are reserved and read as null references
                _ => continue,
            };
            xref.entries.insert(start.checked_add(i).ok_or(Error::InvalidXref)?, entry);
        }
    }

    xref.trailer = dict;
    Ok(xref)
}

/// Big-endian integer of up to eight bytes.
fn read_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
