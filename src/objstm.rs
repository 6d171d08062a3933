//! Object stream parsing (PDF 1.5+).
//!
//! ```text
//! 7 0 obj
//! << /Type /ObjStm /N 2 /First 10 /Filter /FlateDecode >>
//! stream
//! 10 0 11 42          % (object number, offset from /First) pairs
//! << ... >>           % object 10
//! << ... >>           % object 11
//! endstream
//! ```
//!
//! Form templates saved by recent authoring tools keep most field and
//! widget dictionaries in object streams.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Parse every object in an object stream.
///
/// Objects that fail to parse are logged and left out; the caller sees them
/// as missing.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "ObjStm" {
            return Err(Error::InvalidPdf(format!(
                "expected /Type /ObjStm, got /Type /{}",
                type_name
            )));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;

    if !(0..=1_000_000).contains(&n) || first < 0 {
        return Err(Error::InvalidPdf(format!(
            "invalid object stream header: /N {} /First {}",
            n, first
        )));
    }

    let decoded = stream_obj.decode_stream_data()?;
    let first = first as usize;
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream data too short: {} bytes, /First is {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_pairs(&decoded[..first], n as usize)?;
    let body = &decoded[first..];
    let mut objects = HashMap::with_capacity(pairs.len());

    for (obj_num, offset) in pairs {
        let Some(obj_data) = body.get(offset..) else {
            log::warn!(
                "Object {} offset {} is beyond object stream length {}",
                obj_num,
                offset,
                body.len()
            );
            continue;
        };

        match parse_object(obj_data) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!("Failed to parse object {} from object stream: {:?}", obj_num, e),
        }
    }

    Ok(objects)
}

/// Read `count` (object number, offset) integer pairs.
fn parse_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;

    for i in 0..count {
        let (rest, obj_num) = next_int(data, remaining, "object number", i)?;
        let (rest, offset) = next_int(data, rest, "offset", i)?;
        pairs.push((obj_num.min(u32::MAX as i64) as u32, offset as usize));
        remaining = rest;
    }

    Ok(pairs)
}

fn next_int<'a>(data: &[u8], input: &'a [u8], what: &str, index: usize) -> Result<(&'a [u8], i64)> {
    match token(input) {
        Ok((rest, Token::Integer(value))) if value >= 0 => Ok((rest, value)),
        _ => Err(Error::ParseError {
            offset: data.len() - input.len(),
            reason: format!("object stream pair {}: expected {}", index, what),
        }),
    }
}
