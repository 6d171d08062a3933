//! PDF object parser.
//!
//! Recursive descent over lexer tokens: read a token, decide what kind of
//! object starts there, recurse into arrays and dictionaries. All functions
//! return nom's `IResult`; [`parse_indirect_object_at`] is the boundary that
//! converts failures into [`Error::ParseError`] with a byte offset.

use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::error::{Error as NomError, ErrorKind};
use nom::IResult;

fn fail(input: &[u8], kind: ErrorKind) -> nom::Err<NomError<&[u8]>> {
    nom::Err::Error(NomError::new(input, kind))
}

/// Decode escape sequences in PDF literal strings.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (1-3 digits) and line
/// continuations. An unknown escape drops the backslash.
///
/// ```
/// # use form_oxide::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 71.01"), b"Section \xa7 71.01");
/// assert_eq!(decode_literal_string_escapes(b"a\\(b\\)"), b"a(b)");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut octal = (escaped - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            octal = octal * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                result.push((octal & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

/// Parse one PDF object, recognizing `n g R` references by lookahead.
///
/// ```
/// use form_oxide::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /T (item2) /Parent 7 0 R >>").unwrap();
/// assert!(obj.as_dict().unwrap().get("Parent").unwrap().as_reference().is_some());
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=u32::MAX as i64).contains(&i) && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(digits) => match decode_hex(digits) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(NomError::new(input, ErrorKind::HexDigit))),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input)?;

            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (rest, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }

            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(fail(input, ErrorKind::Tag)),
    }
}

/// Read stream bytes following the `stream` keyword.
///
/// A direct integer `/Length` is trusted when it lands on `endstream`;
/// otherwise (indirect or wrong length) the data runs to the next
/// `endstream`, minus the EOL that precedes it.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length.max(0) as usize;
        if length <= input.len() {
            let (rest, _) = skip_ws(&input[length..])?;
            if let Ok((rest, Token::StreamEnd)) = token(rest) {
                return Ok((rest, input[..length].to_vec()));
            }
        }
        log::debug!("Stream /Length {} does not land on endstream, scanning", length);
    }

    let pos = find_endstream(input).ok_or_else(|| fail(input, ErrorKind::Eof))?;
    let mut end = pos;
    if end > 0 && input[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && input[end - 1] == b'\r' {
        end -= 1;
    }
    let rest = &input[pos + b"endstream".len()..];
    Ok((rest, input[..end].to_vec()))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input.windows(keyword.len()).position(|window| window == keyword)
}

/// Parse array contents after `[`.
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(remaining) {
            return Ok((rest, Object::Array(objects)));
        }
        let (rest, obj) = parse_object(remaining)?;
        objects.push(obj);
        remaining = rest;
    }
}

/// Parse dictionary contents after `<<`. Keys must be names; a later
/// duplicate key replaces the earlier value in place.
fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                dict.insert(key, value);
                remaining = rest;
            },
            _ => return Err(fail(remaining, ErrorKind::Tag)),
        }
    }
}

/// Decode a hex string body to bytes. Whitespace is ignored; an odd final
/// digit is padded with 0.
///
/// ```
/// use form_oxide::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"FEFF 0041").unwrap(), vec![0xFE, 0xFF, 0x00, 0x41]);
/// assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0])?;
            let lo = match pair.get(1) {
                Some(&c) => hex_value(c)?,
                None => 0,
            };
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn hex_value(c: u8) -> Result<u8> {
    (c as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| Error::Decode(format!("Invalid hex digit: {:?}", c as char)))
}

/// Parse `n g obj <object> endobj`.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (input, id) = match token(input)? {
        (rest, Token::Integer(id)) if id >= 0 => (rest, id as u32),
        _ => return Err(fail(input, ErrorKind::Digit)),
    };
    let (input, gen) = match token(input)? {
        (rest, Token::Integer(gen)) if (0..=u16::MAX as i64).contains(&gen) => (rest, gen as u16),
        _ => return Err(fail(input, ErrorKind::Digit)),
    };
    let input = match token(input)? {
        (rest, Token::ObjStart) => rest,
        _ => return Err(fail(input, ErrorKind::Tag)),
    };

    let (input, object) = parse_object(input)?;

    // Missing endobj is tolerated
    let input = match token(input) {
        Ok((rest, Token::ObjEnd)) => rest,
        _ => input,
    };

    Ok((input, (ObjectRef::new(id, gen), object)))
}

/// Parse the indirect object starting at `offset` in `data`.
pub fn parse_indirect_object_at(data: &[u8], offset: usize) -> Result<(ObjectRef, Object)> {
    let slice = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    match parse_indirect_object(slice) {
        Ok((_, parsed)) => Ok(parsed),
        Err(e) => {
            let position = match &e {
                nom::Err::Error(inner) | nom::Err::Failure(inner) => {
                    offset + (slice.len() - inner.input.len())
                },
                nom::Err::Incomplete(_) => data.len(),
            };
            Err(Error::ParseError {
                offset: position,
                reason: format!("malformed indirect object ({:?})", e.map(|inner| inner.code)),
            })
        },
    }
}
