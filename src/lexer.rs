//! PDF lexer (tokenizer).
//!
//! Splits raw bytes into the token types of PDF syntax: numbers, literal and
//! hex strings, names, keywords and delimiters. Whitespace (space, \t, \r,
//! \n, \0, \f) and comments (% to EOL) are skipped between tokens.
//!
//! String tokens borrow the raw bytes; escape handling happens in the parser.
//! Name tokens are fully decoded here since `#XX` is part of the name syntax.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Literal string bytes, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Hex string digits, whitespace included
    HexString(&'a [u8]),
    /// Name without the leading slash, `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in an indirect reference
    R,
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters: neither whitespace nor delimiters.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments. Never fails.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    value((), many0(alt((value((), take_while1(is_whitespace)), comment))))(input)
}

fn number_error(input: &[u8]) -> nom::Err<NomError<&[u8]>> {
    nom::Err::Error(NomError::new(input, ErrorKind::Digit))
}

/// Parse an integer or real number.
///
/// Leading signs and a bare leading or trailing decimal point are allowed
/// (`+17`, `.5`, `5.`, `-.002`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(tuple((digit1, opt(pair(char('.'), digit0))))),
            recognize(pair(char('.'), digit1)),
        )),
    )))(input)?;

    // ASCII by construction
    let text = std::str::from_utf8(text).map_err(|_| number_error(input))?;

    if text.contains('.') {
        let normalized = match text.strip_suffix('.') {
            Some(stripped) => stripped.to_string(),
            None => text.replacen("-.", "-0.", 1).replacen("+.", "0.", 1),
        };
        let normalized = if normalized.starts_with('.') {
            format!("0{}", normalized)
        } else {
            normalized
        };
        let num: f64 = normalized.parse().map_err(|_| number_error(input))?;
        Ok((rest, Token::Real(num)))
    } else {
        let num: i64 = text
            .trim_start_matches('+')
            .parse()
            .map_err(|_| number_error(input))?;
        Ok((rest, Token::Integer(num)))
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Nested balanced parentheses are part of the string; `\(` and `\)` do not
/// count toward nesting. Returns the raw bytes between the outer parens.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
}

/// Parse a hexadecimal string `<...>`, leaving digit decoding to the parser.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a raw name.
///
/// Each decoded byte becomes one `char` (Latin-1), so a name read and written
/// back produces the same bytes. Malformed escapes are kept literally.
///
/// ```
/// # use form_oxide::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Off"), "Off");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = &raw[i + 1..i + 3];
            let decoded = std::str::from_utf8(hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = decoded {
                result.push(byte as char);
                i += 3;
                continue;
            }
        }
        result.push(raw[i] as char);
        i += 1;
    }

    result
}

/// Parse a name starting with `/`. An empty name (`/` alone) is accepted.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |raw: &[u8]| Token::Name(decode_name_escapes(raw))),
    )(input)
}

/// Parse keywords and structural delimiters.
///
/// `endstream` and `endobj` are tried before `stream` and `obj`, `<<` and
/// `>>` before the hex-string form.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;

    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

/// Tokenize until the input is exhausted or an unknown token is hit.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}
