//! PDF object serialization.
//!
//! Dictionaries are written in insertion order, so an object that was read,
//! edited and written back keeps its original key layout.

use crate::object::{Dict, Object, ObjectRef};
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writes into a Vec are infallible
        let _ = self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Write an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn write_indirect<W: Write>(&self, w: &mut W, obj_ref: ObjectRef, obj: &Object) -> std::io::Result<()> {
        writeln!(w, "{} {} obj", obj_ref.id, obj_ref.gen)?;
        self.write_object(w, obj)?;
        write!(w, "\nendobj\n")
    }

    /// Write an object.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if !value.is_finite() {
            return write!(w, "0");
        }
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Literal `(...)` syntax for printable ASCII, hex `<...>` otherwise.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Write a PDF name.
    ///
    /// Names are held one char per source byte, so chars up to U+00FF map
    /// back to the byte they came from. Anything outside the regular
    /// printable range is written as `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for c in name.chars() {
            let code = c as u32;
            if code <= 0xFF {
                write_name_byte(w, code as u8)?;
            } else {
                let mut utf8 = [0u8; 4];
                for &byte in c.encode_utf8(&mut utf8).as_bytes() {
                    write!(w, "#{:02X}", byte)?;
                }
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> std::io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dict) -> std::io::Result<()> {
        write!(w, "<<")?;
        for (key, value) in dict {
            if self.compact {
                write!(w, " ")?;
            } else {
                write!(w, "\n  ")?;
            }
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, value)?;
        }
        if self.compact {
            write!(w, " >>")
        } else {
            if !dict.is_empty() {
                writeln!(w)?;
            }
            write!(w, ">>")
        }
    }

    /// Stream data is written as stored (still encoded); `/Length` is
    /// always rewritten to match it.
    fn write_stream<W: Write>(&self, w: &mut W, dict: &Dict, data: &[u8]) -> std::io::Result<()> {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length)?;
        write!(w, "\nstream\n")?;
        w.write_all(data)?;
        write!(w, "\nendstream")
    }
}

fn write_name_byte<W: Write>(w: &mut W, byte: u8) -> std::io::Result<()> {
    let regular = (0x21..=0x7E).contains(&byte)
        && !matches!(byte, b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%');
    if regular {
        w.write_all(&[byte])
    } else {
        write!(w, "#{:02X}", byte)
    }
}
