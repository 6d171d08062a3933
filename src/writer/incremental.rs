//! Incremental update writer.
//!
//! The output is the original file byte for byte, followed by the modified
//! objects, a cross-reference section covering only those objects and a
//! trailer whose `/Prev` points at the previous section:
//!
//! ```text
//! %PDF-1.6 ... %%EOF        original bytes, untouched
//! 12 0 obj ... endobj       modified objects, ascending object number
//! xref / trailer            or an uncompressed /XRef stream
//! startxref
//! 123456
//! %%EOF
//! ```
//!
//! The new section uses the same flavor as the newest existing one: a
//! classic table after a table, an xref stream after a stream.

use crate::document::FormDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::object_serializer::ObjectSerializer;
use crate::xref::XRefKind;
use std::io::Write;

/// Trailer keys carried over from the previous section.
const CARRIED_TRAILER_KEYS: [&str; 3] = ["Root", "Info", "ID"];

/// Field widths of the xref stream we write: type, offset, generation.
const XREF_STREAM_WIDTHS: [usize; 3] = [1, 4, 2];

/// Appends a document's modified objects as an incremental update.
#[derive(Debug, Clone, Default)]
pub struct IncrementalWriter {
    serializer: ObjectSerializer,
}

impl IncrementalWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the updated file.
    ///
    /// With no modified objects the original bytes are returned unchanged.
    pub fn write(&self, doc: &FormDocument) -> Result<Vec<u8>> {
        let original = doc.original_bytes();
        if !doc.is_modified() {
            return Ok(original.to_vec());
        }

        let mut modified: Vec<(ObjectRef, &Object)> = doc.modified_objects().collect();
        modified.sort_by_key(|(obj_ref, _)| *obj_ref);

        let mut output = Vec::with_capacity(original.len() + modified.len() * 256 + 512);
        output.extend_from_slice(original);
        if !matches!(output.last(), Some(b'\n') | Some(b'\r')) {
            output.push(b'\n');
        }

        let mut offsets: Vec<(ObjectRef, usize)> = Vec::with_capacity(modified.len() + 1);
        for (obj_ref, obj) in &modified {
            offsets.push((*obj_ref, output.len()));
            self.serializer.write_indirect(&mut output, *obj_ref, obj)?;
        }

        let highest = modified.iter().map(|(r, _)| r.id).max().unwrap_or(0);
        let size = doc.xref().size().max(highest + 1);
        let trailer = self.trailer(doc, size);

        match doc.xref().kind() {
            XRefKind::Table => self.write_table(&mut output, &offsets, trailer)?,
            XRefKind::Stream => self.write_stream(&mut output, &mut offsets, trailer, size)?,
        }

        log::debug!(
            "Appended {} objects ({} bytes) as a {:?} update",
            modified.len(),
            output.len() - original.len(),
            doc.xref().kind()
        );
        Ok(output)
    }

    fn trailer(&self, doc: &FormDocument, size: u32) -> Dict {
        let previous = doc.trailer();
        let mut trailer = Dict::new();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        for key in CARRIED_TRAILER_KEYS {
            if let Some(value) = previous.get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer.insert("Prev".to_string(), Object::Integer(doc.xref().offset() as i64));
        trailer
    }

    fn write_table(&self, output: &mut Vec<u8>, offsets: &[(ObjectRef, usize)], trailer: Dict) -> Result<()> {
        let xref_start = output.len();
        writeln!(output, "xref")?;
        for run in contiguous_runs(offsets) {
            writeln!(output, "{} {}", run[0].0.id, run.len())?;
            for (obj_ref, offset) in run {
                // Entries are exactly 20 bytes including the two-byte EOL
                write!(output, "{:010} {:05} n\r\n", offset, obj_ref.gen)?;
            }
        }
        writeln!(output, "trailer")?;
        self.serializer.write_object(output, &Object::Dictionary(trailer))?;
        write!(output, "\nstartxref\n{}\n%%EOF\n", xref_start)?;
        Ok(())
    }

    fn write_stream(
        &self,
        output: &mut Vec<u8>,
        offsets: &mut Vec<(ObjectRef, usize)>,
        mut trailer: Dict,
        size: u32,
    ) -> Result<()> {
        // The stream describes itself, so it takes the next free number
        let stream_ref = ObjectRef::new(size, 0);
        let xref_start = output.len();
        offsets.push((stream_ref, xref_start));

        let mut data = Vec::with_capacity(offsets.len() * XREF_STREAM_WIDTHS.iter().sum::<usize>());
        for (obj_ref, offset) in offsets.iter() {
            let offset = u32::try_from(*offset)
                .map_err(|_| Error::Unsupported(format!("offset {} exceeds 4-byte xref stream field", offset)))?;
            data.push(1);
            data.extend_from_slice(&offset.to_be_bytes());
            data.extend_from_slice(&obj_ref.gen.to_be_bytes());
        }

        let index = contiguous_runs(offsets)
            .flat_map(|run| [Object::Integer(run[0].0.id as i64), Object::Integer(run.len() as i64)])
            .collect();

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        trailer.insert("Size".to_string(), Object::Integer(size as i64 + 1));
        dict.extend(trailer);
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert(
            "W".to_string(),
            Object::Array(XREF_STREAM_WIDTHS.iter().map(|w| Object::Integer(*w as i64)).collect()),
        );

        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        };
        self.serializer.write_indirect(output, stream_ref, &stream)?;
        write!(output, "startxref\n{}\n%%EOF\n", xref_start)?;
        Ok(())
    }
}

/// Split entries sorted by object number into runs of consecutive numbers.
fn contiguous_runs(entries: &[(ObjectRef, usize)]) -> impl Iterator<Item = &[(ObjectRef, usize)]> {
    entries.chunk_by(|a, b| b.0.id == a.0.id + 1)
}
