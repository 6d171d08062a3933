//! PDF writing.
//!
//! ```text
//! FormDocument (original bytes + modified objects)
//!     ↓
//! [IncrementalWriter] (appends objects, xref section, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```

mod incremental;
mod object_serializer;

pub use incremental::IncrementalWriter;
pub use object_serializer::ObjectSerializer;
