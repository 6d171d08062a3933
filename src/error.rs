//! Error types for the form engine.
//!
//! Everything in here is fatal: a structural problem with the template or the
//! mapping asset. Per-field problems never surface as an [`Error`]; they are
//! accumulated in a [`FillReport`](crate::forms::FillReport) instead.

/// Result type alias for form engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, filling, or writing a form.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature (encryption, exotic filters on structural streams)
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// The document parsed but carries no interactive form
    #[error("Not a fillable document: no /AcroForm in the catalog")]
    NotAForm,

    /// Name mapping asset is structurally wrong
    #[error("Invalid name mapping: {0}")]
    Mapping(String),

    /// Name mapping asset is not valid JSON
    #[error("Name mapping is not valid JSON: {0}")]
    MappingJson(#[from] serde_json::Error),

    /// Template does not match what the mapping was authored against
    #[error("Template mismatch for '{template}': {reason}")]
    TemplateMismatch {
        /// Template identifier declared by the mapping
        template: String,
        /// What diverged
        reason: String,
    },
}
