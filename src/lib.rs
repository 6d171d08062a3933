// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]

//! # Form Oxide
//!
//! Form-field engine for fillable PDF templates, built for the FinCEN
//! Suspicious Activity Report (form 6710-06).
//!
//! ## Core Features
//!
//! - **Field discovery**: widget classification, with exclusive button
//!   groups collapsed through their `/Parent` link (never by name prefix)
//! - **Name mapping**: versioned, hand-curated canonical ↔ descriptive
//!   tables, idempotent renaming and template verification
//! - **Filling**: text truncation and encoding, checkbox and radio state
//!   selection, choice fields as text, with a per-field [`FillReport`]
//! - **Append-only saving**: filled output is the original file plus an
//!   incremental update; an unfilled round trip is byte-identical
//!
//! ## Quick Start
//!
//! ```no_run
//! use form_oxide::{FillConfig, FillRequest, FormFiller, NameMapping};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), form_oxide::Error> {
//! let mapping = Arc::new(NameMapping::sar_6710_06()?);
//! let filler = FormFiller::new(mapping, FillConfig::default());
//!
//! let request = FillRequest::from_json_str(
//!     r#"{"p1_f2_institution_legal_name_text": "First National Bank of Testing",
//!         "p1_f5b_regulator_option_fdic_checkbox": true}"#,
//! )?;
//! let report = filler.fill_file("6710-06.pdf", "sar-filled.pdf", &request)?;
//!
//! for key in &report.unused_request_keys {
//!     eprintln!("no field for {}", key);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at
//! your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Form engine
pub mod forms;

// Writing
pub mod writer;

// Configuration and end-to-end pipeline
pub mod config;
pub mod pipeline;

pub use config::{FillConfig, TemplatePolicy};
pub use document::FormDocument;
pub use error::{Error, Result};
pub use forms::{
    FieldDiscoverer, FieldKind, FieldTable, FillReport, FillRequest, FillValue, FillWarning, Filler, LogicalField,
    NameMapping,
};
pub use pipeline::{FilledDocument, FormFiller};
pub use writer::IncrementalWriter;
