//! End-to-end fill pipeline.
//!
//! ```text
//! template bytes
//!     ↓
//! [FormDocument] (parse)
//!     ↓
//! [FieldDiscoverer] → FieldTable ──→ [NameMapping::verify]
//!     ↓
//! [Filler] (mutations + FillReport)
//!     ↓
//! [IncrementalWriter]
//!     ↓
//! filled bytes
//! ```

use crate::config::FillConfig;
use crate::document::FormDocument;
use crate::error::{Error, Result};
use crate::forms::{FieldDiscoverer, FieldTable, FillReport, FillRequest, Filler, NameMapping};
use crate::writer::IncrementalWriter;
use std::path::Path;
use std::sync::Arc;

/// Output of a successful fill.
#[derive(Debug, Clone)]
pub struct FilledDocument {
    /// The filled PDF
    pub bytes: Vec<u8>,
    /// Per-field diagnostics
    pub report: FillReport,
}

/// Fills templates against one shared, frozen mapping.
///
/// `FormFiller` is `Send + Sync`; clone it or share it behind an `Arc` to
/// fill from several threads.
///
/// ```no_run
/// use form_oxide::{FillConfig, FillRequest, FormFiller, NameMapping};
/// use std::sync::Arc;
///
/// let filler = FormFiller::new(Arc::new(NameMapping::sar_6710_06()?), FillConfig::default());
/// let request = FillRequest::new().with("p1_f2_institution_legal_name_text", "First National Bank of Testing");
/// let report = filler.fill_file("6710-06.pdf", "filled.pdf", &request)?;
/// println!("{} fields filled", report.filled_fields.len());
/// # Ok::<(), form_oxide::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FormFiller {
    mapping: Arc<NameMapping>,
    config: FillConfig,
}

impl FormFiller {
    /// Create a filler.
    pub fn new(mapping: Arc<NameMapping>, config: FillConfig) -> Self {
        Self { mapping, config }
    }

    /// The mapping in use.
    pub fn mapping(&self) -> &NameMapping {
        &self.mapping
    }

    /// The configuration in use.
    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    /// Fill a template held in memory.
    pub fn fill_bytes(&self, template: &[u8], request: &FillRequest) -> Result<FilledDocument> {
        let mut doc = FormDocument::from_bytes(template)?;
        if doc.acroform()?.is_none() {
            return Err(Error::NotAForm);
        }

        let table = FieldDiscoverer::discover(&mut doc)?;
        if self.config.verify_template {
            let check = self.mapping.verify(&table, &self.config.policy)?;
            log::debug!("Template coverage {:.2}", check.coverage);
        }

        let report = Filler::new(&self.mapping, &self.config).fill_table(&mut doc, &table, request)?;
        let bytes = IncrementalWriter::new().write(&doc)?;
        Ok(FilledDocument { bytes, report })
    }

    /// Fill a template file and write the result to `output`.
    ///
    /// Nothing is written when any step fails.
    pub fn fill_file(
        &self,
        template: impl AsRef<Path>,
        output: impl AsRef<Path>,
        request: &FillRequest,
    ) -> Result<FillReport> {
        let template = template.as_ref();
        let output = output.as_ref();
        log::info!("Filling {} into {}", template.display(), output.display());

        let bytes = std::fs::read(template)?;
        let filled = self.fill_bytes(&bytes, request)?;
        std::fs::write(output, &filled.bytes)?;
        Ok(filled.report)
    }

    /// Discover the fields of a template without filling it.
    pub fn inspect_bytes(&self, template: &[u8]) -> Result<FieldTable> {
        let mut doc = FormDocument::from_bytes(template)?;
        FieldDiscoverer::discover(&mut doc)
    }
}
