//! Canonical ↔ descriptive field names.
//!
//! A [`NameMapping`] is authored by hand once per template version and then
//! only read. Canonical names are the identifiers discovery derives from the
//! template (`item2`, group bases like `item5`, group options like `item5b`);
//! descriptive names are what callers use in fill requests.

use crate::config::TemplatePolicy;
use crate::document::FormDocument;
use crate::error::{Error, Result};
use crate::forms::discover::FieldDiscoverer;
use crate::forms::field::{FieldKind, FieldTable, KindCounts, LogicalField};
use crate::forms::text::encode_text_string;
use crate::object::{Object, ObjectRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Mapping bundled for the FinCEN SAR 6710-06 template.
const SAR_6710_06: &str = include_str!("../../assets/mappings/sar-6710-06.json");

/// One canonical name's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Descriptive name
    pub descriptive: String,
    /// Kind the field is expected to have, if declared
    pub kind: Option<FieldKind>,
}

/// On-disk mapping format.
#[derive(Debug, Deserialize)]
struct MappingAsset {
    template: String,
    version: String,
    #[serde(default)]
    fingerprint: Option<KindCounts>,
    fields: IndexMap<String, AssetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AssetEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        kind: Option<FieldKind>,
    },
}

/// Immutable, versioned name table for one template.
///
/// ```
/// use form_oxide::forms::NameMapping;
///
/// let mapping = NameMapping::builder("Test form", "1")
///     .entry("item2", "financial_institution_name")
///     .build()?;
/// assert_eq!(mapping.descriptive("item2"), Some("financial_institution_name"));
/// assert_eq!(mapping.canonical("financial_institution_name"), Some("item2"));
/// # Ok::<(), form_oxide::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct NameMapping {
    template: String,
    version: String,
    fingerprint: Option<KindCounts>,
    entries: IndexMap<String, MappingEntry>,
    inverse: HashMap<String, String>,
    /// `parent.descriptive` → canonical, for hierarchical canonical names
    /// whose terminal part was renamed
    qualified: HashMap<String, String>,
}

/// Builder for [`NameMapping`].
#[derive(Debug, Clone)]
pub struct NameMappingBuilder {
    template: String,
    version: String,
    fingerprint: Option<KindCounts>,
    entries: Vec<(String, MappingEntry)>,
}

impl NameMappingBuilder {
    /// Start a mapping for a template version.
    pub fn new(template: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            version: version.into(),
            fingerprint: None,
            entries: Vec::new(),
        }
    }

    /// Add an entry without a declared kind.
    pub fn entry(mut self, canonical: impl Into<String>, descriptive: impl Into<String>) -> Self {
        self.entries.push((
            canonical.into(),
            MappingEntry {
                descriptive: descriptive.into(),
                kind: None,
            },
        ));
        self
    }

    /// Add an entry with the kind the field must have.
    pub fn typed_entry(
        mut self,
        canonical: impl Into<String>,
        descriptive: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        self.entries.push((
            canonical.into(),
            MappingEntry {
                descriptive: descriptive.into(),
                kind: Some(kind),
            },
        ));
        self
    }

    /// Declare the expected number of logical fields per kind.
    pub fn fingerprint(mut self, counts: KindCounts) -> Self {
        self.fingerprint = Some(counts);
        self
    }

    /// Validate and freeze the mapping.
    ///
    /// Fails on a repeated canonical or descriptive name, and on a
    /// descriptive name that is also a canonical name.
    pub fn build(self) -> Result<NameMapping> {
        let mut entries = IndexMap::with_capacity(self.entries.len());
        let mut inverse = HashMap::with_capacity(self.entries.len());

        for (canonical, entry) in self.entries {
            if canonical.is_empty() || entry.descriptive.is_empty() {
                return Err(Error::Mapping(format!("empty name in entry '{}'", canonical)));
            }
            if let Some(previous) = inverse.insert(entry.descriptive.clone(), canonical.clone()) {
                return Err(Error::Mapping(format!(
                    "descriptive name '{}' used by both '{}' and '{}'",
                    entry.descriptive, previous, canonical
                )));
            }
            if entries.insert(canonical.clone(), entry).is_some() {
                return Err(Error::Mapping(format!("canonical name '{}' mapped twice", canonical)));
            }
        }

        if let Some(clash) = inverse.keys().find(|descriptive| entries.contains_key(*descriptive)) {
            return Err(Error::Mapping(format!(
                "descriptive name '{}' is also a canonical name",
                clash
            )));
        }

        let mut qualified = HashMap::new();
        for (canonical, entry) in &entries {
            let Some((parents, _)) = canonical.rsplit_once('.') else {
                continue;
            };
            let renamed = format!("{}.{}", parents, terminal(&entry.descriptive));
            if entries.contains_key(&renamed) || inverse.get(&renamed).is_some_and(|other| other != canonical) {
                return Err(Error::Mapping(format!(
                    "renaming '{}' would produce '{}', which is already a mapped name",
                    canonical, renamed
                )));
            }
            qualified.insert(renamed, canonical.clone());
        }

        Ok(NameMapping {
            template: self.template,
            version: self.version,
            fingerprint: self.fingerprint,
            entries,
            inverse,
            qualified,
        })
    }
}

/// One `/T` rewritten by [`NameMapping::rename`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedField {
    /// Canonical name before the rename
    pub from: String,
    /// Descriptive name written
    pub to: String,
}

/// Outcome of [`NameMapping::rename`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenameReport {
    /// Fields whose `/T` was rewritten
    pub renamed: Vec<RenamedField>,
    /// Fields already carrying their descriptive name
    pub already_descriptive: Vec<String>,
    /// Fields with no entry in the mapping
    pub unmapped_native_fields: Vec<String>,
}

/// Outcome of a successful [`NameMapping::verify`].
#[derive(Debug, Clone, Serialize)]
pub struct TemplateCheck {
    /// Entries that resolve to a field in the document
    pub resolved: usize,
    /// Entries in the mapping
    pub total: usize,
    /// `resolved / total`
    pub coverage: f64,
    /// Resolvable entries whose kind differs from the declared kind
    pub kind_mismatches: Vec<String>,
    /// Logical fields per kind in the document
    pub counts: KindCounts,
}

impl NameMapping {
    /// Start building a mapping.
    pub fn builder(template: impl Into<String>, version: impl Into<String>) -> NameMappingBuilder {
        NameMappingBuilder::new(template, version)
    }

    /// Parse a JSON mapping asset.
    ///
    /// Entries are either a bare descriptive name or
    /// `{ "name": ..., "kind": "text" | "button" | "choice" }`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let asset: MappingAsset = serde_json::from_str(json)?;
        let mut builder = NameMappingBuilder::new(asset.template, asset.version);
        builder.fingerprint = asset.fingerprint;
        for (canonical, entry) in asset.fields {
            builder = match entry {
                AssetEntry::Name(name) => builder.entry(canonical, name),
                AssetEntry::Detailed { name, kind: Some(kind) } => builder.typed_entry(canonical, name, kind),
                AssetEntry::Detailed { name, kind: None } => builder.entry(canonical, name),
            };
        }
        builder.build()
    }

    /// Read a JSON mapping asset from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// The bundled mapping for FinCEN SAR form 6710-06.
    pub fn sar_6710_06() -> Result<Self> {
        Self::from_json_str(SAR_6710_06)
    }

    /// Template identifier.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Template version the mapping was authored against.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Declared per-kind field counts, if any.
    pub fn fingerprint(&self) -> Option<KindCounts> {
        self.fingerprint
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in asset order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &MappingEntry)> {
        self.entries.iter().map(|(canonical, entry)| (canonical.as_str(), entry))
    }

    /// Descriptive name for a canonical name.
    pub fn descriptive(&self, canonical: &str) -> Option<&str> {
        self.entries.get(canonical).map(|entry| entry.descriptive.as_str())
    }

    /// Canonical name for a descriptive name.
    pub fn canonical(&self, descriptive: &str) -> Option<&str> {
        self.inverse.get(descriptive).map(String::as_str)
    }

    /// Declared kind for a canonical name.
    pub fn expected_kind(&self, canonical: &str) -> Option<FieldKind> {
        self.entries.get(canonical).and_then(|entry| entry.kind)
    }

    /// Canonical form of a name found in a document, which may already be
    /// descriptive after a rename. A renamed hierarchical field reads back
    /// as its parents' names followed by the descriptive terminal part.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical(name)
            .or_else(|| self.qualified.get(name).map(String::as_str))
            .unwrap_or(name)
    }

    /// Every descriptive name addressing `field`: for a group, its own name
    /// followed by each option's.
    pub fn descriptive_names_for_field(&self, field: &LogicalField) -> Vec<&str> {
        let canonical = self.canonical_name(field.name());
        let mut names: Vec<&str> = self.descriptive(canonical).into_iter().collect();
        if let LogicalField::Grouped(group) = field {
            for option in &group.options {
                let option_canonical = format!("{}{}", canonical, option.suffix);
                names.extend(self.descriptive(&option_canonical));
            }
        }
        names
    }

    /// Rewrite `/T` of every mapped field to its descriptive name.
    ///
    /// Group parents are renamed; option suffixes are structural and stay
    /// derived from `/Kids` order. Running it twice changes nothing the
    /// second time.
    pub fn rename(&self, doc: &mut FormDocument) -> Result<RenameReport> {
        let table = FieldDiscoverer::discover(doc)?;
        let mut report = RenameReport::default();

        for (name, field) in table.iter() {
            let target = match field {
                LogicalField::Independent(field) => field.widget.field_ref,
                LogicalField::Grouped(group) => group.parent_ref,
            };

            if self.canonical_name(name) != name {
                report.already_descriptive.push(name.to_string());
                continue;
            }
            let Some(descriptive) = self.descriptive(name) else {
                report.unmapped_native_fields.push(name.to_string());
                continue;
            };

            self.rewrite_title(doc, target, descriptive)?;
            log::debug!("Renamed {} to {}", name, descriptive);
            report.renamed.push(RenamedField {
                from: name.to_string(),
                to: descriptive.to_string(),
            });
        }

        log::info!(
            "Renamed {} fields ({} already descriptive, {} unmapped)",
            report.renamed.len(),
            report.already_descriptive.len(),
            report.unmapped_native_fields.len()
        );
        Ok(report)
    }

    fn rewrite_title(&self, doc: &mut FormDocument, target: ObjectRef, descriptive: &str) -> Result<()> {
        let mut dict = doc.load_dict(target)?;
        // A hierarchical name keeps its parents; only the terminal part changes
        dict.insert("T".to_string(), Object::String(encode_text_string(terminal(descriptive))));
        doc.update_object(target, Object::Dictionary(dict));
        Ok(())
    }

    /// Check that a discovered template is the one this mapping was
    /// authored for.
    ///
    /// Fails with [`Error::TemplateMismatch`] when too few entries resolve,
    /// when resolvable entries have the wrong kind, or when the declared
    /// fingerprint diverges beyond the policy's tolerance.
    pub fn verify(&self, table: &FieldTable, policy: &TemplatePolicy) -> Result<TemplateCheck> {
        let mut present: HashMap<String, FieldKind> = HashMap::new();
        for (name, field) in table.iter() {
            let canonical = self.canonical_name(name).to_string();
            if let LogicalField::Grouped(group) = field {
                for option in &group.options {
                    present.insert(format!("{}{}", canonical, option.suffix), FieldKind::Button);
                }
            }
            present.insert(canonical, field.kind());
        }

        let mut resolved = 0;
        let mut kind_mismatches = Vec::new();
        for (canonical, entry) in &self.entries {
            let Some(found) = present.get(canonical) else {
                continue;
            };
            resolved += 1;
            if let Some(expected) = entry.kind {
                if expected != *found {
                    log::debug!("{}: mapping expects {}, template has {}", canonical, expected, found);
                    kind_mismatches.push(canonical.clone());
                }
            }
        }

        let total = self.entries.len();
        let coverage = if total == 0 { 1.0 } else { resolved as f64 / total as f64 };
        let counts = table.kind_counts();
        let mismatch = |reason: String| Error::TemplateMismatch {
            template: format!("{} ({})", self.template, self.version),
            reason,
        };

        if coverage < policy.min_coverage {
            return Err(mismatch(format!(
                "only {} of {} mapped fields found ({:.0}% < {:.0}%)",
                resolved,
                total,
                coverage * 100.0,
                policy.min_coverage * 100.0
            )));
        }
        if kind_mismatches.len() > policy.max_kind_mismatches {
            return Err(mismatch(format!(
                "{} fields have an unexpected kind: {}",
                kind_mismatches.len(),
                kind_mismatches.join(", ")
            )));
        }
        if let Some(expected) = self.fingerprint {
            let diverges = |a: usize, b: usize| a.abs_diff(b) > policy.fingerprint_tolerance;
            if diverges(expected.text, counts.text)
                || diverges(expected.button, counts.button)
                || diverges(expected.choice, counts.choice)
            {
                return Err(mismatch(format!(
                    "field counts {:?} differ from expected {:?}",
                    counts, expected
                )));
            }
        }

        log::debug!(
            "Template {} verified: {}/{} entries resolved",
            self.template,
            resolved,
            total
        );
        Ok(TemplateCheck {
            resolved,
            total,
            coverage,
            kind_mismatches,
            counts,
        })
    }
}

/// Last dotted part of a field name.
fn terminal(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
