//! Type-aware form filling.
//!
//! The filler addresses logical fields by descriptive name (or by raw name
//! for fields the mapping does not know), writes values into the field and
//! widget dictionaries of a [`FormDocument`], and accumulates every
//! per-field problem in a [`FillReport`]. Only structural problems, such as
//! a document without an interactive form, are errors.

use crate::config::FillConfig;
use crate::document::FormDocument;
use crate::error::{Error, Result};
use crate::forms::discover::FieldDiscoverer;
use crate::forms::field::{FieldGroup, FieldKind, FieldTable, FieldWidget, IndependentField, LogicalField};
use crate::forms::naming::NameMapping;
use crate::forms::text::{encode_text_string, truncate_chars};
use crate::object::{Object, ObjectRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    /// Checkbox state or option selection
    Bool(bool),
    /// Number, written as its JSON text
    Number(serde_json::Number),
    /// Text, or the option to select in a group
    Text(String),
}

impl FillValue {
    /// Textual form for text and choice fields. `None` for booleans.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FillValue::Text(text) => Some(text.clone()),
            FillValue::Number(number) => Some(number.to_string()),
            FillValue::Bool(_) => None,
        }
    }
}

impl From<bool> for FillValue {
    fn from(value: bool) -> Self {
        FillValue::Bool(value)
    }
}

impl From<&str> for FillValue {
    fn from(value: &str) -> Self {
        FillValue::Text(value.to_string())
    }
}

impl From<String> for FillValue {
    fn from(value: String) -> Self {
        FillValue::Text(value)
    }
}

impl From<i64> for FillValue {
    fn from(value: i64) -> Self {
        FillValue::Number(value.into())
    }
}

/// Values keyed by descriptive name, in caller order.
///
/// ```
/// use form_oxide::forms::FillRequest;
///
/// let request = FillRequest::from_json_str(
///     r#"{"financial_institution_name": "First National Bank of Testing", "regulator_fdic": true}"#,
/// )?;
/// assert_eq!(request.len(), 2);
/// # Ok::<(), form_oxide::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillRequest {
    values: IndexMap<String, FillValue>,
}

impl FillRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of name → string, boolean or number.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FillValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FillValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a value.
    pub fn get(&self, name: &str) -> Option<&FillValue> {
        self.values.get(name)
    }

    /// Entries in caller order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FillValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the request is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<FillValue>> FromIterator<(K, V)> for FillRequest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A per-field problem that did not stop the fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillWarning {
    /// Button state written to `/V` only; the widget has no matching
    /// appearance, so a viewer must regenerate it
    LacksAppearance {
        /// Field name
        field: String,
    },
    /// Group value named no option; every option was turned off
    OptionNotFound {
        /// Group name
        field: String,
        /// Value supplied
        value: String,
    },
    /// Several options of one group were set to true; the first was used
    ConflictingSelection {
        /// Group name
        field: String,
        /// Option key that was applied
        selected: String,
        /// Option keys that were ignored
        ignored: Vec<String>,
    },
    /// Widget left out of discovery
    SkippedWidget {
        /// Annotation reference
        widget: String,
        /// Page index
        page_index: usize,
        /// Reason
        reason: String,
    },
    /// Two fields derived the same name; the last one is filled
    NameConflict {
        /// Contested name
        name: String,
    },
    /// A group was addressed both as a whole and per option; the group key won
    AmbiguousGroupRequest {
        /// Group name
        field: String,
        /// Option keys that were ignored
        ignored: Vec<String>,
    },
}

/// Diagnostics of one fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FillReport {
    /// Fields in the document with no mapping entry
    pub unmapped_native_fields: Vec<String>,
    /// Request keys that matched no field
    pub unused_request_keys: Vec<String>,
    /// Request keys whose value type did not fit the field
    pub type_mismatches: Vec<String>,
    /// Fields written
    pub filled_fields: Vec<String>,
    /// Everything else worth knowing
    pub warnings: Vec<FillWarning>,
}

impl FillReport {
    /// True when nothing was unmapped, unused, mistyped or warned about.
    pub fn is_clean(&self) -> bool {
        self.unmapped_native_fields.is_empty()
            && self.unused_request_keys.is_empty()
            && self.type_mismatches.is_empty()
            && self.warnings.is_empty()
    }
}

/// Writes a [`FillRequest`] into a document.
pub struct Filler<'a> {
    mapping: &'a NameMapping,
    config: &'a FillConfig,
}

/// Per-fill bookkeeping.
struct FillState<'r> {
    request: &'r FillRequest,
    used: HashSet<&'r str>,
    report: FillReport,
}

impl<'r> FillState<'r> {
    /// First candidate name present in the request; every present candidate
    /// counts as used.
    fn take<'n>(&mut self, candidates: &[&'n str]) -> Option<(&'r str, &'r FillValue)> {
        let request: &'r FillRequest = self.request;
        let mut found = None;
        for candidate in candidates {
            if let Some((key, value)) = request.values.get_key_value(*candidate) {
                self.used.insert(key.as_str());
                found.get_or_insert((key.as_str(), value));
            }
        }
        found
    }
}

impl<'a> Filler<'a> {
    /// Create a filler.
    pub fn new(mapping: &'a NameMapping, config: &'a FillConfig) -> Self {
        Self { mapping, config }
    }

    /// Discover the document's fields and fill them.
    pub fn fill(&self, doc: &mut FormDocument, request: &FillRequest) -> Result<FillReport> {
        if doc.acroform()?.is_none() {
            return Err(Error::NotAForm);
        }
        let table = FieldDiscoverer::discover(doc)?;
        self.fill_table(doc, &table, request)
    }

    /// Fill using a table already discovered from `doc`.
    pub fn fill_table(&self, doc: &mut FormDocument, table: &FieldTable, request: &FillRequest) -> Result<FillReport> {
        let (location, mut form) = doc.acroform()?.ok_or(Error::NotAForm)?;
        let mut state = FillState {
            request,
            used: HashSet::new(),
            report: FillReport::default(),
        };

        for skipped in &table.report().skipped {
            state.report.warnings.push(FillWarning::SkippedWidget {
                widget: skipped.widget.clone(),
                page_index: skipped.page_index,
                reason: skipped.reason.clone(),
            });
        }
        for name in &table.report().conflicts {
            state.report.warnings.push(FillWarning::NameConflict { name: name.clone() });
        }

        for (_, field) in table.iter() {
            match field {
                LogicalField::Independent(field) => self.fill_independent(doc, field, &mut state)?,
                LogicalField::Grouped(group) => self.fill_group(doc, group, &mut state)?,
            }
        }

        let mut report = state.report;
        report.unused_request_keys = request
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !state.used.contains(key))
            .map(str::to_string)
            .collect();

        if self.config.need_appearances && form.get("NeedAppearances").and_then(Object::as_bool) != Some(true) {
            form.insert("NeedAppearances".to_string(), Object::Boolean(true));
            doc.update_acroform(location, form)?;
        }

        log::info!(
            "Filled {} fields ({} unmapped, {} unused keys, {} type mismatches, {} warnings)",
            report.filled_fields.len(),
            report.unmapped_native_fields.len(),
            report.unused_request_keys.len(),
            report.type_mismatches.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    fn fill_independent(&self, doc: &mut FormDocument, field: &IndependentField, state: &mut FillState<'_>) -> Result<()> {
        let canonical = self.mapping.canonical_name(&field.name);
        let descriptive = self.mapping.descriptive(canonical);
        if descriptive.is_none() {
            state.report.unmapped_native_fields.push(field.name.clone());
        }

        let mut candidates: Vec<&str> = descriptive.into_iter().collect();
        candidates.push(&field.name);
        candidates.push(canonical);
        let Some((key, value)) = state.take(&candidates) else {
            return Ok(());
        };
        let display = descriptive.unwrap_or(&field.name).to_string();

        match field.widget.kind {
            FieldKind::Text | FieldKind::Choice => {
                let Some(text) = value.as_text() else {
                    log::debug!("{}: boolean supplied for {} field", key, field.widget.kind);
                    state.report.type_mismatches.push(key.to_string());
                    return Ok(());
                };
                self.write_text(doc, &field.widget, &text)?;
            },
            FieldKind::Button => {
                let FillValue::Bool(checked) = value else {
                    log::debug!("{}: non-boolean supplied for button field", key);
                    state.report.type_mismatches.push(key.to_string());
                    return Ok(());
                };
                if !self.write_checkbox(doc, field, *checked)? {
                    log::warn!("{}: no appearance for the chosen state, viewer must regenerate", display);
                    state.report.warnings.push(FillWarning::LacksAppearance { field: display.clone() });
                }
            },
        }

        state.report.filled_fields.push(display);
        Ok(())
    }

    /// Replace `/V` with the (truncated) text in one update.
    fn write_text(&self, doc: &mut FormDocument, widget: &FieldWidget, text: &str) -> Result<()> {
        let value = match widget.max_length {
            Some(max) => truncate_chars(text, max),
            None => text,
        };
        if widget.kind == FieldKind::Choice
            && !widget.choice_options.is_empty()
            && !widget.choice_options.iter().any(|option| option == value)
        {
            log::debug!("{}: '{}' is not among the declared options", widget.native_id, value);
        }

        let mut dict = doc.load_dict(widget.field_ref)?;
        dict.insert("V".to_string(), Object::String(encode_text_string(value)));
        doc.update_object(widget.field_ref, Object::Dictionary(dict));
        Ok(())
    }

    /// Set `/V` on the field and `/AS` on every widget whose catalog has
    /// both states. Returns false when some widget lacked them.
    fn write_checkbox(&self, doc: &mut FormDocument, field: &IndependentField, checked: bool) -> Result<bool> {
        let (on, off) = (self.config.on_state.as_str(), self.config.off_state.as_str());
        let state = if checked { on } else { off };

        set_name(doc, field.widget.field_ref, "V", state)?;
        let mut complete = true;
        for widget in field.widgets() {
            if widget.has_states(on, off) {
                set_name(doc, widget.widget_ref, "AS", state)?;
            } else {
                complete = false;
            }
        }
        Ok(complete)
    }

    fn fill_group(&self, doc: &mut FormDocument, group: &FieldGroup, state: &mut FillState<'_>) -> Result<()> {
        let canonical = self.mapping.canonical_name(&group.name).to_string();
        let descriptive = self.mapping.descriptive(&canonical);

        // Per option: descriptive name, raw name, canonical name
        let option_names: Vec<(Option<&str>, String)> = group
            .options
            .iter()
            .map(|option| {
                let option_canonical = format!("{}{}", canonical, option.suffix);
                (self.mapping.descriptive(&option_canonical), option_canonical)
            })
            .collect();

        if descriptive.is_none() && option_names.iter().all(|(d, _)| d.is_none()) {
            state.report.unmapped_native_fields.push(group.name.clone());
        }
        let display = descriptive.unwrap_or(&group.name).to_string();

        let mut group_candidates: Vec<&str> = descriptive.into_iter().collect();
        group_candidates.push(&group.name);
        group_candidates.push(&canonical);
        let group_entry = state.take(&group_candidates);

        let mut option_entries = Vec::new();
        for (index, (option_descriptive, option_canonical)) in option_names.iter().enumerate() {
            let mut candidates: Vec<&str> = option_descriptive.iter().copied().collect();
            candidates.push(&group.options[index].name);
            candidates.push(option_canonical);
            if let Some((key, value)) = state.take(&candidates) {
                option_entries.push((index, key, value));
            }
        }

        let selection = match group_entry {
            Some((key, value)) => {
                if !option_entries.is_empty() {
                    state.report.warnings.push(FillWarning::AmbiguousGroupRequest {
                        field: display.clone(),
                        ignored: option_entries.iter().map(|(_, k, _)| k.to_string()).collect(),
                    });
                }
                let Some(wanted) = value.as_text() else {
                    state.report.type_mismatches.push(key.to_string());
                    return Ok(());
                };
                let found = option_names
                    .iter()
                    .position(|(d, c)| *d == Some(wanted.as_str()) || *c == wanted)
                    .or_else(|| group.find_option(&wanted));
                if found.is_none() {
                    log::warn!("{}: '{}' names no option, clearing the group", display, wanted);
                    state.report.warnings.push(FillWarning::OptionNotFound {
                        field: display.clone(),
                        value: wanted,
                    });
                }
                found
            },
            None if option_entries.is_empty() => return Ok(()),
            None => {
                let mut checked = Vec::new();
                let mut any_valid = false;
                for (index, key, value) in &option_entries {
                    match value {
                        FillValue::Bool(true) => {
                            any_valid = true;
                            checked.push((*index, *key));
                        },
                        FillValue::Bool(false) => any_valid = true,
                        _ => state.report.type_mismatches.push(key.to_string()),
                    }
                }
                if !any_valid {
                    return Ok(());
                }
                if checked.len() > 1 {
                    state.report.warnings.push(FillWarning::ConflictingSelection {
                        field: display.clone(),
                        selected: checked[0].1.to_string(),
                        ignored: checked[1..].iter().map(|(_, k)| k.to_string()).collect(),
                    });
                }
                checked.first().map(|(index, _)| *index)
            },
        };

        if !self.select_option(doc, group, selection)? {
            state.report.warnings.push(FillWarning::LacksAppearance { field: display.clone() });
        }
        state.report.filled_fields.push(display);
        Ok(())
    }

    /// Turn on at most one option and every other option off. Returns
    /// false when a widget lacked the appearance for its new state.
    fn select_option(&self, doc: &mut FormDocument, group: &FieldGroup, selection: Option<usize>) -> Result<bool> {
        let off = self.config.off_state.as_str();
        let mut complete = true;
        let mut chosen_state = off.to_string();

        for (index, widget) in group.widgets.iter().enumerate() {
            let state = if Some(index) == selection {
                let on = widget.on_state().unwrap_or(&self.config.on_state).to_string();
                chosen_state = on.clone();
                on
            } else {
                off.to_string()
            };
            if !widget.appearance_states.contains(&state) {
                complete = false;
            }
            set_name(doc, widget.widget_ref, "AS", &state)?;
        }

        set_name(doc, group.parent_ref, "V", &chosen_state)?;
        Ok(complete)
    }
}

/// Set a name-valued key on an object.
fn set_name(doc: &mut FormDocument, target: ObjectRef, key: &str, name: &str) -> Result<()> {
    let mut dict = doc.load_dict(target)?;
    dict.insert(key.to_string(), Object::Name(name.to_string()));
    doc.update_object(target, Object::Dictionary(dict));
    Ok(())
}
