//! Field model produced by discovery.

use crate::object::ObjectRef;
use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

bitflags! {
    /// `/Ff` bits the engine looks at (ISO 32000-1, Tables 221, 226, 230).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct FieldFlags: u32 {
        /// Bit 1: read-only
        const READ_ONLY = 1 << 0;
        /// Bit 2: required
        const REQUIRED = 1 << 1;
        /// Bit 16: radio button
        const RADIO = 1 << 15;
        /// Bit 17: push button
        const PUSH_BUTTON = 1 << 16;
        /// Bit 18: combo box
        const COMBO = 1 << 17;
    }
}

/// Field kind from `/FT`. Signature fields are never discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// `/Tx`
    Text,
    /// `/Btn` (checkbox or radio; push buttons are skipped)
    Button,
    /// `/Ch`
    Choice,
}

impl FieldKind {
    /// Map a `/FT` name. `None` for `/Sig` and unknown kinds.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "Tx" => Some(FieldKind::Text),
            "Btn" => Some(FieldKind::Button),
            "Ch" => Some(FieldKind::Choice),
            _ => None,
        }
    }

    /// Lowercase label used in mapping assets and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Button => "button",
            FieldKind::Choice => "choice",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored `/V` of a field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// No value
    #[default]
    None,
    /// Text string value
    Text(String),
    /// Name value (button state, e.g. `Yes` / `Off`)
    State(String),
}

/// One widget annotation of a field, on one page.
#[derive(Debug, Clone, Serialize)]
pub struct FieldWidget {
    /// Identifier as stored; for a group option, the parent's identifier
    pub native_id: String,
    /// Field kind
    pub kind: FieldKind,
    /// Zero-based page the widget sits on
    pub page_index: usize,
    /// `/MaxLen` (text only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// `/V`
    pub current_value: FieldValue,
    /// `/DV` as text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Names in `/AP /N` (buttons only)
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub appearance_states: BTreeSet<String>,
    /// Group identifier when the widget is one option of a group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// `/Ff`, inherited
    pub flags: FieldFlags,
    /// Export values from `/Opt` (choice only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choice_options: Vec<String>,
    /// Button without an `/AP /N` dictionary
    pub lacks_appearance: bool,
    /// The widget annotation
    #[serde(skip)]
    pub widget_ref: ObjectRef,
    /// The object holding `/T` and `/V` (the widget itself when merged)
    #[serde(skip)]
    pub field_ref: ObjectRef,
}

impl FieldWidget {
    /// First appearance state other than `Off`.
    pub fn on_state(&self) -> Option<&str> {
        self.appearance_states
            .iter()
            .map(String::as_str)
            .find(|state| *state != "Off")
    }

    /// Whether the appearance catalog holds both states.
    pub fn has_states(&self, on: &str, off: &str) -> bool {
        self.appearance_states.contains(on) && self.appearance_states.contains(off)
    }

    /// Whether the widget is a separate annotation under its field.
    pub fn is_kid(&self) -> bool {
        self.widget_ref != self.field_ref
    }
}

/// One exclusive option of a grouped button field.
#[derive(Debug, Clone, Serialize)]
pub struct GroupOption {
    /// Group name plus suffix, e.g. `item5b`
    pub name: String,
    /// Suffix letter(s) from the position in the parent's `/Kids`
    pub suffix: String,
    /// The widget's own on-state, if its appearance catalog has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_state: Option<String>,
}

/// Button widgets sharing one parent field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldGroup {
    /// Fully qualified name of the parent field
    pub name: String,
    /// The parent field object
    #[serde(skip)]
    pub parent_ref: ObjectRef,
    /// Widgets, parallel to `options`
    pub widgets: Vec<FieldWidget>,
    /// Options in `/Kids` order
    pub options: Vec<GroupOption>,
}

impl FieldGroup {
    /// Find an option by name, suffix or on-state.
    pub fn find_option(&self, wanted: &str) -> Option<usize> {
        self.options.iter().position(|option| {
            option.name == wanted || option.suffix == wanted || option.on_state.as_deref() == Some(wanted)
        })
    }
}

/// The unit a fill request addresses.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "structure", rename_all = "lowercase")]
pub enum LogicalField {
    /// One field, possibly shown by several widgets
    Independent(IndependentField),
    /// An exclusive group of button widgets under one parent
    Grouped(FieldGroup),
}

/// A field that is not part of a group.
#[derive(Debug, Clone, Serialize)]
pub struct IndependentField {
    /// Fully qualified name
    pub name: String,
    /// First widget, carrying the field attributes
    pub widget: FieldWidget,
    /// Further widgets showing the same field
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_widgets: Vec<FieldWidget>,
}

impl IndependentField {
    /// All widgets of the field.
    pub fn widgets(&self) -> impl Iterator<Item = &FieldWidget> {
        std::iter::once(&self.widget).chain(self.extra_widgets.iter())
    }
}

impl LogicalField {
    /// Canonical name of the field (group base name for groups).
    pub fn name(&self) -> &str {
        match self {
            LogicalField::Independent(field) => &field.name,
            LogicalField::Grouped(group) => &group.name,
        }
    }

    /// Field kind; groups are always buttons.
    pub fn kind(&self) -> FieldKind {
        match self {
            LogicalField::Independent(field) => field.widget.kind,
            LogicalField::Grouped(_) => FieldKind::Button,
        }
    }

    /// Every widget of the field.
    pub fn widgets(&self) -> Vec<&FieldWidget> {
        match self {
            LogicalField::Independent(field) => field.widgets().collect(),
            LogicalField::Grouped(group) => group.widgets.iter().collect(),
        }
    }

    /// Whether this is a group.
    pub fn is_group(&self) -> bool {
        matches!(self, LogicalField::Grouped(_))
    }
}

/// A widget left out of discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedWidget {
    /// Annotation reference, `n g R`
    pub widget: String,
    /// Page the annotation sits on
    pub page_index: usize,
    /// Why it was skipped
    pub reason: String,
}

/// Diagnostics collected while discovering fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryReport {
    /// Widgets that could not be classified
    pub skipped: Vec<SkippedWidget>,
    /// Canonical names claimed by more than one field (last one kept)
    pub conflicts: Vec<String>,
}

/// Number of logical fields per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    /// Text fields
    pub text: usize,
    /// Button fields and groups
    pub button: usize,
    /// Choice fields
    pub choice: usize,
}

/// Discovered fields, keyed by canonical name, in page order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldTable {
    fields: IndexMap<String, LogicalField>,
    report: DiscoveryReport,
}

impl FieldTable {
    pub(crate) fn new(fields: IndexMap<String, LogicalField>, report: DiscoveryReport) -> Self {
        Self { fields, report }
    }

    /// Look up a field by canonical name.
    pub fn get(&self, name: &str) -> Option<&LogicalField> {
        self.fields.get(name)
    }

    /// Whether a canonical name exists, counting group option names.
    pub fn contains_name(&self, name: &str) -> bool {
        self.fields.contains_key(name)
            || self.groups().any(|group| group.options.iter().any(|option| option.name == name))
    }

    /// Fields in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LogicalField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Grouped fields only.
    pub fn groups(&self) -> impl Iterator<Item = &FieldGroup> {
        self.fields.values().filter_map(|field| match field {
            LogicalField::Grouped(group) => Some(group),
            LogicalField::Independent(_) => None,
        })
    }

    /// Number of logical fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were found.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Discovery diagnostics.
    pub fn report(&self) -> &DiscoveryReport {
        &self.report
    }

    /// Count logical fields per kind.
    pub fn kind_counts(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for field in self.fields.values() {
            match field.kind() {
                FieldKind::Text => counts.text += 1,
                FieldKind::Button => counts.button += 1,
                FieldKind::Choice => counts.choice += 1,
            }
        }
        counts
    }
}

/// Option suffix for a position in `/Kids`: 0 → `a`, 25 → `z`, 26 → `aa`.
pub fn option_suffix(index: usize) -> String {
    let mut suffix = Vec::new();
    let mut n = index;
    loop {
        suffix.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    suffix.reverse();
    String::from_utf8_lossy(&suffix).into_owned()
}
