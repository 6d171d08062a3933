//! Field discovery.
//!
//! Walks every widget annotation page by page and classifies it into the
//! [`FieldTable`]. Button widgets whose `/Parent` carries a `/T` are options
//! of an exclusive group; everything else is an
//! independent field. Grouping is decided only by that parent link, never
//! by names that happen to share a prefix.

use crate::document::FormDocument;
use crate::error::{Error, Result};
use crate::forms::field::{
    option_suffix, DiscoveryReport, FieldFlags, FieldGroup, FieldKind, FieldTable, FieldValue, FieldWidget,
    GroupOption, IndependentField, LogicalField, SkippedWidget,
};
use crate::forms::text::decode_text_string;
use crate::object::{Dict, Object, ObjectRef};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Deepest field hierarchy followed through `/Parent`.
const MAX_FIELD_DEPTH: usize = 32;

/// Keys a field inherits from its ancestors.
const INHERITABLE: [&str; 6] = ["FT", "Ff", "V", "DV", "MaxLen", "Opt"];

/// Discovers the logical fields of a form.
pub struct FieldDiscoverer;

/// A widget dictionary with its `/Parent` ancestors, nearest first.
struct FieldChain {
    links: Vec<(ObjectRef, Dict)>,
}

impl FieldChain {
    fn load(doc: &mut FormDocument, widget_ref: ObjectRef) -> Result<Self> {
        let mut links = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(widget_ref);

        while let Some(obj_ref) = current {
            if !seen.insert(obj_ref) {
                return Err(Error::CircularReference(obj_ref));
            }
            if links.len() >= MAX_FIELD_DEPTH {
                return Err(Error::RecursionLimitExceeded(MAX_FIELD_DEPTH as u32));
            }
            let dict = doc.load_dict(obj_ref)?;
            current = match dict.get("Parent") {
                None => None,
                Some(Object::Reference(parent)) => Some(*parent),
                Some(other) => {
                    return Err(Error::InvalidObjectType {
                        expected: "Reference".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            links.push((obj_ref, dict));
        }

        Ok(Self { links })
    }

    fn widget(&self) -> &Dict {
        &self.links[0].1
    }

    fn parent(&self) -> Option<&(ObjectRef, Dict)> {
        self.links.get(1)
    }

    /// Nearest value of an inheritable key.
    fn inherited(&self, key: &str) -> Option<&Object> {
        debug_assert!(INHERITABLE.contains(&key));
        self.links.iter().find_map(|(_, dict)| dict.get(key))
    }

    fn any_title(&self) -> bool {
        self.links.iter().any(|(_, dict)| dict.contains_key("T"))
    }

    /// Partial names from the root down to `links[from]`, joined with `.`.
    fn qualified_name(&self, from: usize) -> Result<String> {
        let mut parts = Vec::new();
        for (_, dict) in self.links[from..].iter().rev() {
            if let Some(title) = title(dict)? {
                parts.push(title);
            }
        }
        Ok(parts.join("."))
    }
}

/// A classified widget.
enum Discovered {
    Field {
        name: String,
        widget: FieldWidget,
    },
    Option {
        group_name: String,
        parent_ref: ObjectRef,
        kid_index: usize,
        widget: FieldWidget,
    },
}

/// Mutable state of one discovery pass.
#[derive(Default)]
struct Collector {
    fields: IndexMap<String, LogicalField>,
    /// Field or group object → canonical name
    owners: HashMap<ObjectRef, String>,
    /// Option widget → position in the parent's `/Kids`
    kid_positions: HashMap<ObjectRef, usize>,
    report: DiscoveryReport,
}

impl Collector {
    fn add(&mut self, discovered: Discovered) {
        match discovered {
            Discovered::Field { name, widget } => {
                let owner = widget.field_ref;
                if self.owners.get(&owner) == Some(&name) {
                    if let Some(LogicalField::Independent(field)) = self.fields.get_mut(&name) {
                        log::debug!("Folding widget {} into field {}", widget.widget_ref, name);
                        field.extra_widgets.push(widget);
                        return;
                    }
                }
                self.claim(&name, owner);
                self.fields.insert(
                    name.clone(),
                    LogicalField::Independent(IndependentField {
                        name,
                        widget,
                        extra_widgets: Vec::new(),
                    }),
                );
            },
            Discovered::Option {
                group_name,
                parent_ref,
                kid_index,
                widget,
            } => {
                self.kid_positions.insert(widget.widget_ref, kid_index);
                let option = GroupOption {
                    name: format!("{}{}", group_name, option_suffix(kid_index)),
                    suffix: option_suffix(kid_index),
                    on_state: widget.on_state().map(str::to_string),
                };

                if self.owners.get(&parent_ref) == Some(&group_name) {
                    if let Some(LogicalField::Grouped(group)) = self.fields.get_mut(&group_name) {
                        group.widgets.push(widget);
                        group.options.push(option);
                        return;
                    }
                }
                self.claim(&group_name, parent_ref);
                self.fields.insert(
                    group_name.clone(),
                    LogicalField::Grouped(FieldGroup {
                        name: group_name,
                        parent_ref,
                        widgets: vec![widget],
                        options: vec![option],
                    }),
                );
            },
        }
    }

    /// Register `owner` as the holder of `name`, reporting a conflict if
    /// another object held it.
    fn claim(&mut self, name: &str, owner: ObjectRef) {
        if self.fields.contains_key(name) {
            log::warn!("Field name {} derived by more than one field; keeping {}", name, owner);
            self.report.conflicts.push(name.to_string());
            self.owners.retain(|_, held| held.as_str() != name);
        }
        self.owners.insert(owner, name.to_string());
    }

    fn finish(mut self) -> FieldTable {
        // Widgets may be met out of /Kids order across pages
        for field in self.fields.values_mut() {
            if let LogicalField::Grouped(group) = field {
                let positions = &self.kid_positions;
                let mut pairs: Vec<(FieldWidget, GroupOption)> =
                    group.widgets.drain(..).zip(group.options.drain(..)).collect();
                pairs.sort_by_key(|(widget, _)| positions.get(&widget.widget_ref).copied().unwrap_or(usize::MAX));
                let (widgets, options): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
                group.widgets = widgets;
                group.options = options;
            }
        }
        FieldTable::new(self.fields, self.report)
    }
}

impl FieldDiscoverer {
    /// Discover every logical field in the document.
    ///
    /// A document without `/AcroForm` yields an empty table. Malformed
    /// widgets are skipped and listed in the table's [`DiscoveryReport`].
    pub fn discover(doc: &mut FormDocument) -> Result<FieldTable> {
        if doc.acroform()?.is_none() {
            log::info!("Document has no /AcroForm; no fields to discover");
            return Ok(FieldTable::default());
        }

        let mut collector = Collector::default();
        for (page_index, widget_ref) in doc.widget_annotations()? {
            match Self::classify(doc, page_index, widget_ref) {
                Ok(Some(discovered)) => collector.add(discovered),
                Ok(None) => {},
                Err(e) => {
                    log::warn!("Skipping widget {} on page {}: {}", widget_ref, page_index, e);
                    collector.report.skipped.push(SkippedWidget {
                        widget: widget_ref.to_string(),
                        page_index,
                        reason: e.to_string(),
                    });
                },
            }
        }

        let table = collector.finish();
        log::debug!(
            "Discovered {} logical fields ({} groups, {} skipped widgets)",
            table.len(),
            table.groups().count(),
            table.report().skipped.len()
        );
        Ok(table)
    }

    /// Classify one widget. `Ok(None)` for widgets that are not fillable
    /// fields (decorations, push buttons, signatures).
    fn classify(doc: &mut FormDocument, page_index: usize, widget_ref: ObjectRef) -> Result<Option<Discovered>> {
        let chain = FieldChain::load(doc, widget_ref)?;
        let own_title = title(chain.widget())?;

        let Some(ft) = chain.inherited("FT") else {
            if chain.any_title() {
                return Err(Error::InvalidPdf("field has /T but no /FT".to_string()));
            }
            log::debug!("Widget {} has neither /T nor /FT, ignoring", widget_ref);
            return Ok(None);
        };
        let ft = doc.resolve(ft)?;
        let ft_name = ft.as_name().ok_or_else(|| Error::InvalidObjectType {
            expected: "Name".to_string(),
            found: ft.type_name().to_string(),
        })?;
        let Some(kind) = FieldKind::from_pdf_name(ft_name) else {
            if ft_name == "Sig" {
                log::debug!("Signature widget {} ignored", widget_ref);
                return Ok(None);
            }
            return Err(Error::Unsupported(format!("field type /{}", ft_name)));
        };

        let flags = match chain.inherited("Ff") {
            Some(ff) => FieldFlags::from_bits_retain(doc.resolve(ff)?.as_integer().unwrap_or(0) as u32),
            None => FieldFlags::empty(),
        };
        if kind == FieldKind::Button && flags.contains(FieldFlags::PUSH_BUTTON) {
            log::debug!("Push button {} ignored", widget_ref);
            return Ok(None);
        }

        // A button under a titled /Parent is an option of the parent's group,
        // whether or not it has a /T of its own. An untitled lone kid is the
        // parent's only widget unless the parent is a radio field.
        let mut group_kids = None;
        if kind == FieldKind::Button {
            if let Some((_, parent_dict)) = chain.parent() {
                if title(parent_dict)?.is_some() {
                    let kids = Self::kid_refs(doc, parent_dict)?;
                    if own_title.is_some() || kids.len() > 1 || flags.contains(FieldFlags::RADIO) {
                        group_kids = Some(kids);
                    }
                }
            }
        }

        // The field object is the widget when it carries /T, else its parent
        let field_index = match (&own_title, chain.parent()) {
            _ if group_kids.is_some() => 1,
            (Some(_), _) => 0,
            (None, Some(_)) => 1,
            (None, None) => return Err(Error::InvalidPdf("field has /FT but no /T".to_string())),
        };
        let (field_ref, field_dict) = &chain.links[field_index];
        let native_id = title(field_dict)?
            .ok_or_else(|| Error::InvalidPdf(format!("field {} has no /T", field_ref)))?;

        let mut widget = FieldWidget {
            native_id: native_id.clone(),
            kind,
            page_index,
            max_length: None,
            current_value: FieldValue::None,
            default_value: None,
            appearance_states: BTreeSet::new(),
            parent_id: None,
            flags,
            choice_options: Vec::new(),
            lacks_appearance: false,
            widget_ref,
            field_ref: *field_ref,
        };
        Self::read_values(doc, &chain, &mut widget)?;

        match kind {
            FieldKind::Text => {
                if let Some(max_len) = chain.inherited("MaxLen") {
                    widget.max_length = doc
                        .resolve(max_len)?
                        .as_integer()
                        .filter(|n| *n >= 0)
                        .map(|n| n as usize);
                }
            },
            FieldKind::Choice => {
                if let Some(opt) = chain.inherited("Opt") {
                    widget.choice_options = Self::choice_options(doc, opt)?;
                }
            },
            FieldKind::Button => {
                Self::read_appearance_states(doc, chain.widget(), &mut widget)?;
            },
        }

        if let Some(kids) = group_kids {
            let kid_index = kids
                .iter()
                .position(|kid| *kid == widget_ref)
                .ok_or_else(|| Error::InvalidPdf(format!("widget not listed in /Kids of {}", field_ref)))?;
            let group_name = chain.qualified_name(1)?;
            widget.parent_id = Some(native_id);
            return Ok(Some(Discovered::Option {
                group_name,
                parent_ref: *field_ref,
                kid_index,
                widget,
            }));
        }

        let name = chain.qualified_name(field_index)?;
        Ok(Some(Discovered::Field { name, widget }))
    }

    fn read_values(doc: &mut FormDocument, chain: &FieldChain, widget: &mut FieldWidget) -> Result<()> {
        if let Some(value) = chain.inherited("V") {
            widget.current_value = match doc.resolve(value)? {
                Object::String(bytes) => FieldValue::Text(decode_text_string(&bytes)),
                Object::Name(state) => FieldValue::State(state),
                _ => FieldValue::None,
            };
        }
        if let Some(default) = chain.inherited("DV") {
            widget.default_value = match doc.resolve(default)? {
                Object::String(bytes) => Some(decode_text_string(&bytes)),
                Object::Name(state) => Some(state),
                _ => None,
            };
        }
        Ok(())
    }

    /// Fill `appearance_states` from the widget's `/AP /N`.
    fn read_appearance_states(doc: &mut FormDocument, widget_dict: &Dict, widget: &mut FieldWidget) -> Result<()> {
        let normal = match widget_dict.get("AP") {
            Some(ap) => {
                let ap = doc.resolve_dict(ap)?;
                match ap.get("N") {
                    Some(n) => doc.resolve(n)?,
                    None => Object::Null,
                }
            },
            None => Object::Null,
        };

        match normal.as_dict() {
            Some(states) if !states.is_empty() => {
                widget.appearance_states = states.keys().cloned().collect();
            },
            _ => {
                log::debug!("Button {} has no /AP /N state dictionary", widget.widget_ref);
                widget.lacks_appearance = true;
            },
        }
        Ok(())
    }

    /// Export values of `/Opt`: plain strings or `[export display]` pairs.
    fn choice_options(doc: &mut FormDocument, opt: &Object) -> Result<Vec<String>> {
        let opt = doc.resolve(opt)?;
        let mut options = Vec::new();
        for entry in opt.as_array().into_iter().flatten() {
            let entry = doc.resolve(entry)?;
            let export = match &entry {
                Object::Array(pair) => pair.first().cloned(),
                other => Some(other.clone()),
            };
            match export.as_ref().and_then(Object::as_string) {
                Some(bytes) => options.push(decode_text_string(bytes)),
                None => log::debug!("Ignoring non-string /Opt entry {:?}", entry),
            }
        }
        Ok(options)
    }

    fn kid_refs(doc: &mut FormDocument, field: &Dict) -> Result<Vec<ObjectRef>> {
        let kids = match field.get("Kids") {
            Some(kids) => doc.resolve(kids)?,
            None => return Ok(Vec::new()),
        };
        Ok(kids.as_array().into_iter().flatten().filter_map(Object::as_reference).collect())
    }
}

/// Decoded `/T`, if present. A non-string `/T` is malformed.
fn title(dict: &Dict) -> Result<Option<String>> {
    match dict.get("T") {
        None => Ok(None),
        Some(Object::String(bytes)) => Ok(Some(decode_text_string(bytes))),
        Some(other) => Err(Error::InvalidObjectType {
            expected: "String".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}
