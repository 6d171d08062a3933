//! In-memory document model.
//!
//! A [`FormDocument`] keeps the original file bytes untouched and layers two
//! maps over them: a cache of objects parsed so far and an ordered overlay of
//! objects the caller has replaced. The incremental writer appends exactly
//! that overlay, so everything the filler does not touch survives byte for
//! byte.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object_at;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Maximum recursion depth for object resolution and tree walks.
const MAX_RECURSION_DEPTH: u32 = 100;

/// Where the interactive form dictionary lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcroFormLocation {
    /// `/AcroForm n g R` in the catalog
    Indirect(ObjectRef),
    /// `/AcroForm << ... >>` written inline in the catalog (the catalog's ref)
    InCatalog(ObjectRef),
}

/// A parsed PDF with a modification overlay.
///
/// ```no_run
/// use form_oxide::document::FormDocument;
///
/// let mut doc = FormDocument::open("sar-6710-06.pdf")?;
/// println!("PDF {}.{}, {} pages", doc.version().0, doc.version().1, doc.page_count()?);
/// # Ok::<(), form_oxide::Error>(())
/// ```
pub struct FormDocument {
    data: Vec<u8>,
    version: (u8, u8),
    xref: CrossRefTable,
    object_cache: HashMap<ObjectRef, Object>,
    loaded_streams: HashSet<u32>,
    resolving_stack: HashSet<ObjectRef>,
    recursion_depth: u32,
    modified: IndexMap<ObjectRef, Object>,
}

impl std::fmt::Debug for FormDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormDocument")
            .field("version", &self.version)
            .field("bytes", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.object_cache.len())
            .field("modified_objects", &self.modified.len())
            .finish_non_exhaustive()
    }
}

impl FormDocument {
    /// Read and parse a document from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// Parse a document from bytes.
    ///
    /// Validates the header, reads the whole xref chain and refuses encrypted
    /// files. Objects themselves are parsed lazily.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;
        let xref_offset = find_xref_offset(&data)?;
        let xref = parse_xref(&data, xref_offset)?;

        if xref.trailer().contains_key("Encrypt") {
            return Err(Error::Unsupported("encrypted documents cannot be filled".to_string()));
        }
        if !xref.trailer().contains_key("Root") {
            return Err(Error::InvalidPdf("Trailer missing /Root entry".to_string()));
        }

        log::debug!(
            "Parsed PDF {}.{}: {} bytes, {} xref entries ({:?})",
            version.0,
            version.1,
            data.len(),
            xref.len(),
            xref.kind()
        );

        Ok(Self {
            data,
            version,
            xref,
            object_cache: HashMap::new(),
            loaded_streams: HashSet::new(),
            resolving_stack: HashSet::new(),
            recursion_depth: 0,
            modified: IndexMap::new(),
        })
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The original bytes, exactly as read.
    pub fn original_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Merged cross-reference table.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Trailer dictionary of the newest xref section.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Reference to the document catalog.
    pub fn root_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("/Root is not a reference".to_string()))
    }

    /// Load an indirect object, preferring modified and cached copies.
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(modified) = self.modified.get(&obj_ref) {
            return Ok(modified.clone());
        }
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }

        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if !self.resolving_stack.insert(obj_ref) {
            log::error!("Circular reference detected while loading {}", obj_ref);
            return Err(Error::CircularReference(obj_ref));
        }
        self.recursion_depth += 1;

        let result = self.load_from_file(obj_ref);

        self.recursion_depth -= 1;
        self.resolving_stack.remove(&obj_ref);

        let object = result?;
        self.object_cache.insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_from_file(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = *self
            .xref
            .get(obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        match entry.entry_type {
            XRefEntryType::Uncompressed => {
                let offset = entry.offset as usize;
                let (found_ref, object) = parse_indirect_object_at(&self.data, offset)?;
                if found_ref.id != obj_ref.id {
                    return Err(Error::ParseError {
                        offset,
                        reason: format!("expected object {}, found {}", obj_ref, found_ref),
                    });
                }
                Ok(object)
            },
            XRefEntryType::Compressed => {
                let stream_num = entry.offset as u32;
                self.load_object_stream(stream_num)?;
                self.object_cache
                    .get(&ObjectRef::new(obj_ref.id, 0))
                    .cloned()
                    .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
            },
            XRefEntryType::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    /// Parse an object stream once and cache every object it holds.
    fn load_object_stream(&mut self, stream_num: u32) -> Result<()> {
        if !self.loaded_streams.insert(stream_num) {
            return Ok(());
        }

        let stream = self.load_object(ObjectRef::new(stream_num, 0))?;
        let objects = parse_object_stream(&stream)?;
        log::debug!("Object stream {} holds {} objects", stream_num, objects.len());

        for (obj_num, object) in objects {
            // Only objects the xref attributes to this stream; later updates win
            let owned_here = matches!(
                self.xref.get(obj_num),
                Some(e) if e.entry_type == XRefEntryType::Compressed && e.offset == stream_num as u64
            );
            if owned_here {
                self.object_cache.entry(ObjectRef::new(obj_num, 0)).or_insert(object);
            }
        }
        Ok(())
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        let mut seen = HashSet::new();
        while let Object::Reference(obj_ref) = current {
            if !seen.insert(obj_ref) {
                return Err(Error::CircularReference(obj_ref));
            }
            current = self.load_object(obj_ref)?;
        }
        Ok(current)
    }

    /// Resolve `obj` and require a dictionary (streams count).
    pub fn resolve_dict(&mut self, obj: &Object) -> Result<Dict> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) | Object::Stream { dict, .. } => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Load an indirect object and require a dictionary.
    pub fn load_dict(&mut self, obj_ref: ObjectRef) -> Result<Dict> {
        self.resolve_dict(&Object::Reference(obj_ref))
    }

    /// The document catalog.
    pub fn catalog(&mut self) -> Result<Dict> {
        let root = self.root_ref()?;
        self.load_dict(root)
    }

    /// Page objects in document order.
    pub fn pages(&mut self) -> Result<Vec<ObjectRef>> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("Catalog missing /Pages reference".to_string()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages_ref, 0, &mut visited, &mut pages)?;
        Ok(pages)
    }

    fn collect_pages(
        &mut self,
        node_ref: ObjectRef,
        depth: u32,
        visited: &mut HashSet<ObjectRef>,
        pages: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if !visited.insert(node_ref) {
            log::warn!("Page tree revisits {}, skipping", node_ref);
            return Ok(());
        }

        let node = self.load_dict(node_ref)?;
        let is_leaf = match node.get("Type").and_then(Object::as_name) {
            Some("Page") => true,
            Some("Pages") => false,
            _ => !node.contains_key("Kids"),
        };

        if is_leaf {
            pages.push(node_ref);
            return Ok(());
        }

        let kids = match node.get("Kids") {
            Some(kids) => self.resolve(kids)?,
            None => return Ok(()),
        };
        for kid in kids.as_array().into_iter().flatten() {
            match kid.as_reference() {
                Some(kid_ref) => self.collect_pages(kid_ref, depth + 1, visited, pages)?,
                None => log::warn!("Inline page object under {} ignored", node_ref),
            }
        }
        Ok(())
    }

    /// Number of pages.
    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Every widget annotation as (page index, annotation reference).
    ///
    /// Annotations written inline in `/Annots` cannot be updated in place and
    /// are skipped with a warning. Unreadable annotations are skipped too.
    pub fn widget_annotations(&mut self) -> Result<Vec<(usize, ObjectRef)>> {
        let mut widgets = Vec::new();

        for (page_index, page_ref) in self.pages()?.into_iter().enumerate() {
            let page = self.load_dict(page_ref)?;
            let annots = match page.get("Annots") {
                Some(annots) => self.resolve(annots)?,
                None => continue,
            };

            for annot in annots.as_array().into_iter().flatten() {
                let Some(annot_ref) = annot.as_reference() else {
                    log::warn!("Inline annotation on page {} cannot be updated, skipping", page_index);
                    continue;
                };
                match self.load_dict(annot_ref) {
                    Ok(dict) => {
                        if dict.get("Subtype").and_then(Object::as_name) == Some("Widget") {
                            widgets.push((page_index, annot_ref));
                        }
                    },
                    Err(e) => log::warn!("Unreadable annotation {} on page {}: {}", annot_ref, page_index, e),
                }
            }
        }

        Ok(widgets)
    }

    /// Locate and load the interactive form dictionary, if any.
    pub fn acroform(&mut self) -> Result<Option<(AcroFormLocation, Dict)>> {
        let root = self.root_ref()?;
        let catalog = self.load_dict(root)?;
        match catalog.get("AcroForm") {
            None => Ok(None),
            Some(Object::Reference(form_ref)) => {
                let form_ref = *form_ref;
                Ok(Some((AcroFormLocation::Indirect(form_ref), self.load_dict(form_ref)?)))
            },
            Some(Object::Dictionary(dict)) => Ok(Some((AcroFormLocation::InCatalog(root), dict.clone()))),
            Some(other) => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Replace the interactive form dictionary wherever it lives.
    pub fn update_acroform(&mut self, location: AcroFormLocation, form: Dict) -> Result<()> {
        match location {
            AcroFormLocation::Indirect(form_ref) => {
                self.update_object(form_ref, Object::Dictionary(form));
            },
            AcroFormLocation::InCatalog(root) => {
                let mut catalog = self.load_dict(root)?;
                catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
                self.update_object(root, Object::Dictionary(catalog));
            },
        }
        Ok(())
    }

    /// Record a new version of an object. The latest version wins.
    pub fn update_object(&mut self, obj_ref: ObjectRef, object: Object) {
        self.modified.insert(obj_ref, object);
    }

    /// Objects replaced since the document was parsed, in first-touch order.
    pub fn modified_objects(&self) -> impl Iterator<Item = (ObjectRef, &Object)> + '_ {
        self.modified.iter().map(|(r, o)| (*r, o))
    }

    /// Whether any object has been replaced.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }
}

/// Validate the `%PDF-M.m` header and return the version.
///
/// The header may be preceded by up to 1 KiB of junk, as viewers allow.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
        })?;

    let version = &data[pos + 5..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&data[pos..data.len().min(pos + 8)]).into_owned(),
        )),
    }
}
