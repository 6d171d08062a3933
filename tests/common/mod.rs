//! In-memory form templates shaped like the SAR layout.
//!
//! The fixture has two pages:
//!
//! - page 0: `item2` (text, MaxLen 10), `item3` (text), `item4` (combo box),
//!   `item35a` (checkbox with Yes/Off appearances), options c, a, b of the
//!   `item5` group (listed out of /Kids order), `item99` (unmapped text),
//!   plus a decoration widget, a widget with /T but no /FT, a push button,
//!   a signature field and a link annotation
//! - page 1: `item35b` (checkbox without appearances), options e and d of
//!   `item5`
//!
//! Both a classic xref-table file and an xref-stream file with the field
//! dictionaries packed into a Flate object stream are produced from the same
//! object list.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use form_oxide::forms::{FieldKind, MappingEntry, NameMapping};
use std::collections::BTreeMap;
use std::io::Write;

/// Logical fields discovered in the fixture.
pub const FIELD_COUNT: usize = 7;

/// Group on-states in /Kids order.
pub const REGULATOR_STATES: [&str; 5] = ["FRB", "FDIC", "NCUA", "OCC", "OTS"];

/// Object numbers worth poking at from tests.
pub mod ids {
    pub const ITEM2: u32 = 10;
    pub const ITEM35A: u32 = 13;
    pub const ITEM35B: u32 = 14;
    pub const ITEM5: u32 = 20;
    pub const ITEM5_KIDS: [u32; 5] = [21, 22, 23, 24, 25];
    pub const BROKEN: u32 = 31;
}

#[derive(Clone)]
enum Body {
    Dict(String),
    Stream(String, Vec<u8>),
}

/// Object list of a small fillable PDF.
#[derive(Clone)]
pub struct FormFixture {
    objects: BTreeMap<u32, Body>,
    version: &'static str,
}

impl Default for FormFixture {
    fn default() -> Self {
        Self::sar_like()
    }
}

impl FormFixture {
    /// The fixture described in the module docs.
    pub fn sar_like() -> Self {
        let mut fixture = Self {
            objects: BTreeMap::new(),
            version: "1.4",
        };

        fixture.dict(1, "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>");
        fixture.dict(2, "<< /Type /Pages /Kids [ 4 0 R 5 0 R ] /Count 2 >>");
        fixture.dict(
            3,
            "<< /Fields [ 10 0 R 11 0 R 12 0 R 13 0 R 14 0 R 20 0 R 31 0 R 32 0 R 33 0 R 34 0 R ] \
             /DA (/Helv 0 Tf 0 g) >>",
        );
        fixture.dict(
            4,
            "<< /Type /Page /Parent 2 0 R /MediaBox [ 0 0 612 792 ] \
             /Annots [ 10 0 R 11 0 R 12 0 R 13 0 R 30 0 R 31 0 R 32 0 R 35 0 R 23 0 R 21 0 R 22 0 R 33 0 R 34 0 R ] >>",
        );
        fixture.dict(
            5,
            "<< /Type /Page /Parent 2 0 R /MediaBox [ 0 0 612 792 ] /Annots [ 14 0 R 25 0 R 24 0 R ] >>",
        );
        fixture.dict(6, "<< /Producer (form fixture) /Title (SAR test template) >>");

        fixture.dict(
            10,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 20 700 220 716 ] /FT /Tx /T (item2) /MaxLen 10 >>",
        );
        fixture.dict(
            11,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 20 680 220 696 ] /FT /Tx /T (item3) /V (old) >>",
        );
        fixture.dict(
            12,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 20 660 80 676 ] /FT /Ch /Ff 131072 /T (item4) \
             /Opt [ (AL) (AK) [ (TX) (Texas) ] ] >>",
        );
        fixture.dict(
            13,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 20 640 30 650 ] /FT /Btn /T (item35a) /V /Off /AS /Off \
             /AP << /N << /Yes 40 0 R /Off 41 0 R >> >> >>",
        );
        fixture.dict(
            14,
            "<< /Type /Annot /Subtype /Widget /P 5 0 R /Rect [ 20 700 30 710 ] /FT /Btn /T (item35b) >>",
        );

        fixture.dict(
            20,
            "<< /FT /Btn /T (item5) /Ff 49152 /V /Off /Kids [ 21 0 R 22 0 R 23 0 R 24 0 R 25 0 R ] >>",
        );
        for (index, id) in ids::ITEM5_KIDS.iter().enumerate() {
            fixture.dict(*id, &regulator_kid(index, None));
        }

        // Not fillable
        fixture.dict(30, "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 0 0 10 10 ] >>");
        fixture.dict(31, "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 0 20 10 30 ] /T (broken) >>");
        fixture.dict(
            32,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 0 40 10 50 ] /FT /Btn /Ff 65536 /T (reset) >>",
        );
        fixture.dict(
            33,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 300 700 500 716 ] /FT /Tx /T (item99) >>",
        );
        fixture.dict(
            34,
            "<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 300 100 500 140 ] /FT /Sig /T (signature) >>",
        );
        fixture.dict(35, "<< /Type /Annot /Subtype /Link /Rect [ 300 50 400 60 ] /Border [ 0 0 0 ] >>");

        fixture.stream(40, "<< /Type /XObject /Subtype /Form /BBox [ 0 0 10 10 ] >>", b"q 0 g 1 1 8 8 re f Q");
        fixture.stream(41, "<< /Type /XObject /Subtype /Form /BBox [ 0 0 10 10 ] >>", b"");

        fixture
    }

    /// Same objects without the `/AcroForm` entry.
    pub fn without_acroform() -> Self {
        let mut fixture = Self::sar_like();
        fixture.dict(1, "<< /Type /Catalog /Pages 2 0 R >>");
        fixture.objects.remove(&3);
        fixture
    }

    /// A one-page template with a widget for every entry of `mapping`,
    /// plus unmapped text fields named by `extra_text_fields`.
    ///
    /// Entries named `<base><letter>` become options of `<base>` when the
    /// base is a button entry. Undeclared kinds are taken from the
    /// descriptive name's `_checkbox` suffix.
    pub fn from_mapping(mapping: &NameMapping, extra_text_fields: &[&str]) -> Self {
        let entries: Vec<(&str, &MappingEntry)> = mapping.entries().collect();
        let kind_of = |entry: &MappingEntry| {
            entry.kind.unwrap_or(if entry.descriptive.ends_with("_checkbox") {
                FieldKind::Button
            } else {
                FieldKind::Text
            })
        };
        let options_of = |base: &str| {
            entries
                .iter()
                .map(|(canonical, _)| *canonical)
                .filter(|canonical| {
                    canonical
                        .strip_prefix(base)
                        .is_some_and(|rest| rest.len() == 1 && rest.as_bytes()[0].is_ascii_lowercase())
                })
                .collect::<Vec<&str>>()
        };
        let groups: Vec<&str> = entries
            .iter()
            .filter(|(canonical, entry)| kind_of(entry) == FieldKind::Button && !options_of(canonical).is_empty())
            .map(|(canonical, _)| *canonical)
            .collect();

        let mut fixture = Self {
            objects: BTreeMap::new(),
            version: "1.4",
        };
        let mut next_id = 100;
        let mut fields = Vec::new();
        let mut annots = Vec::new();
        let widget = |kind: FieldKind, extra: &str| {
            let ft = match kind {
                FieldKind::Text => "/FT /Tx",
                FieldKind::Button => "/FT /Btn /AP << /N << /Yes 40 0 R /Off 41 0 R >> >>",
                FieldKind::Choice => "/FT /Ch",
            };
            format!("<< /Type /Annot /Subtype /Widget /P 4 0 R /Rect [ 0 0 10 10 ] {} {} >>", ft, extra)
        };

        for (canonical, entry) in &entries {
            if groups.iter().any(|base| options_of(base).contains(canonical)) {
                continue;
            }
            let id = next_id;
            next_id += 1;
            fields.push(id);

            if groups.contains(canonical) {
                let kids: Vec<u32> = (next_id..next_id + options_of(canonical).len() as u32).collect();
                next_id += kids.len() as u32;
                let kid_refs: Vec<String> = kids.iter().map(|kid| format!("{} 0 R", kid)).collect();
                fixture.dict(
                    id,
                    &format!("<< /FT /Btn /T ({}) /Ff 49152 /Kids [ {} ] >>", canonical, kid_refs.join(" ")),
                );
                for kid in kids {
                    fixture.dict(
                        kid,
                        &format!(
                            "<< /Type /Annot /Subtype /Widget /Parent {} 0 R /P 4 0 R /Rect [ 0 0 10 10 ] \
                             /AP << /N << /On{} 40 0 R /Off 41 0 R >> >> >>",
                            id, kid
                        ),
                    );
                    annots.push(kid);
                }
            } else {
                fixture.dict(id, &widget(kind_of(entry), &format!("/T ({})", canonical)));
                annots.push(id);
            }
        }
        for name in extra_text_fields {
            let id = next_id;
            next_id += 1;
            fixture.dict(id, &widget(FieldKind::Text, &format!("/T ({})", name)));
            fields.push(id);
            annots.push(id);
        }

        let refs = |ids: &[u32]| ids.iter().map(|id| format!("{} 0 R", id)).collect::<Vec<_>>().join(" ");
        fixture.dict(1, "<< /Type /Catalog /Pages 2 0 R /AcroForm 3 0 R >>");
        fixture.dict(2, "<< /Type /Pages /Kids [ 4 0 R ] /Count 1 >>");
        fixture.dict(3, &format!("<< /Fields [ {} ] >>", refs(&fields)));
        fixture.dict(
            4,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [ 0 0 612 792 ] /Annots [ {} ] >>",
                refs(&annots)
            ),
        );
        fixture.dict(6, &format!("<< /Title ({}) >>", mapping.template()));
        fixture.stream(40, "<< /Type /XObject /Subtype /Form /BBox [ 0 0 10 10 ] >>", b"q 0 g 1 1 8 8 re f Q");
        fixture.stream(41, "<< /Type /XObject /Subtype /Form /BBox [ 0 0 10 10 ] >>", b"");
        fixture
    }

    /// Give every `item5` option a `/T` of its own (`0`..`4`), as some
    /// authoring tools do.
    pub fn with_titled_options(&mut self) -> &mut Self {
        for (index, id) in ids::ITEM5_KIDS.iter().enumerate() {
            self.dict(*id, &regulator_kid(index, Some(&index.to_string())));
        }
        self
    }

    /// Replace or add an object.
    pub fn dict(&mut self, id: u32, body: &str) -> &mut Self {
        self.objects.insert(id, Body::Dict(body.to_string()));
        self
    }

    /// Replace or add a stream object; `/Length` is filled in.
    pub fn stream(&mut self, id: u32, dict: &str, data: &[u8]) -> &mut Self {
        self.objects.insert(id, Body::Stream(dict.to_string(), data.to_vec()));
        self
    }

    fn size(&self) -> u32 {
        self.objects.keys().next_back().map_or(1, |max| max + 1)
    }

    /// Classic layout: objects, xref table, trailer.
    pub fn to_table_pdf(&self) -> Vec<u8> {
        let mut pdf = format!("%PDF-{}\n", self.version).into_bytes();
        pdf.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");
        let mut offsets = BTreeMap::new();

        for (id, body) in &self.objects {
            offsets.insert(*id, pdf.len());
            write_object(&mut pdf, *id, body);
        }

        let size = self.size();
        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f\r\n");
        for id in 1..size {
            match offsets.get(&id) {
                Some(offset) => pdf.extend_from_slice(format!("{:010} 00000 n\r\n", offset).as_bytes()),
                None => pdf.extend_from_slice(b"0000000000 00001 f\r\n"),
            }
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R /Info 6 0 R /ID [ <0123456789ABCDEF> <0123456789ABCDEF> ] >>\n\
                 startxref\n{}\n%%EOF\n",
                size, xref
            )
            .as_bytes(),
        );
        pdf
    }

    /// PDF 1.5 layout: dictionaries in one Flate object stream, streams at
    /// top level, and a compressed xref stream.
    pub fn to_objstm_pdf(&self) -> Vec<u8> {
        let objstm_id = self.size();
        let xref_id = objstm_id + 1;

        let mut header = String::new();
        let mut packed = Vec::new();
        let mut members = BTreeMap::new();
        for (id, body) in &self.objects {
            if let Body::Dict(text) = body {
                members.insert(*id, members.len());
                header.push_str(&format!("{} {} ", id, packed.len()));
                packed.extend_from_slice(text.as_bytes());
                packed.push(b'\n');
            }
        }
        let first = header.len();
        let mut content = header.into_bytes();
        content.extend_from_slice(&packed);

        let mut pdf = b"%PDF-1.5\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let mut offsets = BTreeMap::new();
        for (id, body) in &self.objects {
            if let Body::Stream(..) = body {
                offsets.insert(*id, pdf.len());
                write_object(&mut pdf, *id, body);
            }
        }

        offsets.insert(objstm_id, pdf.len());
        write_object(
            &mut pdf,
            objstm_id,
            &Body::Stream(
                format!(
                    "<< /Type /ObjStm /N {} /First {} /Filter /FlateDecode >>",
                    members.len(),
                    first
                ),
                zlib(&content),
            ),
        );

        let xref_offset = pdf.len();
        offsets.insert(xref_id, xref_offset);
        let mut rows = Vec::new();
        for id in 0..=xref_id {
            let (kind, field2, field3): (u8, u32, u16) = if let Some(offset) = offsets.get(&id) {
                (1, *offset as u32, 0)
            } else if let Some(index) = members.get(&id) {
                (2, objstm_id, *index as u16)
            } else {
                (0, 0, if id == 0 { 65535 } else { 1 })
            };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }
        write_object(
            &mut pdf,
            xref_id,
            &Body::Stream(
                format!(
                    "<< /Type /XRef /Size {} /W [ 1 4 2 ] /Root 1 0 R /Info 6 0 R \
                     /ID [ <0123456789ABCDEF> <0123456789ABCDEF> ] /Filter /FlateDecode >>",
                    xref_id + 1
                ),
                zlib(&rows),
            ),
        );
        pdf.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        pdf
    }
}

/// Option widget `index` of the `item5` group.
fn regulator_kid(index: usize, title: Option<&str>) -> String {
    let page = if index < 3 { 4 } else { 5 };
    let title = title.map(|t| format!(" /T ({})", t)).unwrap_or_default();
    format!(
        "<< /Type /Annot /Subtype /Widget /Parent 20 0 R{} /P {} 0 R /Rect [ {} 600 {} 610 ] /AS /Off \
         /AP << /N << /{} 40 0 R /Off 41 0 R >> >> >>",
        title,
        page,
        20 + index * 40,
        30 + index * 40,
        REGULATOR_STATES[index]
    )
}

fn write_object(pdf: &mut Vec<u8>, id: u32, body: &Body) {
    pdf.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    match body {
        Body::Dict(text) => pdf.extend_from_slice(text.as_bytes()),
        Body::Stream(dict, data) => {
            // Splice /Length into the dictionary
            let open = dict.trim_end().strip_suffix(">>").unwrap_or(dict);
            pdf.extend_from_slice(format!("{} /Length {} >>\nstream\n", open, data.len()).as_bytes());
            pdf.extend_from_slice(data);
            pdf.extend_from_slice(b"\nendstream");
        },
    }
    pdf.extend_from_slice(b"\nendobj\n");
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// The fixture as a classic xref-table PDF.
pub fn table_pdf() -> Vec<u8> {
    FormFixture::sar_like().to_table_pdf()
}

/// The fixture as an xref-stream PDF with an object stream.
pub fn objstm_pdf() -> Vec<u8> {
    FormFixture::sar_like().to_objstm_pdf()
}

/// Mapping authored against the fixture. `item99` is deliberately absent.
pub fn fixture_mapping() -> NameMapping {
    NameMapping::builder("SAR test template", "fixture-1")
        .typed_entry("item2", "institution_name_text", FieldKind::Text)
        .typed_entry("item3", "institution_ein_text", FieldKind::Text)
        .typed_entry("item4", "institution_state_choice", FieldKind::Choice)
        .typed_entry("item35a", "activity_bsa_structuring_checkbox", FieldKind::Button)
        .typed_entry("item35b", "activity_bribery_checkbox", FieldKind::Button)
        .typed_entry("item5", "regulator_group", FieldKind::Button)
        .typed_entry("item5a", "regulator_frb_checkbox", FieldKind::Button)
        .typed_entry("item5b", "regulator_fdic_checkbox", FieldKind::Button)
        .typed_entry("item5c", "regulator_ncua_checkbox", FieldKind::Button)
        .typed_entry("item5d", "regulator_occ_checkbox", FieldKind::Button)
        .typed_entry("item5e", "regulator_ots_checkbox", FieldKind::Button)
        .build()
        .unwrap()
}
