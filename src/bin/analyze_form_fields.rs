//! Form field analyzer
//!
//! Prints the logical fields of a fillable PDF as JSON: canonical name,
//! descriptive name under a mapping, kind, page, constraints and button
//! states. Used when authoring a mapping for a new template version.
//!
//! Usage: `analyze_form_fields <template.pdf> [mapping.json]`
//!
//! Without a mapping file the bundled SAR 6710-06 mapping is used.

use form_oxide::forms::{DiscoveryReport, FieldDiscoverer, LogicalField, NameMapping};
use form_oxide::{Error, FormDocument};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Serialize)]
struct FieldRow<'a> {
    name: &'a str,
    descriptive: Option<&'a str>,
    kind: &'static str,
    structure: &'static str,
    page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    states: BTreeSet<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
    lacks_appearance: bool,
}

#[derive(Debug, Serialize)]
struct Analysis<'a> {
    template: &'a str,
    pdf_version: String,
    pages: usize,
    mapping: String,
    fields: Vec<FieldRow<'a>>,
    discovery: &'a DiscoveryReport,
}

fn row<'a>(mapping: &'a NameMapping, name: &'a str, field: &'a LogicalField) -> FieldRow<'a> {
    let widgets = field.widgets();
    let first = widgets.first();
    let canonical = mapping.canonical_name(name);

    let (structure, options) = match field {
        LogicalField::Independent(independent) => ("independent", independent.widget.choice_options.clone()),
        LogicalField::Grouped(group) => (
            "grouped",
            group
                .options
                .iter()
                .map(|option| {
                    let descriptive = mapping.descriptive(&format!("{}{}", canonical, option.suffix));
                    match descriptive {
                        Some(descriptive) => format!("{} ({})", option.name, descriptive),
                        None => option.name.clone(),
                    }
                })
                .collect(),
        ),
    };

    FieldRow {
        name,
        descriptive: mapping.descriptive(canonical),
        kind: field.kind().as_str(),
        structure,
        page: first.map(|w| w.page_index).unwrap_or(0),
        max_length: first.and_then(|w| w.max_length),
        states: widgets
            .iter()
            .flat_map(|w| w.appearance_states.iter().map(String::as_str))
            .collect(),
        options,
        lacks_appearance: widgets.iter().any(|w| w.lacks_appearance),
    }
}

fn run(pdf_path: &str, mapping_path: Option<&str>) -> Result<(), Error> {
    let mapping = match mapping_path {
        Some(path) => NameMapping::from_path(path)?,
        None => NameMapping::sar_6710_06()?,
    };

    let mut doc = FormDocument::open(pdf_path)?;
    let (major, minor) = doc.version();
    let pages = doc.page_count()?;
    let table = FieldDiscoverer::discover(&mut doc)?;
    log::info!("{}: {} logical fields on {} pages", pdf_path, table.len(), pages);

    let analysis = Analysis {
        template: pdf_path,
        pdf_version: format!("{}.{}", major, minor),
        pages,
        mapping: format!("{} ({})", mapping.template(), mapping.version()),
        fields: table.iter().map(|(name, field)| row(&mapping, name, field)).collect(),
        discovery: table.report(),
    };
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    let counts = table.kind_counts();
    eprintln!(
        "{} text, {} button, {} choice fields; {} skipped widgets, {} name conflicts",
        counts.text,
        counts.button,
        counts.choice,
        table.report().skipped.len(),
        table.report().conflicts.len()
    );
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <template.pdf> [mapping.json]", args[0]);
        std::process::exit(2);
    }

    if let Err(e) = run(&args[1], args.get(2).map(String::as_str)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
