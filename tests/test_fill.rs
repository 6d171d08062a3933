//! Filling the fixture template: type handling, group exclusivity and the
//! fill report.

mod common;

use common::{fixture_mapping, ids, objstm_pdf, table_pdf, FormFixture};
use form_oxide::forms::text::decode_text_string;
use form_oxide::forms::{FillReport, FillRequest, FillWarning, Filler, NameMapping};
use form_oxide::object::{Dict, Object, ObjectRef};
use form_oxide::{Error, FillConfig, FormDocument, IncrementalWriter};
use proptest::prelude::*;

fn fill_with(pdf: Vec<u8>, request: &FillRequest, config: &FillConfig) -> (FormDocument, FillReport) {
    let mapping = fixture_mapping();
    let mut doc = FormDocument::from_bytes(pdf).unwrap();
    let report = Filler::new(&mapping, config).fill(&mut doc, request).unwrap();

    // Everything is checked on the saved file, not on in-memory edits
    let bytes = IncrementalWriter::new().write(&doc).unwrap();
    (FormDocument::from_bytes(bytes).unwrap(), report)
}

fn fill(request: &FillRequest) -> (FormDocument, FillReport) {
    fill_with(table_pdf(), request, &FillConfig::default())
}

fn dict(doc: &mut FormDocument, id: u32) -> Dict {
    doc.load_dict(ObjectRef::new(id, 0)).unwrap()
}

fn text_value(doc: &mut FormDocument, id: u32) -> Option<String> {
    dict(doc, id).get("V").and_then(Object::as_string).map(decode_text_string)
}

fn name_value(doc: &mut FormDocument, id: u32, key: &str) -> Option<String> {
    dict(doc, id).get(key).and_then(Object::as_name).map(str::to_string)
}

fn regulator_states(doc: &mut FormDocument) -> Vec<String> {
    ids::ITEM5_KIDS
        .iter()
        .map(|id| name_value(doc, *id, "AS").unwrap_or_default())
        .collect()
}

#[test]
fn test_text_by_descriptive_name() {
    let request = FillRequest::new().with("institution_ein_text", "First National Bank of Testing");
    let (mut doc, report) = fill(&request);

    assert_eq!(text_value(&mut doc, 11).as_deref(), Some("First National Bank of Testing"));
    assert_eq!(report.filled_fields, vec!["institution_ein_text".to_string()]);
    assert!(report.unused_request_keys.is_empty());
}

#[test]
fn test_text_truncated_to_max_length() {
    let request = FillRequest::new().with("institution_name_text", "First National Bank of Testing");
    let (mut doc, _) = fill(&request);

    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("First Nati"));
}

#[test]
fn test_text_accepts_numbers_and_unicode() {
    let request = FillRequest::from_json_str(r#"{"institution_name_text": 1234567, "institution_ein_text": "Zoë 中文"}"#)
        .unwrap();
    let (mut doc, report) = fill(&request);

    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("1234567"));
    assert_eq!(text_value(&mut doc, 11).as_deref(), Some("Zo\u{eb} \u{4e2d}\u{6587}"));
    assert!(report.type_mismatches.is_empty());
}

#[test]
fn test_text_rejects_boolean() {
    let request = FillRequest::new()
        .with("institution_ein_text", true)
        .with("institution_name_text", "Bank");
    let (mut doc, report) = fill(&request);

    assert_eq!(report.type_mismatches, vec!["institution_ein_text".to_string()]);
    assert_eq!(text_value(&mut doc, 11).as_deref(), Some("old"));
    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("Bank"));
}

#[test]
fn test_choice_filled_as_text() {
    let request = FillRequest::new().with("institution_state_choice", "TX");
    let (mut doc, report) = fill(&request);
    assert_eq!(text_value(&mut doc, 12).as_deref(), Some("TX"));
    assert!(report.warnings.iter().all(|w| !matches!(w, FillWarning::OptionNotFound { .. })));

    // Values outside /Opt are still written; editable combo boxes take them
    let request = FillRequest::new().with("institution_state_choice", "ZZ");
    let (mut doc, _) = fill(&request);
    assert_eq!(text_value(&mut doc, 12).as_deref(), Some("ZZ"));
}

#[test]
fn test_checkbox_checked_and_unchecked() {
    let request = FillRequest::new().with("activity_bsa_structuring_checkbox", true);
    let (mut doc, report) = fill(&request);
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "V").as_deref(), Some("Yes"));
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "AS").as_deref(), Some("Yes"));
    assert!(!report.warnings.iter().any(|w| matches!(w, FillWarning::LacksAppearance { .. })));

    let request = FillRequest::new().with("activity_bsa_structuring_checkbox", false);
    let (mut doc, _) = fill(&request);
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "V").as_deref(), Some("Off"));
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "AS").as_deref(), Some("Off"));
}

#[test]
fn test_checkbox_without_appearance_is_warned() {
    let request = FillRequest::new().with("activity_bribery_checkbox", true);
    let (mut doc, report) = fill(&request);

    assert_eq!(name_value(&mut doc, ids::ITEM35B, "V").as_deref(), Some("Yes"));
    assert_eq!(name_value(&mut doc, ids::ITEM35B, "AS"), None);
    assert!(report.warnings.contains(&FillWarning::LacksAppearance {
        field: "activity_bribery_checkbox".to_string()
    }));
    assert_eq!(report.filled_fields, vec!["activity_bribery_checkbox".to_string()]);
}

#[test]
fn test_checkbox_string_value_is_type_mismatch() {
    let request = FillRequest::new()
        .with("activity_bsa_structuring_checkbox", "true")
        .with("institution_name_text", "Bank");
    let (mut doc, report) = fill(&request);

    assert_eq!(report.type_mismatches, vec!["activity_bsa_structuring_checkbox".to_string()]);
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "V").as_deref(), Some("Off"));
    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("Bank"));
    assert_eq!(report.filled_fields, vec!["institution_name_text".to_string()]);
}

#[test]
fn test_group_option_booleans_select_one() {
    let request = FillRequest::new()
        .with("regulator_frb_checkbox", false)
        .with("regulator_fdic_checkbox", true)
        .with("regulator_ocb_typo", false);
    let (mut doc, report) = fill(&request);

    assert_eq!(regulator_states(&mut doc), vec!["Off", "FDIC", "Off", "Off", "Off"]);
    assert_eq!(name_value(&mut doc, ids::ITEM5, "V").as_deref(), Some("FDIC"));
    assert_eq!(report.filled_fields, vec!["regulator_group".to_string()]);
    assert_eq!(report.unused_request_keys, vec!["regulator_ocb_typo".to_string()]);
}

#[test]
fn test_group_with_titled_options() {
    let mut fixture = FormFixture::sar_like();
    fixture.with_titled_options();
    let request = FillRequest::new().with("regulator_fdic_checkbox", true);
    let (mut doc, report) = fill_with(fixture.to_table_pdf(), &request, &FillConfig::default());

    assert_eq!(regulator_states(&mut doc), vec!["Off", "FDIC", "Off", "Off", "Off"]);
    assert_eq!(name_value(&mut doc, ids::ITEM5, "V").as_deref(), Some("FDIC"));
    assert_eq!(report.filled_fields, vec!["regulator_group".to_string()]);
    assert!(report.unmapped_native_fields.iter().all(|name| !name.starts_with("item5")));
}

#[test]
fn test_fill_after_rename() {
    let mapping = fixture_mapping();
    let mut template = FormDocument::from_bytes(table_pdf()).unwrap();
    mapping.rename(&mut template).unwrap();
    let renamed = IncrementalWriter::new().write(&template).unwrap();

    let request = FillRequest::new()
        .with("regulator_fdic_checkbox", true)
        .with("institution_name_text", "Bank");
    let (mut doc, report) = fill_with(renamed, &request, &FillConfig::default());

    assert_eq!(
        report.filled_fields,
        vec!["institution_name_text".to_string(), "regulator_group".to_string()]
    );
    assert!(report.unused_request_keys.is_empty());
    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("Bank"));
    assert_eq!(regulator_states(&mut doc), vec!["Off", "FDIC", "Off", "Off", "Off"]);
    assert_eq!(name_value(&mut doc, ids::ITEM5, "V").as_deref(), Some("FDIC"));
    assert_eq!(
        dict(&mut doc, ids::ITEM5).get("T").and_then(Object::as_string),
        Some(&b"regulator_group"[..])
    );
}

#[test]
fn test_fill_nested_field_after_rename() {
    let mut fixture = FormFixture::sar_like();
    fixture.dict(7, "<< /T (form1) /Kids [ 11 0 R ] >>");
    fixture.dict(
        11,
        "<< /Type /Annot /Subtype /Widget /Parent 7 0 R /P 4 0 R /Rect [ 20 680 220 696 ] /FT /Tx /T (item3) >>",
    );
    let mapping = NameMapping::builder("SAR test template", "nested")
        .entry("item2", "institution_name_text")
        .entry("form1.item3", "institution_ein_text")
        .build()
        .unwrap();

    let mut template = FormDocument::from_bytes(fixture.to_table_pdf()).unwrap();
    let renamed = mapping.rename(&mut template).unwrap();
    assert_eq!(renamed.renamed.len(), 2);
    let bytes = IncrementalWriter::new().write(&template).unwrap();

    let mut doc = FormDocument::from_bytes(bytes).unwrap();
    let report = Filler::new(&mapping, &FillConfig::default())
        .fill(&mut doc, &FillRequest::new().with("institution_ein_text", "123"))
        .unwrap();

    assert_eq!(report.filled_fields, vec!["institution_ein_text".to_string()]);
    assert!(report.unused_request_keys.is_empty());
    assert!(!report.unmapped_native_fields.iter().any(|name| name.starts_with("form1")));
    assert_eq!(text_value(&mut doc, 11).as_deref(), Some("123"));

    // A second rename finds the field already descriptive
    let again = mapping.rename(&mut doc).unwrap();
    assert!(again.renamed.is_empty());
    assert!(again.already_descriptive.contains(&"form1.institution_ein_text".to_string()));
}

#[test]
fn test_group_all_false_clears() {
    let request = FillRequest::new()
        .with("regulator_frb_checkbox", false)
        .with("regulator_fdic_checkbox", false);
    let (mut doc, _) = fill(&request);

    assert!(regulator_states(&mut doc).iter().all(|s| s == "Off"));
    assert_eq!(name_value(&mut doc, ids::ITEM5, "V").as_deref(), Some("Off"));
}

#[test]
fn test_group_conflicting_selection_keeps_first() {
    let request = FillRequest::new()
        .with("regulator_occ_checkbox", true)
        .with("regulator_frb_checkbox", true);
    let (mut doc, report) = fill(&request);

    // Options are visited in /Kids order, so frb (a) comes before occ (d)
    assert_eq!(regulator_states(&mut doc), vec!["FRB", "Off", "Off", "Off", "Off"]);
    assert!(report.warnings.contains(&FillWarning::ConflictingSelection {
        field: "regulator_group".to_string(),
        selected: "regulator_frb_checkbox".to_string(),
        ignored: vec!["regulator_occ_checkbox".to_string()],
    }));
}

#[test]
fn test_group_value_by_option_name_suffix_or_state() {
    for (value, expected) in [
        ("regulator_ots_checkbox", 4),
        ("item5c", 2),
        ("b", 1),
        ("OCC", 3),
    ] {
        let request = FillRequest::new().with("regulator_group", value);
        let (mut doc, report) = fill(&request);

        let states = regulator_states(&mut doc);
        for (index, state) in states.iter().enumerate() {
            if index == expected {
                assert_ne!(state, "Off", "{} should select option {}", value, index);
            } else {
                assert_eq!(state, "Off", "{} should clear option {}", value, index);
            }
        }
        assert!(report.warnings.iter().all(|w| !matches!(w, FillWarning::OptionNotFound { .. })));
    }
}

#[test]
fn test_group_unknown_value_clears_and_warns() {
    let request = FillRequest::new().with("regulator_group", "SEC");
    let (mut doc, report) = fill(&request);

    assert!(regulator_states(&mut doc).iter().all(|s| s == "Off"));
    assert!(report.warnings.contains(&FillWarning::OptionNotFound {
        field: "regulator_group".to_string(),
        value: "SEC".to_string(),
    }));
}

#[test]
fn test_group_key_wins_over_option_keys() {
    let request = FillRequest::new()
        .with("regulator_group", "FRB")
        .with("regulator_ots_checkbox", true);
    let (mut doc, report) = fill(&request);

    assert_eq!(regulator_states(&mut doc)[0], "FRB");
    assert_eq!(regulator_states(&mut doc)[4], "Off");
    assert!(report.warnings.contains(&FillWarning::AmbiguousGroupRequest {
        field: "regulator_group".to_string(),
        ignored: vec!["regulator_ots_checkbox".to_string()],
    }));
    // Both keys addressed a field
    assert!(report.unused_request_keys.is_empty());
}

#[test]
fn test_group_stays_exclusive_across_fills() {
    let config = FillConfig::default();
    let (first, _) = fill_with(
        table_pdf(),
        &FillRequest::new().with("regulator_fdic_checkbox", true),
        &config,
    );
    let bytes = IncrementalWriter::new().write(&first).unwrap();
    let (mut second, _) = fill_with(bytes, &FillRequest::new().with("regulator_ncua_checkbox", true), &config);

    assert_eq!(regulator_states(&mut second), vec!["Off", "Off", "NCUA", "Off", "Off"]);
}

#[test]
fn test_unused_keys_do_not_stop_the_fill() {
    let request = FillRequest::new()
        .with("suspect_middle_name", "X")
        .with("institution_name_text", "Bank")
        .with("regulator_fdic_checkbox", true);
    let (mut doc, report) = fill(&request);

    assert_eq!(report.unused_request_keys, vec!["suspect_middle_name".to_string()]);
    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("Bank"));
    assert_eq!(regulator_states(&mut doc)[1], "FDIC");
    assert!(!report.is_clean());
}

#[test]
fn test_unmapped_fields_reported_and_reachable_by_raw_name() {
    let (_, report) = fill(&FillRequest::new());
    assert_eq!(report.unmapped_native_fields, vec!["item99".to_string()]);
    assert!(report.filled_fields.is_empty());

    let request = FillRequest::new().with("item99", "raw").with("item3", "canonical");
    let (mut doc, report) = fill(&request);
    assert_eq!(text_value(&mut doc, 33).as_deref(), Some("raw"));
    assert_eq!(text_value(&mut doc, 11).as_deref(), Some("canonical"));
    assert_eq!(
        report.filled_fields,
        vec!["institution_ein_text".to_string(), "item99".to_string()]
    );
}

#[test]
fn test_discovery_problems_surface_as_warnings() {
    let (_, report) = fill(&FillRequest::new());

    assert!(report.warnings.iter().any(|w| matches!(
        w,
        FillWarning::SkippedWidget { widget, page_index: 0, .. } if widget == &format!("{} 0 R", ids::BROKEN)
    )));
}

#[test]
fn test_need_appearances_flag() {
    let (mut doc, _) = fill(&FillRequest::new().with("institution_name_text", "Bank"));
    let (_, form) = doc.acroform().unwrap().unwrap();
    assert_eq!(form.get("NeedAppearances").and_then(Object::as_bool), Some(true));
    // The rest of the form dictionary is untouched
    assert!(form.contains_key("DA"));
    assert_eq!(form.get("Fields").and_then(Object::as_array).map(Vec::len), Some(10));

    let config = FillConfig::default().with_need_appearances(false);
    let (mut doc, _) = fill_with(table_pdf(), &FillRequest::new().with("institution_name_text", "Bank"), &config);
    let (_, form) = doc.acroform().unwrap().unwrap();
    assert!(!form.contains_key("NeedAppearances"));
}

#[test]
fn test_custom_states_without_appearance_warn() {
    let config = FillConfig::default().with_states("On", "Off");
    let request = FillRequest::new().with("activity_bsa_structuring_checkbox", true);
    let (mut doc, report) = fill_with(table_pdf(), &request, &config);

    assert_eq!(name_value(&mut doc, ids::ITEM35A, "V").as_deref(), Some("On"));
    assert!(report.warnings.contains(&FillWarning::LacksAppearance {
        field: "activity_bsa_structuring_checkbox".to_string()
    }));
}

#[test]
fn test_fill_object_stream_layout() {
    let request = FillRequest::new()
        .with("institution_name_text", "Bank")
        .with("regulator_ots_checkbox", true)
        .with("activity_bsa_structuring_checkbox", true);
    let (mut doc, report) = fill_with(objstm_pdf(), &request, &FillConfig::default());

    assert_eq!(report.filled_fields.len(), 3);
    assert_eq!(text_value(&mut doc, ids::ITEM2).as_deref(), Some("Bank"));
    assert_eq!(regulator_states(&mut doc)[4], "OTS");
    assert_eq!(name_value(&mut doc, ids::ITEM35A, "AS").as_deref(), Some("Yes"));
}

#[test]
fn test_fill_without_acroform_fails() {
    let mapping = fixture_mapping();
    let config = FillConfig::default();
    let mut doc = FormDocument::from_bytes(FormFixture::without_acroform().to_table_pdf()).unwrap();

    let result = Filler::new(&mapping, &config).fill(&mut doc, &FillRequest::new());
    assert!(matches!(result, Err(Error::NotAForm)));
    assert!(!doc.is_modified());
}

#[test]
fn test_report_serializes() {
    let (_, report) = fill(&FillRequest::new().with("regulator_group", "SEC"));
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["unmapped_native_fields"][0], "item99");
    let kinds: Vec<&str> = json["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"option_not_found"));
    assert!(kinds.contains(&"skipped_widget"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_text_never_exceeds_max_length(value in "\\PC{0,40}") {
        let request = FillRequest::new().with("institution_name_text", value.as_str());
        let (mut doc, _) = fill(&request);

        let written = text_value(&mut doc, ids::ITEM2).unwrap();
        let expected: String = value.chars().take(10).collect();
        prop_assert_eq!(written, expected);
    }
}
