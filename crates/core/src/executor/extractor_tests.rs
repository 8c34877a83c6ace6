// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn rule(steps: Vec<ExtractionStep>, extract_numeric: bool, remove_unit: bool, fallback: Option<&str>) -> ExtractionRule {
    ExtractionRule { steps, extract_numeric, remove_unit, fallback: fallback.map(str::to_owned) }
}

#[test]
fn numeric_with_remove_unit_strips_percent_sign() {
    let r = rule(vec![ExtractionStep::Numeric], false, true, None);
    assert_eq!(extract(&r, "94%").expect("ok"), "94");
}

#[test]
fn numeric_keeps_sign_and_decimal() {
    let r = rule(vec![ExtractionStep::Numeric], false, false, None);
    assert_eq!(extract(&r, "-12.5 \u{b0}C").expect("ok"), "-12.5");
}

#[test]
fn numeric_falls_back_when_no_digits_present() {
    let r = rule(vec![ExtractionStep::Numeric], false, false, Some("0"));
    assert_eq!(extract(&r, "N/A").expect("ok"), "0");
}

#[test]
fn no_fallback_and_no_value_is_extraction_failed() {
    let r = rule(vec![ExtractionStep::Numeric], false, false, None);
    let err = extract(&r, "N/A").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::ExtractionFailed);
}

#[test]
fn before_and_after_slice_around_substring() {
    let r = rule(vec![ExtractionStep::Before { substring: " of ".to_owned() }], false, false, None);
    assert_eq!(extract(&r, "3 of 10 complete").expect("ok"), "3");

    let r = rule(vec![ExtractionStep::After { substring: " of ".to_owned() }], false, false, None);
    assert_eq!(extract(&r, "3 of 10 complete").expect("ok"), "10 complete");
}

#[test]
fn between_extracts_inner_segment() {
    let r = rule(
        vec![ExtractionStep::Between { start: "[".to_owned(), end: "]".to_owned() }],
        false,
        false,
        None,
    );
    assert_eq!(extract(&r, "Battery[87%]remaining").expect("ok"), "87%");
}

#[test]
fn regex_uses_first_capture_group() {
    let r = rule(
        vec![ExtractionStep::Regex { pattern: r"Temp: (\d+)C".to_owned() }],
        false,
        false,
        None,
    );
    assert_eq!(extract(&r, "Temp: 42C outside").expect("ok"), "42");
}

#[test]
fn invalid_regex_is_extraction_failed() {
    let r = rule(vec![ExtractionStep::Regex { pattern: "(unterminated".to_owned() }], false, false, None);
    let err = extract(&r, "anything").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::ExtractionFailed);
}

#[test]
fn pipeline_collapses_to_fallback_on_null_step() {
    let r = rule(
        vec![
            ExtractionStep::Before { substring: "missing-delimiter".to_owned() },
            ExtractionStep::Numeric,
        ],
        false,
        false,
        Some("unknown"),
    );
    assert_eq!(extract(&r, "plain text").expect("ok"), "unknown");
}

#[test]
fn exact_trims_whitespace() {
    let r = rule(vec![ExtractionStep::Exact], false, false, None);
    assert_eq!(extract(&r, "  idle  ").expect("ok"), "idle");
}
