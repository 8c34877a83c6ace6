// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless text extraction: turns raw on-screen text into a sensor's
//! published value via a single step or an ordered pipeline.

use regex::Regex;

use crate::domain::sensor::{ExtractionRule, ExtractionStep};
use crate::error::{EngineError, ErrorCode};

/// Run `rule` against `source`, applying each step in order and the
/// `extract_numeric`/`remove_unit` post-processing flags to the result. A
/// step (or a post-processing flag) that can't produce a value collapses
/// the whole extraction to `rule.fallback`, if one is configured.
pub fn extract(rule: &ExtractionRule, source: &str) -> Result<String, EngineError> {
    let mut value: Option<String> = Some(source.to_owned());

    for step in &rule.steps {
        value = match value {
            Some(v) => apply_step(step, &v)?,
            None => None,
        };
    }

    if let Some(v) = &value {
        value = post_process(v, rule.extract_numeric, rule.remove_unit);
    }

    match value.or_else(|| rule.fallback.clone()) {
        Some(v) => Ok(v),
        None => Err(EngineError::new(
            ErrorCode::ExtractionFailed,
            "extraction produced no value and no fallback is configured",
        )),
    }
}

fn apply_step(step: &ExtractionStep, input: &str) -> Result<Option<String>, EngineError> {
    Ok(match step {
        ExtractionStep::Exact => Some(input.trim().to_owned()),
        ExtractionStep::Regex { pattern } => {
            let re = Regex::new(pattern).map_err(|e| {
                EngineError::new(ErrorCode::ExtractionFailed, format!("invalid regex {pattern:?}: {e}"))
            })?;
            re.captures(input).map(|caps| {
                caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().to_owned()).unwrap_or_default()
            })
        }
        ExtractionStep::Numeric => first_number(input),
        ExtractionStep::Before { substring } => {
            input.find(substring.as_str()).map(|idx| input[..idx].to_owned())
        }
        ExtractionStep::After { substring } => input
            .find(substring.as_str())
            .map(|idx| input[idx + substring.len()..].to_owned()),
        ExtractionStep::Between { start, end } => input.find(start.as_str()).and_then(|s_idx| {
            let after_start = s_idx + start.len();
            input[after_start..]
                .find(end.as_str())
                .map(|e_idx| input[after_start..after_start + e_idx].to_owned())
        }),
    })
}

fn post_process(value: &str, extract_numeric: bool, remove_unit: bool) -> Option<String> {
    if extract_numeric {
        return first_number(value);
    }
    if remove_unit {
        return Some(strip_trailing_unit(value));
    }
    Some(value.to_owned())
}

fn number_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    // Pattern is a fixed literal, always valid; the allow is scoped to this
    // one known-infallible compile rather than suppressing the lint crate-wide.
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap())
}

fn leading_number_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"^-?\d+(?:\.\d+)?").unwrap())
}

fn first_number(input: &str) -> Option<String> {
    number_regex().find(input).map(|m| m.as_str().to_owned())
}

/// Keep a leading sign and decimal number, drop everything after it.
fn strip_trailing_unit(input: &str) -> String {
    let trimmed = input.trim();
    match leading_number_regex().find(trimmed) {
        Some(m) => m.as_str().to_owned(),
        None => trimmed.to_owned(),
    }
}

#[cfg(test)]
#[path = "extractor_tests.rs"]
mod tests;
