// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locates the UI element a sensor or action descriptor refers to by
//! cascading through strategies of decreasing confidence, re-resolving a
//! stored reference against the device's current element hierarchy.

use crate::domain::sensor::{Bounds, SensorSource};
use crate::transport::UiElement;

/// Maximum center-to-center drift (in px) the class+bounds strategy tolerates.
const CLASS_BOUNDS_TOLERANCE_PX: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct FindResult {
    pub found: bool,
    pub element: Option<UiElement>,
    pub bounds: Option<Bounds>,
    pub confidence: f64,
    pub method: &'static str,
}

impl FindResult {
    fn not_found() -> Self {
        Self { found: false, element: None, bounds: None, confidence: 0.0, method: "none" }
    }

    fn hit(element: UiElement, confidence: f64, method: &'static str) -> Self {
        let bounds = element.bounds;
        Self { found: true, element: Some(element), bounds: Some(bounds), confidence, method }
    }
}

/// Resolve `source` against the elements currently visible on screen.
pub fn find(source: &SensorSource, elements: &[UiElement]) -> FindResult {
    match source {
        SensorSource::ElementRef { resource_id, text, class, stored_path, stored_bounds } => {
            find_element_ref(resource_id.as_deref(), text.as_deref(), class.as_deref(), stored_path.as_deref(), *stored_bounds, elements)
        }
        SensorSource::BoundsRef { bounds } => find_by_bounds(*bounds, elements).unwrap_or_else(FindResult::not_found),
    }
}

#[allow(clippy::too_many_arguments)]
fn find_element_ref(
    resource_id: Option<&str>,
    text: Option<&str>,
    class: Option<&str>,
    stored_path: Option<&str>,
    stored_bounds: Option<Bounds>,
    elements: &[UiElement],
) -> FindResult {
    if let Some(path) = stored_path {
        if let Some(el) = elements.iter().find(|e| e.path == path) {
            return FindResult::hit(el.clone(), 0.95, "hierarchy_path");
        }
    }

    if let Some(rid) = resource_id {
        let candidates: Vec<&UiElement> =
            elements.iter().filter(|e| e.resource_id.as_deref() == Some(rid)).collect();
        if let Some(el) = pick(candidates, stored_bounds) {
            return FindResult::hit(el.clone(), 1.00, "resource_id");
        }
    }

    if let (Some(t), Some(c)) = (text, class) {
        let candidates: Vec<&UiElement> = elements
            .iter()
            .filter(|e| e.text.as_deref() == Some(t) && e.class.as_deref() == Some(c))
            .collect();
        if let Some(el) = pick(candidates, stored_bounds) {
            return FindResult::hit(el.clone(), 0.90, "text_class");
        }
    }

    if let Some(t) = text {
        let candidates: Vec<&UiElement> = elements.iter().filter(|e| e.text.as_deref() == Some(t)).collect();
        if let Some(el) = pick(candidates, stored_bounds) {
            return FindResult::hit(el.clone(), 0.70, "text");
        }
    }

    if let (Some(c), Some(bounds)) = (class, stored_bounds) {
        let candidate = elements
            .iter()
            .filter(|e| e.class.as_deref() == Some(c))
            .filter(|e| e.bounds.center_distance(&bounds) <= CLASS_BOUNDS_TOLERANCE_PX)
            .min_by(|a, b| {
                a.bounds
                    .center_distance(&bounds)
                    .total_cmp(&b.bounds.center_distance(&bounds))
            });
        if let Some(el) = candidate {
            return FindResult::hit(el.clone(), 0.50, "class_bounds");
        }
    }

    if let Some(bounds) = stored_bounds {
        if let Some(result) = find_by_bounds(bounds, elements) {
            return result;
        }
    }

    FindResult::not_found()
}

fn find_by_bounds(bounds: Bounds, elements: &[UiElement]) -> Option<FindResult> {
    elements
        .iter()
        .min_by(|a, b| a.bounds.center_distance(&bounds).total_cmp(&b.bounds.center_distance(&bounds)))
        .map(|el| FindResult::hit(el.clone(), 0.30, "stored_bounds"))
}

/// Disambiguate multiple same-strategy candidates by distance to
/// `stored_bounds`; with no stored bounds to tie-break on, take the first.
fn pick<'a>(candidates: Vec<&'a UiElement>, stored_bounds: Option<Bounds>) -> Option<&'a UiElement> {
    match (candidates.len(), stored_bounds) {
        (0, _) => None,
        (1, _) => Some(candidates[0]),
        (_, Some(bounds)) => candidates
            .into_iter()
            .min_by(|a, b| a.bounds.center_distance(&bounds).total_cmp(&b.bounds.center_distance(&bounds))),
        (_, None) => Some(candidates[0]),
    }
}

#[cfg(test)]
#[path = "element_finder_tests.rs"]
mod tests;
