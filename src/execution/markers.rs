//! Marker evaluation - resolves each marker's actual value and compares it

use crate::core::{exit_code_key, CompareOp, Marker, MarkerKind, MarkerResult, StepData};
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use tracing::debug;

/// Absolute tolerance for numeric equality
const NUMERIC_EPSILON: f64 = 1e-4;

/// Compiled-size ceiling for marker patterns
///
/// Matching is linear in the input once compiled, so bounding the compiled
/// program bounds the match time.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Evaluate every marker in order against the iteration's step data
pub fn evaluate_markers(markers: &[Marker], data: &StepData, target_path: &Path) -> Vec<MarkerResult> {
    markers
        .iter()
        .map(|marker| evaluate_marker(marker, data, target_path))
        .collect()
}

/// Evaluate a single marker
pub fn evaluate_marker(marker: &Marker, data: &StepData, target_path: &Path) -> MarkerResult {
    let (actual, passed) = if marker.target.trim().is_empty() {
        ("<invalid marker: empty target>".to_string(), false)
    } else {
        match resolve_actual(marker, data, target_path) {
            Ok(actual) => {
                let passed = compare(&actual, &marker.target, marker.operator);
                (actual, passed)
            }
            Err(sentinel) => (sentinel, false),
        }
    };

    debug!(marker = %marker.id, %actual, passed, "evaluated marker");
    MarkerResult {
        marker_id: marker.id.clone(),
        name: marker.name.clone(),
        passed,
        actual,
        expected: marker.target.clone(),
        operator: marker.operator,
    }
}

/// Resolve the actual value, or a sentinel explaining why it could not be
fn resolve_actual(marker: &Marker, data: &StepData, target_path: &Path) -> Result<String, String> {
    match marker.kind {
        MarkerKind::ExitCode => {
            if let Some(code) = data.get(&exit_code_key(&marker.source)) {
                return Ok(code.to_string());
            }
            match data.get(&marker.source) {
                Some(raw) => match raw.trim().parse::<i64>() {
                    Ok(code) => Ok(code.to_string()),
                    Err(_) => Ok("0".to_string()),
                },
                None => Err(unresolved(&marker.source)),
            }
        }
        MarkerKind::JsonPath => {
            let (key, path) = marker
                .keyed_source()
                .ok_or_else(|| format!("<invalid source: {}>", marker.source))?;
            let raw = data.get(key).ok_or_else(|| unresolved(key))?;
            let document: Value =
                serde_json::from_str(raw).map_err(|_| format!("<invalid json in {}>", key))?;
            resolve_json_path(&document, path).ok_or_else(|| format!("<not found: {}>", marker.source))
        }
        MarkerKind::Regex => {
            let (key, pattern) = marker
                .keyed_source()
                .ok_or_else(|| format!("<invalid source: {}>", marker.source))?;
            let text = data.get(key).ok_or_else(|| unresolved(key))?;
            match_pattern(pattern, text).map_err(|sentinel| sentinel.unwrap_or_else(|| format!("<no match in {}>", key)))
        }
        MarkerKind::FileExists => Ok(target_path.join(&marker.source).exists().to_string()),
    }
}

fn unresolved(key: &str) -> String {
    format!("<unresolved: {}>", key)
}

/// Capture group 1 if present, else the whole match
///
/// `Err(None)` means no match, `Err(Some(_))` carries a pattern sentinel.
fn match_pattern(pattern: &str, text: &str) -> Result<String, Option<String>> {
    let regex = RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| match e {
            regex::Error::CompiledTooBig(_) => Some("<regex budget exceeded>".to_string()),
            other => Some(format!("<invalid regex: {}>", first_line(&other.to_string()))),
        })?;

    let caps = regex.captures(text).ok_or(None)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .ok_or(None)
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text).trim()
}

/// Resolve a dot path with optional `name[idx]` segments
///
/// Missing properties, bad navigation, out-of-range indexes and null all
/// resolve to `None`.
pub fn resolve_json_path(document: &Value, path: &str) -> Option<String> {
    let mut current = document;

    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (name, index) = split_index(segment)?;
        if !name.is_empty() {
            current = current.as_object()?.get(name)?;
        }
        if let Some(index) = index {
            current = current.as_array()?.get(index)?;
        }
    }

    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        // Raw document text: serde_json keeps it under `arbitrary_precision`
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let index = segment[open + 1..].strip_suffix(']')?.trim().parse().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}

/// Compare actual against expected
///
/// Numeric when both sides parse as finite numbers, otherwise a
/// case-insensitive string comparison.
pub fn compare(actual: &str, expected: &str, op: CompareOp) -> bool {
    if let (Some(a), Some(e)) = (parse_number(actual), parse_number(expected)) {
        let equal = (a - e).abs() < NUMERIC_EPSILON;
        return match op {
            CompareOp::Equals => equal,
            CompareOp::NotEquals => !equal,
            CompareOp::GreaterThan => a > e,
            CompareOp::GreaterOrEqual => a >= e,
            CompareOp::LessThan => a < e,
            CompareOp::LessOrEqual => a <= e,
            CompareOp::Contains => actual.trim().contains(expected.trim()),
        };
    }

    let a = actual.to_lowercase();
    let e = expected.to_lowercase();
    match op {
        CompareOp::Equals => a == e,
        CompareOp::NotEquals => a != e,
        CompareOp::GreaterThan => a.cmp(&e) == Ordering::Greater,
        CompareOp::GreaterOrEqual => a.cmp(&e) != Ordering::Less,
        CompareOp::LessThan => a.cmp(&e) == Ordering::Less,
        CompareOp::LessOrEqual => a.cmp(&e) != Ordering::Greater,
        CompareOp::Contains => a.contains(&e),
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
