//! Marker (success criterion) model

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a marker resolves its actual value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// `source` is a step output key; reads `exitcode:<source>`
    ExitCode,
    /// `source` is `<dataKey>:<dotPath>`
    JsonPath,
    /// `source` is `<dataKey>:<pattern>`
    Regex,
    /// `source` is a path relative to the target project root
    FileExists,
}

/// Comparison applied between actual and target value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "==",
            CompareOp::NotEquals => "!=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::LessThan => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

/// A typed success criterion checked every iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub name: String,
    pub kind: MarkerKind,
    pub source: String,
    #[serde(default = "default_operator")]
    pub operator: CompareOp,
    /// Expected value; may look numeric
    #[serde(default)]
    pub target: String,
}

fn default_operator() -> CompareOp {
    CompareOp::Equals
}

impl Marker {
    /// Split a `<dataKey>:<rest>` source at the first colon
    pub fn keyed_source(&self) -> Option<(&str, &str)> {
        self.source.split_once(':')
    }
}

/// Outcome of evaluating one marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerResult {
    pub marker_id: String,
    pub name: String,
    pub passed: bool,
    /// Resolved actual value, or an explanatory placeholder
    pub actual: String,
    pub expected: String,
    pub operator: CompareOp,
}

impl MarkerResult {
    /// One-line rendering used in prompts and terminal output
    pub fn describe(&self) -> String {
        format!(
            "[{}] {}: actual={} expected {} {}",
            if self.passed { "PASS" } else { "FAIL" },
            self.name,
            self.actual,
            self.operator,
            self.expected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_source_splits_at_first_colon() {
        let marker: Marker = serde_yaml::from_str(
            "id: cov\nname: Coverage\nkind: regex\nsource: 'log:Coverage: (\\d+)%'\ntarget: '80'\n",
        )
        .unwrap();

        assert_eq!(marker.operator, CompareOp::Equals);
        assert_eq!(marker.keyed_source(), Some(("log", "Coverage: (\\d+)%")));
    }

    #[test]
    fn test_describe() {
        let result = MarkerResult {
            marker_id: "m".to_string(),
            name: "Build".to_string(),
            passed: false,
            actual: "1".to_string(),
            expected: "0".to_string(),
            operator: CompareOp::Equals,
        };
        assert_eq!(result.describe(), "[FAIL] Build: actual=1 expected == 0");
    }
}
