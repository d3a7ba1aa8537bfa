//! Cost tracking across agent invocations

use crate::core::UsageTotals;
use serde_json::Value;
use std::sync::Mutex;

/// Usage reported by a single `result` event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub cost_usd: f64,
    pub turns: u64,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl UsageReport {
    /// Read usage fields off a `result` event; absent fields count as zero
    pub fn from_result(value: &Value) -> Self {
        let number = |v: &Value, field: &str| v.get(field).and_then(Value::as_u64).unwrap_or(0);
        let usage = value.get("usage").unwrap_or(&Value::Null);

        Self {
            cost_usd: value
                .get("total_cost_usd")
                .or_else(|| value.get("cost_usd"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            turns: number(value, "num_turns"),
            duration_ms: number(value, "duration_ms"),
            input_tokens: number(usage, "input_tokens"),
            output_tokens: number(usage, "output_tokens"),
            cache_read_tokens: number(usage, "cache_read_input_tokens"),
            cache_creation_tokens: number(usage, "cache_creation_input_tokens"),
        }
    }
}

/// Accumulates usage over a session
#[derive(Debug, Default)]
pub struct CostTracker {
    totals: Mutex<UsageTotals>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one agent invocation and its reported usage
    pub fn record(&self, report: Option<&UsageReport>) {
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.invocations += 1;

        if let Some(report) = report {
            totals.cost_usd += report.cost_usd;
            totals.turns += report.turns;
            totals.agent_duration_ms += report.duration_ms;
            totals.input_tokens += report.input_tokens;
            totals.output_tokens += report.output_tokens;
            totals.cache_read_tokens += report.cache_read_tokens;
            totals.cache_creation_tokens += report.cache_creation_tokens;
        }
    }

    pub fn totals(&self) -> UsageTotals {
        self.totals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset(&self) {
        *self.totals.lock().unwrap_or_else(|e| e.into_inner()) = UsageTotals::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_reads_all_fields() {
        let report = UsageReport::from_result(&json!({
            "type": "result",
            "total_cost_usd": 0.12,
            "num_turns": 3,
            "duration_ms": 4500,
            "usage": {
                "input_tokens": 100,
                "output_tokens": 50,
                "cache_read_input_tokens": 20,
                "cache_creation_input_tokens": 10
            }
        }));

        assert_eq!(report.cost_usd, 0.12);
        assert_eq!(report.turns, 3);
        assert_eq!(report.duration_ms, 4500);
        assert_eq!(report.input_tokens, 100);
        assert_eq!(report.output_tokens, 50);
        assert_eq!(report.cache_read_tokens, 20);
        assert_eq!(report.cache_creation_tokens, 10);
    }

    #[test]
    fn test_legacy_cost_field() {
        let report = UsageReport::from_result(&json!({"type": "result", "cost_usd": 0.5}));
        assert_eq!(report.cost_usd, 0.5);
        assert_eq!(report.turns, 0);
    }

    #[test]
    fn test_tracker_accumulates() {
        let tracker = CostTracker::new();
        let report = UsageReport {
            cost_usd: 0.25,
            turns: 2,
            input_tokens: 10,
            ..Default::default()
        };

        tracker.record(Some(&report));
        tracker.record(Some(&report));
        tracker.record(None);

        let totals = tracker.totals();
        assert_eq!(totals.invocations, 3);
        assert_eq!(totals.turns, 4);
        assert_eq!(totals.input_tokens, 20);
        assert!((totals.cost_usd - 0.5).abs() < 1e-9);

        tracker.reset();
        assert_eq!(tracker.totals().invocations, 0);
    }
}
