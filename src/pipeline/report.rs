use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::pipeline::step::StepResult;
use crate::state::PipelineState;

/// One audit-trail entry per executed step (or fan-out branch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub step_name: String,
    pub success: bool,
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    pub(crate) fn from_result(step_name: &str, result: &StepResult) -> Self {
        Self {
            step_name: step_name.to_string(),
            success: result.success,
            execution_time: result.execution_time,
            error: result.error.clone(),
        }
    }
}

/// Terminal artifact of one pipeline run. Returned to the caller once and
/// never mutated afterward. A failed run still carries whatever state had
/// accumulated, so the caller can decide whether partial results are usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub run_id: Uuid,
    pub success: bool,
    pub execution_time: f64,
    pub ledger: Vec<LedgerEntry>,
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineReport {
    pub(crate) fn succeeded(
        pipeline: String,
        run_id: Uuid,
        execution_time: f64,
        ledger: Vec<LedgerEntry>,
        state: PipelineState,
    ) -> Self {
        Self {
            pipeline,
            run_id,
            success: true,
            execution_time,
            ledger,
            state,
            error: None,
        }
    }

    pub(crate) fn failed(
        pipeline: String,
        run_id: Uuid,
        execution_time: f64,
        ledger: Vec<LedgerEntry>,
        partial_state: PipelineState,
        error: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            run_id,
            success: false,
            execution_time,
            ledger,
            state: partial_state,
            error: Some(error.into()),
        }
    }

    /// First failed ledger entry, if any. Tolerated failures show up here
    /// even when the run as a whole succeeded.
    pub fn first_failure(&self) -> Option<&LedgerEntry> {
        self.ledger.iter().find(|entry| !entry.success)
    }
}

/// Arithmetic mean of a mapping of named confidence scores, used by synthesis
/// steps when reporting fan-in quality. Non-numeric values are ignored; an
/// empty mapping yields the neutral 0.5 instead of failing.
pub fn aggregate_quality_scores(scores: &Map<String, Value>) -> f64 {
    let values: Vec<f64> = scores.values().filter_map(Value::as_f64).collect();
    if values.is_empty() {
        return 0.5;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            other => panic!("expected object, got: {other:?}"),
        }
    }

    #[test]
    fn empty_scores_yield_neutral_default() {
        assert_eq!(aggregate_quality_scores(&Map::new()), 0.5);
    }

    #[test]
    fn scores_average_arithmetically() {
        let scores = map(json!({"a": 80, "b": 60}));
        assert_eq!(aggregate_quality_scores(&scores), 70.0);
    }

    #[test]
    fn unit_interval_scores_average_too() {
        let scores = map(json!({"relevance": 0.9, "confidence": 0.7}));
        let mean = aggregate_quality_scores(&scores);
        assert!((mean - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_scores_are_ignored() {
        let scores = map(json!({"a": 40, "note": "n/a"}));
        assert_eq!(aggregate_quality_scores(&scores), 40.0);

        let only_junk = map(json!({"note": "n/a"}));
        assert_eq!(aggregate_quality_scores(&only_junk), 0.5);
    }

    #[test]
    fn first_failure_finds_tolerated_entries() {
        let report = PipelineReport {
            pipeline: "demo".to_string(),
            run_id: Uuid::new_v4(),
            success: true,
            execution_time: 1.0,
            ledger: vec![
                LedgerEntry {
                    step_name: "fetch".to_string(),
                    success: true,
                    execution_time: 0.4,
                    error: None,
                },
                LedgerEntry {
                    step_name: "score".to_string(),
                    success: false,
                    execution_time: 0.1,
                    error: Some("timeout".to_string()),
                },
            ],
            state: PipelineState::new(),
            error: None,
        };

        let failure = report.first_failure().unwrap();
        assert_eq!(failure.step_name, "score");
        assert_eq!(failure.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn report_serializes_without_null_error() {
        let report = PipelineReport::succeeded(
            "demo".to_string(),
            Uuid::new_v4(),
            0.2,
            Vec::new(),
            PipelineState::new(),
        );
        let encoded = serde_json::to_value(&report).unwrap();
        assert_eq!(encoded["success"], json!(true));
        assert!(encoded.get("error").is_none());
    }
}
