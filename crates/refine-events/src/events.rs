use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which half of an iteration an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Improver,
    Evaluator,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Improver => write!(f, "improver"),
            Phase::Evaluator => write!(f, "evaluator"),
        }
    }
}

/// Structured lifecycle events published during a loop run.
///
/// `run_id` correlates events belonging to one run when many loops execute
/// concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    LoopStarted {
        run_id: Uuid,
        task_preview: String,
        max_iterations: u32,
        quality_threshold: f64,
    },
    IterationStarted {
        run_id: Uuid,
        index: u32,
    },
    ImproverCompleted {
        run_id: Uuid,
        index: u32,
        artifact_bytes: usize,
        elapsed_secs: f64,
    },
    IterationEvaluated {
        run_id: Uuid,
        index: u32,
        score: f64,
        parse_failed: bool,
        issue_count: usize,
    },
    IterationFailed {
        run_id: Uuid,
        index: u32,
        phase: Phase,
        error: String,
    },
    ThresholdMet {
        run_id: Uuid,
        index: u32,
        score: f64,
        threshold: f64,
    },
    LoopTerminated {
        run_id: Uuid,
        iterations: u32,
        reason: String,
        best_score: Option<f64>,
        total_secs: f64,
    },
}

impl LoopEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            LoopEvent::LoopStarted { run_id, .. }
            | LoopEvent::IterationStarted { run_id, .. }
            | LoopEvent::ImproverCompleted { run_id, .. }
            | LoopEvent::IterationEvaluated { run_id, .. }
            | LoopEvent::IterationFailed { run_id, .. }
            | LoopEvent::ThresholdMet { run_id, .. }
            | LoopEvent::LoopTerminated { run_id, .. } => *run_id,
        }
    }

    /// Add a timestamp to serialize with the event
    pub fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Console output format for [`crate::ConsoleSink`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines for machine consumption
    Json,
    /// Minimal single-line format
    Compact,
}

impl std::str::FromStr for EventFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(EventFormat::Pretty),
            "json" => Ok(EventFormat::Json),
            "compact" => Ok(EventFormat::Compact),
            _ => Err(format!("Unknown event format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LoopEvent::IterationStarted {
            run_id: Uuid::nil(),
            index: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "iteration_started");
        assert_eq!(json["index"], 2);
    }

    #[test]
    fn test_with_timestamp_adds_field() {
        let event = LoopEvent::IterationStarted {
            run_id: Uuid::nil(),
            index: 1,
        };
        let json = event.with_timestamp();
        assert!(json.get("timestamp").is_some());
    }
}
