use serde::{Deserialize, Serialize};
use std::time::Duration;

use refine_agent::Artifact;
use refine_feedback::StructuredFeedback;

/// How a single iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Success,
    TimedOut,
    Failed,
}

impl IterationOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, IterationOutcome::Success)
    }
}

/// Record of one improve/evaluate cycle. Created once by the controller
/// and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based iteration index
    pub index: u32,
    /// Produced artifact; retained even when evaluation failed, absent
    /// when the improver itself failed
    pub artifact: Option<Artifact>,
    pub feedback: StructuredFeedback,
    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
    pub outcome: IterationOutcome,
    /// Error text for timed-out/failed iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IterationResult {
    pub fn score(&self) -> f64 {
        self.feedback.score
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    ThresholdMet,
    MaxIterationsReached,
    RepeatedTimeouts,
    Plateaued,
    Cancelled,
    ConfigurationError { message: String },
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::ThresholdMet => write!(f, "threshold met"),
            TerminationReason::MaxIterationsReached => write!(f, "max iterations reached"),
            TerminationReason::RepeatedTimeouts => write!(f, "repeated timeouts"),
            TerminationReason::Plateaued => write!(f, "score plateaued"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::ConfigurationError { message } => {
                write!(f, "configuration error: {}", message)
            }
        }
    }
}

/// Complete record of a bounded loop execution. Owned by the caller once
/// `run` returns; the controller keeps nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub iterations: Vec<IterationResult>,
    /// Position in `iterations` of the highest-scoring iteration
    /// (earliest wins ties); None only when no iteration ran
    pub best_index: Option<usize>,
    pub termination_reason: TerminationReason,
    #[serde(with = "secs_f64")]
    pub total_elapsed: Duration,
}

impl LoopResult {
    pub(crate) fn new(
        iterations: Vec<IterationResult>,
        termination_reason: TerminationReason,
        total_elapsed: Duration,
    ) -> Self {
        let best_index = select_best(&iterations);
        Self {
            iterations,
            best_index,
            termination_reason,
            total_elapsed,
        }
    }

    /// The iteration with the highest observed score
    pub fn best(&self) -> Option<&IterationResult> {
        self.best_index.and_then(|i| self.iterations.get(i))
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best().map(IterationResult::score)
    }

    /// Best-so-far artifact, never discarded by later failures
    pub fn best_artifact(&self) -> Option<&Artifact> {
        self.best().and_then(|iter| iter.artifact.as_ref())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.termination_reason, TerminationReason::ThresholdMet)
    }

    pub fn exit_code(&self) -> i32 {
        match self.termination_reason {
            TerminationReason::ThresholdMet => 0,
            TerminationReason::MaxIterationsReached | TerminationReason::Plateaued => 1,
            TerminationReason::RepeatedTimeouts
            | TerminationReason::ConfigurationError { .. } => 2,
            TerminationReason::Cancelled => 130,
        }
    }
}

/// Highest score wins; the earliest iteration wins ties so selection is
/// deterministic
pub(crate) fn select_best(iterations: &[IterationResult]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, iter) in iterations.iter().enumerate() {
        match best {
            Some((_, score)) if iter.score() <= score => {}
            _ => best = Some((i, iter.score())),
        }
    }
    best.map(|(i, _)| i)
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iteration(index: u32, score: f64) -> IterationResult {
        IterationResult {
            index,
            artifact: Some(Artifact::new(format!("v{}", index))),
            feedback: StructuredFeedback::with_score(score),
            elapsed: Duration::from_secs(1),
            outcome: IterationOutcome::Success,
            error: None,
        }
    }

    #[test]
    fn test_select_best_highest_score() {
        let iterations = vec![iteration(1, 40.0), iteration(2, 72.0), iteration(3, 55.0)];
        assert_eq!(select_best(&iterations), Some(1));
    }

    #[test]
    fn test_select_best_earliest_wins_ties() {
        let iterations = vec![iteration(1, 72.0), iteration(2, 72.0)];
        assert_eq!(select_best(&iterations), Some(0));
    }

    #[test]
    fn test_select_best_empty() {
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn test_best_artifact_survives_later_failure() {
        let mut iterations = vec![iteration(1, 90.0)];
        iterations.push(IterationResult {
            index: 2,
            artifact: None,
            feedback: StructuredFeedback::default(),
            elapsed: Duration::from_secs(1),
            outcome: IterationOutcome::TimedOut,
            error: Some("timed out".into()),
        });
        let result = LoopResult::new(
            iterations,
            TerminationReason::RepeatedTimeouts,
            Duration::from_secs(2),
        );
        assert_eq!(result.best_score(), Some(90.0));
        assert_eq!(result.best_artifact().unwrap().content, "v1");
    }

    #[test]
    fn test_exit_codes() {
        let success = LoopResult::new(
            vec![iteration(1, 90.0)],
            TerminationReason::ThresholdMet,
            Duration::from_secs(1),
        );
        assert_eq!(success.exit_code(), 0);
        assert!(success.is_success());

        let cancelled = LoopResult::new(vec![], TerminationReason::Cancelled, Duration::ZERO);
        assert_eq!(cancelled.exit_code(), 130);
        assert!(cancelled.best().is_none());
    }
}
