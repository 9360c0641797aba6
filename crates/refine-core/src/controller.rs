use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use refine_agent::{
    AgentError, Artifact, EvaluatorAdapter, ImproverAdapter, ImproverInput,
};
use refine_events::{EventSink, LoopEvent, NullSink, Phase};
use refine_feedback::{FeedbackParser, StructuredFeedback};

use crate::config::LoopConfig;
use crate::result::{select_best, IterationOutcome, IterationResult, LoopResult, TerminationReason};
use crate::trend::TrendTracker;

/// Drives the improve -> evaluate -> parse -> decide cycle.
///
/// One controller owns one run. It keeps no state across runs and shares
/// nothing globally, so independent controllers can execute concurrently.
pub struct IterationController {
    config: LoopConfig,
    improver: ImproverAdapter,
    evaluator: EvaluatorAdapter,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    run_id: Uuid,
}

/// Mutable state of a run in flight
struct RunState {
    task: String,
    iterations: Vec<IterationResult>,
    trend: TrendTracker,
    consecutive_failures: u32,
}

impl RunState {
    fn new(task: String) -> Self {
        Self {
            task,
            iterations: Vec::new(),
            trend: TrendTracker::new(),
            consecutive_failures: 0,
        }
    }

    /// Artifact to revise next: the best-scoring one so far, falling back
    /// to the most recently produced one when the best iteration has none
    fn carry_artifact(&self) -> Option<&Artifact> {
        select_best(&self.iterations)
            .and_then(|i| self.iterations[i].artifact.as_ref())
            .or_else(|| {
                self.iterations
                    .iter()
                    .rev()
                    .find_map(|iter| iter.artifact.as_ref())
            })
    }

    fn last_feedback(&self) -> Option<&StructuredFeedback> {
        self.iterations.last().map(|iter| &iter.feedback)
    }

    /// Improver input for the upcoming iteration: the original task at
    /// iteration 1 (or when no artifact was ever produced), otherwise a
    /// revision request with the carried artifact and latest feedback
    fn next_input(&self) -> ImproverInput {
        match (self.carry_artifact(), self.last_feedback()) {
            (Some(artifact), Some(feedback)) => ImproverInput::Revision {
                task: self.task.clone(),
                artifact: artifact.clone(),
                feedback: feedback.clone(),
            },
            _ => ImproverInput::Initial {
                task: self.task.clone(),
            },
        }
    }
}

impl IterationController {
    pub fn new(config: LoopConfig, improver: ImproverAdapter, evaluator: EvaluatorAdapter) -> Self {
        Self {
            config,
            improver,
            evaluator,
            events: Arc::new(NullSink),
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Token that aborts the run from outside. Cancellation propagates
    /// into the in-flight adapter call.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the loop until a termination condition is reached.
    ///
    /// Every path produces a [`LoopResult`]; an invalid config yields an
    /// empty result with `ConfigurationError` before any agent is invoked.
    pub async fn run(&self, task: impl Into<String>) -> LoopResult {
        let task = task.into();
        let started = Instant::now();

        if let Err(e) = self.config.validate() {
            warn!(error = %e, "Rejecting loop run");
            let reason = TerminationReason::ConfigurationError { message: e.0 };
            return self.terminated(Vec::new(), reason, started);
        }

        self.events.publish(&LoopEvent::LoopStarted {
            run_id: self.run_id,
            task_preview: task.chars().take(100).collect(),
            max_iterations: self.config.max_iterations,
            quality_threshold: self.config.quality_threshold,
        });
        info!(
            run_id = %self.run_id,
            max_iterations = self.config.max_iterations,
            threshold = self.config.quality_threshold,
            "Starting improvement loop"
        );

        let mut state = RunState::new(task);
        let mut reason = None;

        for index in 1..=self.config.max_iterations {
            if self.cancel.is_cancelled() {
                info!(run_id = %self.run_id, "Loop cancelled before iteration {}", index);
                reason = Some(TerminationReason::Cancelled);
                break;
            }

            if let Some(r) = self.run_iteration(&mut state, index).await {
                reason = Some(r);
                break;
            }
        }

        let reason = reason.unwrap_or(TerminationReason::MaxIterationsReached);
        self.terminated(state.iterations, reason, started)
    }

    /// Run one improve/evaluate cycle. Returns Some(reason) when the loop
    /// must stop, None to continue with the next iteration.
    async fn run_iteration(
        &self,
        state: &mut RunState,
        index: u32,
    ) -> Option<TerminationReason> {
        self.events.publish(&LoopEvent::IterationStarted {
            run_id: self.run_id,
            index,
        });

        let iter_started = Instant::now();
        let input = state.next_input();

        debug!(run_id = %self.run_id, index, "Running improver");
        let artifact = match self
            .improver
            .invoke(&input, self.config.timeout_per_iteration, &self.cancel)
            .await
        {
            Ok(artifact) => artifact,
            Err(AgentError::Cancelled) => return Some(TerminationReason::Cancelled),
            Err(e) => {
                return self.record_failure(state, index, Phase::Improver, None, e, iter_started)
            }
        };

        self.events.publish(&LoopEvent::ImproverCompleted {
            run_id: self.run_id,
            index,
            artifact_bytes: artifact.content.len(),
            elapsed_secs: iter_started.elapsed().as_secs_f64(),
        });

        debug!(run_id = %self.run_id, index, "Running evaluator");
        let raw = match self
            .evaluator
            .invoke(&artifact, self.config.timeout_per_iteration, &self.cancel)
            .await
        {
            Ok(raw) => raw,
            Err(AgentError::Cancelled) => return Some(TerminationReason::Cancelled),
            Err(e) => {
                // The artifact was already produced; keep it as this
                // iteration's candidate even though it scored nothing
                return self.record_failure(
                    state,
                    index,
                    Phase::Evaluator,
                    Some(artifact),
                    e,
                    iter_started,
                );
            }
        };

        let feedback = FeedbackParser::parse(&raw);
        if feedback.parse_failed {
            warn!(run_id = %self.run_id, index, "Evaluator feedback unparseable, scoring 0");
        }

        self.events.publish(&LoopEvent::IterationEvaluated {
            run_id: self.run_id,
            index,
            score: feedback.score,
            parse_failed: feedback.parse_failed,
            issue_count: feedback.issues.len(),
        });
        info!(
            run_id = %self.run_id,
            index,
            score = feedback.score,
            "Iteration evaluated"
        );

        let score = feedback.score;
        state.trend.record(score);
        if let Some(delta) = state.trend.latest_delta() {
            debug!(run_id = %self.run_id, index, delta, "Score trend updated");
        }
        state.consecutive_failures = 0;
        state.iterations.push(IterationResult {
            index,
            artifact: Some(artifact),
            feedback,
            elapsed: iter_started.elapsed(),
            outcome: IterationOutcome::Success,
            error: None,
        });

        if score >= self.config.quality_threshold {
            self.events.publish(&LoopEvent::ThresholdMet {
                run_id: self.run_id,
                index,
                score,
                threshold: self.config.quality_threshold,
            });
            return Some(TerminationReason::ThresholdMet);
        }

        // Hitting the iteration cap takes precedence over plateau
        // detection, so only check while more iterations remain
        if index < self.config.max_iterations {
            if let Some(plateau) = self.config.plateau {
                if state.trend.is_plateaued(plateau.window, plateau.min_delta) {
                    info!(run_id = %self.run_id, index, "Score trend plateaued");
                    return Some(TerminationReason::Plateaued);
                }
            }
        }

        None
    }

    /// Record a timed-out or failed iteration and decide whether the
    /// repeated-failure cap aborts the run
    fn record_failure(
        &self,
        state: &mut RunState,
        index: u32,
        phase: Phase,
        artifact: Option<Artifact>,
        error: AgentError,
        iter_started: Instant,
    ) -> Option<TerminationReason> {
        let outcome = match error {
            AgentError::Timeout(_) => IterationOutcome::TimedOut,
            _ => IterationOutcome::Failed,
        };

        self.events.publish(&LoopEvent::IterationFailed {
            run_id: self.run_id,
            index,
            phase,
            error: error.to_string(),
        });
        warn!(run_id = %self.run_id, index, %phase, error = %error, "Iteration failed");

        state.iterations.push(IterationResult {
            index,
            artifact,
            // Zero-score feedback; the error text rides along in the
            // summary so the next improver call sees what went wrong
            feedback: StructuredFeedback::unparsed(error.to_string()),
            elapsed: iter_started.elapsed(),
            outcome,
            error: Some(error.to_string()),
        });

        state.consecutive_failures += 1;
        // Exhausting the iteration budget on the final cycle reports
        // MaxIterationsReached; the cap only aborts early
        if index < self.config.max_iterations
            && state.consecutive_failures >= self.config.failure_cap
        {
            warn!(
                run_id = %self.run_id,
                failures = state.consecutive_failures,
                "Consecutive failure cap reached"
            );
            return Some(TerminationReason::RepeatedTimeouts);
        }

        None
    }

    fn terminated(
        &self,
        iterations: Vec<IterationResult>,
        reason: TerminationReason,
        started: Instant,
    ) -> LoopResult {
        let result = LoopResult::new(iterations, reason, started.elapsed());

        self.events.publish(&LoopEvent::LoopTerminated {
            run_id: self.run_id,
            iterations: result.iterations.len() as u32,
            reason: result.termination_reason.to_string(),
            best_score: result.best_score(),
            total_secs: result.total_elapsed.as_secs_f64(),
        });
        info!(
            run_id = %self.run_id,
            reason = %result.termination_reason,
            iterations = result.iterations.len(),
            "Loop terminated"
        );

        result
    }
}
