use std::io::Write;

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{EventFormat, LoopEvent};

/// Destination for lifecycle events.
///
/// `publish` must be best-effort and non-blocking: a slow or unavailable
/// sink never stalls or fails the control loop, so implementations drop
/// rather than wait.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LoopEvent);
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &LoopEvent) {}
}

/// Writes events to stderr in the configured format
pub struct ConsoleSink {
    format: EventFormat,
}

impl ConsoleSink {
    pub fn new(format: EventFormat) -> Self {
        Self { format }
    }

    fn write_json(&self, event: &LoopEvent) {
        let _ = writeln!(std::io::stderr(), "{}", event.with_timestamp());
    }

    fn write_pretty(&self, event: &LoopEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LoopEvent::LoopStarted {
                task_preview,
                max_iterations,
                quality_threshold,
                ..
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {}",
                    "refine".bold().bright_white(),
                    format!(
                        "(max {} iterations, threshold {:.0})",
                        max_iterations, quality_threshold
                    )
                    .dimmed()
                );
                let _ = writeln!(stderr, "{} {}", "Task:".dimmed(), task_preview.dimmed());
            }
            LoopEvent::IterationStarted { index, .. } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    format!("── Iteration {} ──", index).bright_blue().bold()
                );
            }
            LoopEvent::ImproverCompleted {
                artifact_bytes,
                elapsed_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} improver produced {} bytes ({:.1}s)",
                    "✓".bright_green(),
                    artifact_bytes,
                    elapsed_secs
                );
            }
            LoopEvent::IterationEvaluated {
                score,
                parse_failed,
                issue_count,
                ..
            } => {
                let score_str = format!("{:.1}", score);
                let colored_score = if *score >= 85.0 {
                    score_str.bright_green()
                } else if *score >= 60.0 {
                    score_str.bright_yellow()
                } else {
                    score_str.bright_red()
                };
                let suffix = if *parse_failed {
                    " (feedback unparseable)".dimmed().to_string()
                } else {
                    format!(" ({} issues)", issue_count).dimmed().to_string()
                };
                let _ = writeln!(stderr, "  {} score {}{}", "◆".bright_cyan(), colored_score, suffix);
            }
            LoopEvent::IterationFailed { phase, error, .. } => {
                let _ = writeln!(stderr, "  {} {} failed: {}", "✗".bright_red(), phase, error);
            }
            LoopEvent::ThresholdMet { score, threshold, .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} threshold met ({:.1} >= {:.1})",
                    "★".bright_green(),
                    score,
                    threshold
                );
            }
            LoopEvent::LoopTerminated {
                iterations,
                reason,
                best_score,
                total_secs,
                ..
            } => {
                let best = match best_score {
                    Some(s) => format!("best {:.1}", s),
                    None => "no scored iterations".to_string(),
                };
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} after {} iterations, {} ({:.1}s)",
                    "Done:".bold(),
                    reason,
                    iterations,
                    best,
                    total_secs
                );
            }
        }
    }

    fn write_compact(&self, event: &LoopEvent) {
        let mut stderr = std::io::stderr();
        let line = match event {
            LoopEvent::LoopStarted { max_iterations, .. } => {
                format!("loop started (max {})", max_iterations)
            }
            LoopEvent::IterationStarted { index, .. } => format!("iteration {}", index),
            LoopEvent::ImproverCompleted { index, elapsed_secs, .. } => {
                format!("iteration {} improver done ({:.1}s)", index, elapsed_secs)
            }
            LoopEvent::IterationEvaluated { index, score, .. } => {
                format!("iteration {} scored {:.1}", index, score)
            }
            LoopEvent::IterationFailed { index, phase, .. } => {
                format!("iteration {} {} failed", index, phase)
            }
            LoopEvent::ThresholdMet { index, score, .. } => {
                format!("threshold met at iteration {} ({:.1})", index, score)
            }
            LoopEvent::LoopTerminated { iterations, reason, .. } => {
                format!("terminated: {} ({} iterations)", reason, iterations)
            }
        };
        let _ = writeln!(stderr, "{}", line);
    }
}

impl EventSink for ConsoleSink {
    fn publish(&self, event: &LoopEvent) {
        match self.format {
            EventFormat::Json => self.write_json(event),
            EventFormat::Pretty => self.write_pretty(event),
            EventFormat::Compact => self.write_compact(event),
        }
    }
}

/// Forwards events into a bounded channel for an external consumer
/// (SSE bridge, test harness). Publishing never blocks: when the consumer
/// lags and the channel fills, events are dropped.
pub struct ChannelSink {
    tx: mpsc::Sender<LoopEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LoopEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &LoopEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            trace!(error = %e, "Dropping loop event, channel unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(index: u32) -> LoopEvent {
        LoopEvent::IterationStarted {
            run_id: Uuid::nil(),
            index,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.publish(&sample(1));
        sink.publish(&sample(2));
        assert!(matches!(
            rx.recv().await,
            Some(LoopEvent::IterationStarted { index: 1, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(LoopEvent::IterationStarted { index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.publish(&sample(1));
        sink.publish(&sample(2)); // dropped, consumer is slow
        assert!(matches!(
            rx.recv().await,
            Some(LoopEvent::IterationStarted { index: 1, .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        // Must not panic or block
        sink.publish(&sample(1));
    }
}
