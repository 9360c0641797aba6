//! # refine-core
//!
//! The iterative improvement loop: an [`IterationController`] alternates a
//! pluggable improver and evaluator for a bounded number of cycles,
//! stopping on a quality threshold, the iteration cap, repeated failure,
//! or cancellation.

mod config;
mod controller;
mod result;
mod trend;

pub use config::{ConfigError, LoopConfig, PlateauConfig};
pub use controller::IterationController;
pub use result::{IterationOutcome, IterationResult, LoopResult, TerminationReason};
pub use trend::TrendTracker;
