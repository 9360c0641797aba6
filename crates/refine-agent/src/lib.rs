//! # refine-agent
//!
//! Capability traits for the two pluggable agents the improvement loop
//! drives ([`Improver`], [`Evaluator`]), adapters that enforce per-call
//! timeout and cancellation, and process-backed implementations for
//! wrapping external CLI tools.

mod adapter;
mod command;
mod traits;

pub use adapter::{EvaluatorAdapter, ImproverAdapter};
pub use command::{CommandEvaluator, CommandImprover};
pub use traits::{AgentError, Artifact, Evaluator, Improver, ImproverInput};
