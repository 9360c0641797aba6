//! # refine-feedback
//!
//! Feedback data contracts and evaluator output normalization.
//!
//! Evaluator agents return whatever shape they like; [`FeedbackParser`]
//! turns that into a [`StructuredFeedback`] without ever failing, so the
//! iteration loop always has a score to act on.

mod model;
mod parser;

pub use model::{
    clamp_score, FeedbackIssue, IssueCategory, QualityMetrics, Severity, StructuredFeedback,
};
pub use parser::FeedbackParser;
