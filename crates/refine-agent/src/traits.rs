use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use refine_feedback::StructuredFeedback;

/// Errors that can occur when invoking an agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("agent invocation failed: {0}")]
    Invocation(String),

    #[error("agent call was cancelled")]
    Cancelled,
}

/// An opaque content snapshot produced by the improver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub content: String,
}

impl Artifact {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl From<String> for Artifact {
    fn from(content: String) -> Self {
        Self { content }
    }
}

/// Input handed to the improver each cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImproverInput {
    /// Iteration 1: the original task specification, verbatim
    Initial { task: String },
    /// Iteration N>1: best artifact so far plus the latest feedback
    Revision {
        task: String,
        artifact: Artifact,
        feedback: StructuredFeedback,
    },
}

impl ImproverInput {
    /// Render the input as a single prompt for text-oriented agents
    pub fn to_prompt(&self) -> String {
        match self {
            ImproverInput::Initial { task } => task.clone(),
            ImproverInput::Revision {
                task,
                artifact,
                feedback,
            } => format!(
                "Original task:\n{}\n\nCurrent version:\n{}\n\n{}\nRevise the current version to address the feedback.",
                task,
                artifact.content,
                feedback.to_prompt()
            ),
        }
    }
}

/// Capability that produces or revises an artifact
#[async_trait]
pub trait Improver: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    async fn improve(&self, input: &ImproverInput) -> Result<Artifact, AgentError>;
}

/// Capability that scores and critiques an artifact.
///
/// The raw output is passed untouched to the feedback parser, so
/// implementations may return structured JSON, a loose mapping, or plain
/// prose wrapped in a JSON string.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, artifact: &Artifact) -> Result<serde_json::Value, AgentError>;
}
