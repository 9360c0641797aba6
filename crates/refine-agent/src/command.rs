use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{AgentError, Artifact, Evaluator, Improver, ImproverInput};

/// Improver backed by an external program.
///
/// The rendered prompt is written to the child's stdin; stdout becomes the
/// artifact content. The child is spawned with `kill_on_drop` so a timeout
/// or cancellation in the adapter reaps it instead of leaving orphans.
pub struct CommandImprover {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandImprover {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            name: program.display().to_string(),
            program,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Improver for CommandImprover {
    fn name(&self) -> &str {
        &self.name
    }

    async fn improve(&self, input: &ImproverInput) -> Result<Artifact, AgentError> {
        let stdout = run_command(&self.program, &self.args, &input.to_prompt()).await?;
        Ok(Artifact::new(stdout))
    }
}

/// Evaluator backed by an external program.
///
/// The artifact content is written to stdin. Stdout is taken as the raw
/// feedback: JSON when it parses, otherwise the text itself.
pub struct CommandEvaluator {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            name: program.display().to_string(),
            program,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, artifact: &Artifact) -> Result<serde_json::Value, AgentError> {
        let stdout = run_command(&self.program, &self.args, &artifact.content).await?;
        Ok(serde_json::from_str(&stdout).unwrap_or(serde_json::Value::String(stdout)))
    }
}

async fn run_command(program: &Path, args: &[String], stdin_data: &str) -> Result<String, AgentError> {
    debug!(
        program = %program.display(),
        ?args,
        stdin_len = stdin_data.len(),
        "Spawning agent process"
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AgentError::Invocation(format!("failed to spawn {}: {}", program.display(), e)))?;

    // Feed stdin while draining output; prompts larger than the pipe
    // buffers deadlock if the write must finish before collection starts
    let stdin = child.stdin.take();
    let write = async {
        if let Some(mut stdin) = stdin {
            stdin.write_all(stdin_data.as_bytes()).await?;
            stdin.shutdown().await?;
            // Dropping stdin closes the pipe so the child sees EOF
        }
        Ok::<_, std::io::Error>(())
    };

    let (write_result, output) = tokio::join!(write, child.wait_with_output());
    let output =
        output.map_err(|e| AgentError::Invocation(format!("failed to wait for agent: {}", e)))?;

    // A child that exits without consuming stdin breaks the pipe; its
    // exit status decides success, not the half-written prompt
    if let Err(e) = write_result {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(AgentError::Invocation(format!(
                "failed to write agent stdin: {}",
                e
            )));
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::Invocation(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}
