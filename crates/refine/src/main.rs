use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use refine_agent::{CommandEvaluator, CommandImprover, EvaluatorAdapter, ImproverAdapter};
use refine_core::IterationController;
use refine_events::{ConsoleSink, EventFormat};

mod config;

use config::{AgentCommand, ProjectConfig};

#[derive(Parser, Debug)]
#[command(
    name = "refine",
    about = "Iterative improvement harness: alternate an improver and an evaluator until the quality bar is met",
    version
)]
struct Cli {
    /// Task prompt (or reads from task.md if not provided)
    #[arg(short, long)]
    task: Option<String>,

    /// Path to task file (default: ./task.md)
    #[arg(long, default_value = "task.md")]
    task_file: PathBuf,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long)]
    working_dir: Option<PathBuf>,

    /// Improver command (overrides refine.toml)
    #[arg(long)]
    improver: Option<String>,

    /// Evaluator command (overrides refine.toml)
    #[arg(long)]
    evaluator: Option<String>,

    /// Maximum iterations
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Quality score at which the loop stops (0-100)
    #[arg(short = 'q', long)]
    quality_threshold: Option<f64>,

    /// Per-iteration timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Event output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: EventFormatChoice,

    /// Output the full loop result as JSON on stdout
    #[arg(long)]
    json_output: bool,

    /// Show what would run without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<EventFormatChoice> for EventFormat {
    fn from(choice: EventFormatChoice) -> Self {
        match choice {
            EventFormatChoice::Pretty => EventFormat::Pretty,
            EventFormatChoice::Json => EventFormat::Json,
            EventFormatChoice::Compact => EventFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let format: EventFormat = cli.log_format.into();
    refine_events::init_tracing("warn", format);

    let task = get_task(&cli, &working_dir)?;
    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let mut loop_config = project.loop_config.clone();
    if let Some(max) = cli.max_iterations {
        loop_config.max_iterations = max;
    }
    if let Some(threshold) = cli.quality_threshold {
        loop_config.quality_threshold = threshold;
    }
    if let Some(secs) = cli.timeout_secs {
        loop_config.timeout_per_iteration = Duration::from_secs(secs);
    }

    let improver_cmd = agent_command(cli.improver.as_deref(), project.improver, "improver")?;
    let evaluator_cmd = agent_command(cli.evaluator.as_deref(), project.evaluator, "evaluator")?;

    if cli.dry_run {
        println!("=== Dry Run ===");
        println!("Task: {}", task.lines().next().unwrap_or(""));
        println!("Improver: {} {}", improver_cmd.command, improver_cmd.args.join(" "));
        println!("Evaluator: {} {}", evaluator_cmd.command, evaluator_cmd.args.join(" "));
        println!(
            "Loop: max {} iterations, threshold {}, timeout {:?}",
            loop_config.max_iterations,
            loop_config.quality_threshold,
            loop_config.timeout_per_iteration
        );
        return Ok(());
    }

    let improver = CommandImprover::new(&improver_cmd.command)
        .with_args(improver_cmd.args.clone())
        .with_name(improver_cmd.command.clone());
    let evaluator = CommandEvaluator::new(&evaluator_cmd.command)
        .with_args(evaluator_cmd.args.clone())
        .with_name(evaluator_cmd.command.clone());

    let controller = IterationController::new(
        loop_config,
        ImproverAdapter::new(Arc::new(improver)),
        EvaluatorAdapter::new(Arc::new(evaluator)),
    )
    .with_event_sink(Arc::new(ConsoleSink::new(format)));

    let cancel = controller.cancel_handle();
    ctrlc::set_handler(move || cancel.cancel()).context("Failed to install Ctrl+C handler")?;

    let result = controller.run(task).await;

    if cli.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let Some(artifact) = result.best_artifact() {
        println!("{}", artifact.content);
    }

    std::process::exit(result.exit_code());
}

/// Task from --task, falling back to the task file
fn get_task(cli: &Cli, working_dir: &std::path::Path) -> Result<String> {
    if let Some(ref task) = cli.task {
        return Ok(task.clone());
    }

    let path = if cli.task_file.is_absolute() {
        cli.task_file.clone()
    } else {
        working_dir.join(&cli.task_file)
    };

    if !path.exists() {
        bail!(
            "No task given: pass --task or create {}",
            path.display()
        );
    }

    let task = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if task.trim().is_empty() {
        bail!("Task file {} is empty", path.display());
    }
    Ok(task)
}

/// Resolve an agent command: CLI flag overrides the config file
fn agent_command(
    flag: Option<&str>,
    configured: Option<AgentCommand>,
    role: &str,
) -> Result<AgentCommand> {
    match (flag, configured) {
        (Some(cmd), _) => Ok(AgentCommand::bare(cmd)),
        (None, Some(cmd)) => Ok(cmd),
        (None, None) => bail!(
            "No {} configured: pass --{} or add [{}] to refine.toml",
            role,
            role,
            role
        ),
    }
}
