use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use hive::catalog::ModelCatalog;
use hive::config::Config;
use hive::core::{Priority, SubTask, TaskType};
use hive::metrics::MetricsStore;
use hive::registry::{CommandWorker, RegistryWorker, WorkerRegistry};
use hive::router::{Budget, CapabilityRequirements, ModelRouter, SelectOptions, TaskSpec};
use hive::swarm::{ExecutionTrace, SwarmScheduler};
use hive::{hlog, Error, Result};

/// Hive - model router and swarm scheduler for AI task graphs
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    HIVE_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.hive/hive.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the model profiles available for routing
    Models {
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run one routing decision and print the selection
    Route {
        /// Task type (trading_decision, market_analysis, search,
        /// summarization, extraction)
        task_type: TaskType,

        /// What to optimize for (quality, latency, cost)
        #[arg(long, default_value = "quality")]
        priority: Priority,

        /// Operator override: pick this model id unconditionally
        #[arg(long)]
        model: Option<String>,

        /// Cap on the candidate list length
        #[arg(long)]
        max_candidates: Option<usize>,

        /// Hard ceiling on p95 latency, milliseconds
        #[arg(long)]
        max_p95_latency_ms: Option<u64>,

        /// Require tool support
        #[arg(long)]
        tools: bool,

        /// Require JSON output support
        #[arg(long)]
        require_json: bool,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Parse a graph file and print the staged execution plan
    Validate {
        /// Path to the graph file (TOML)
        graph_file: PathBuf,
    },

    /// Execute a graph file's tasks with its configured workers
    Run {
        /// Path to the graph file (TOML)
        graph_file: PathBuf,

        /// Wall-clock budget for the whole run, milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// On-disk shape of a graph file.
#[derive(Debug, Deserialize)]
struct GraphFile {
    /// Optional per-file deadline override, milliseconds.
    deadline_ms: Option<u64>,
    /// Worker definitions keyed by id.
    #[serde(default)]
    workers: HashMap<String, WorkerEntry>,
    /// The task graph.
    #[serde(default)]
    tasks: Vec<SubTask>,
}

#[derive(Debug, Deserialize)]
struct WorkerEntry {
    /// Whitespace-split command line ("sh -c ...").
    command: Option<String>,
    /// Alternative explicit form.
    program: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    hive::log::init_with_debug(cli.debug);
    hlog!("Hive starting");

    let config = Config::load()?;

    match cli.command {
        Command::Models { json } => run_models(&config, json),
        Command::Route {
            task_type,
            priority,
            model,
            max_candidates,
            max_p95_latency_ms,
            tools,
            require_json,
            json,
        } => run_route(
            &config,
            task_type,
            priority,
            model,
            max_candidates,
            max_p95_latency_ms,
            tools,
            require_json,
            json,
        ),
        Command::Validate { graph_file } => run_validate(&graph_file),
        Command::Run {
            graph_file,
            deadline_ms,
            json,
        } => run_swarm(&config, &graph_file, deadline_ms, json),
    }
}

/// Build the catalog per config: models file if set, built-in otherwise,
/// allow-list applied last.
fn load_catalog(config: &Config) -> Result<ModelCatalog> {
    let catalog = match &config.models_file {
        Some(path) => ModelCatalog::from_file(Path::new(path))?,
        None => ModelCatalog::builtin(),
    };
    Ok(match &config.model_allowlist {
        Some(allowlist) => catalog.with_allowlist(allowlist),
        None => catalog,
    })
}

fn run_models(config: &Config, json: bool) -> Result<()> {
    let catalog = load_catalog(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.profiles())?);
        return Ok(());
    }

    println!("Available models ({}):", catalog.len());
    for profile in catalog.profiles() {
        let enabled = if profile.enabled_by_default {
            "enabled"
        } else {
            "disabled"
        };
        println!(
            "  {:<16} {:<10} {:<20} {:<8} p50={}ms p95={}ms ${:.4}/1k",
            profile.id,
            profile.provider,
            profile.model,
            enabled,
            profile.latency_p50_ms,
            profile.latency_p95_ms,
            profile.total_cost_per_1k(),
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_route(
    config: &Config,
    task_type: TaskType,
    priority: Priority,
    model: Option<String>,
    max_candidates: Option<usize>,
    max_p95_latency_ms: Option<u64>,
    tools: bool,
    require_json: bool,
    json: bool,
) -> Result<()> {
    let catalog = Arc::new(load_catalog(config)?);
    let metrics = Arc::new(MetricsStore::new());
    let router = ModelRouter::new(catalog, metrics);

    let mut spec = TaskSpec::new(task_type).with_priority(priority);
    if max_p95_latency_ms.is_some() {
        spec = spec.with_budget(Budget {
            max_p95_latency_ms,
            ..Default::default()
        });
    }
    if tools || require_json {
        spec = spec.with_requirements(CapabilityRequirements {
            tools,
            json: require_json,
            ..Default::default()
        });
    }

    let options = SelectOptions {
        override_model: model,
        max_candidates: Some(max_candidates.unwrap_or(config.effective_max_candidates())),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let selection = rt.block_on(router.select(&spec, &options))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }

    println!("Selection ({}):", selection.reason);
    println!("  Primary:    {}", selection.primary.id);
    for (i, candidate) in selection.candidates.iter().enumerate().skip(1) {
        println!("  Fallback {}: {}", i, candidate.id);
    }
    Ok(())
}

fn load_graph_file(path: &Path) -> Result<GraphFile> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

fn run_validate(graph_file: &Path) -> Result<()> {
    let file = load_graph_file(graph_file)?;
    let scheduler = SwarmScheduler::new();
    let stages = scheduler.plan(file.tasks)?;

    println!("Graph OK: {} stage(s)", stages.len());
    for (i, stage) in stages.iter().enumerate() {
        println!("  Stage {}: {}", i + 1, stage.join(", "));
    }
    Ok(())
}

fn build_registry(workers: &HashMap<String, WorkerEntry>) -> Result<WorkerRegistry> {
    let mut registry = WorkerRegistry::new();
    for (id, entry) in workers {
        let worker = match (&entry.command, &entry.program) {
            (Some(command), _) => CommandWorker::from_command_line(command)?,
            (None, Some(program)) => CommandWorker::new(program, entry.args.clone())?,
            (None, None) => {
                return Err(Error::Validation(format!(
                    "worker '{}' needs a command or program",
                    id
                )))
            }
        };
        registry.register(id, Arc::new(worker));
    }
    Ok(registry)
}

fn run_swarm(
    config: &Config,
    graph_file: &Path,
    deadline_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let file = load_graph_file(graph_file)?;
    let registry = Arc::new(build_registry(&file.workers)?);
    let worker = Arc::new(RegistryWorker::new(registry));

    let deadline = deadline_ms
        .or(file.deadline_ms)
        .map(Duration::from_millis)
        .unwrap_or(config.effective_deadline());

    let scheduler = SwarmScheduler::new();
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(scheduler.run(file.tasks, worker, deadline));

    match result {
        Ok(trace) => {
            print_trace(&trace, json)?;
            Ok(())
        }
        Err(Error::DeadlineExceeded { deadline, partial }) => {
            eprintln!("Deadline of {:?} exceeded; partial trace follows.", deadline);
            print_trace(&partial, json)?;
            Err(Error::DeadlineExceeded { deadline, partial })
        }
        Err(e) => Err(e),
    }
}

fn print_trace(trace: &ExecutionTrace, json: bool) -> Result<()> {
    let metrics = trace.metrics();

    if json {
        let output = serde_json::json!({
            "run_id": trace.run_id.to_string(),
            "trace": trace,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Run {}: {} stage(s), {} task(s)",
        trace.run_id.short(),
        trace.stages.len(),
        metrics.total_tasks
    );
    for stage in &trace.stages {
        println!("  Stage {} ({:?}):", stage.index + 1, stage.duration);
        for result in &stage.results {
            println!(
                "    {:<12} {:<10} {:<24} {:?} steps={}",
                result.task_id,
                result.worker_id,
                format!("{}", result.outcome),
                result.latency,
                result.steps,
            );
        }
    }
    println!();
    println!("  Wall clock:        {:.1}ms", metrics.wall_clock_ms);
    println!("  Critical steps:    {}", metrics.critical_steps);
    println!("  Latency reduction: {:.2}x", metrics.latency_reduction);
    println!("  Tasks/second:      {:.2}", metrics.tasks_per_second);
    if let Some(bottleneck) = &metrics.bottleneck {
        println!(
            "  Bottleneck:        {} ({:?})",
            bottleneck.task_id, bottleneck.latency
        );
    }
    if metrics.serial_collapse {
        println!("  Serial collapse:   too few tasks to benefit from parallelism");
    }
    Ok(())
}
