use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sa_domain::config::OrchestratorConfig;
use sa_orchestrator::{IterationEngine, LaunchRequest, LivenessProbe, TaskLifecycleManager, ToolRegistry};
use sa_providers::ProviderRegistry;
use sa_store::{PubSub, StoreAdapter};

#[derive(Parser)]
#[command(name = "serialagent", version, about = "Multi-agent task orchestrator")]
struct Cli {
    #[arg(long, default_value = "./orchestrator.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a task: create it, resume it, or reactivate it, per the
    /// decision matrix in SPEC_FULL.md §4.7.
    Launch {
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long)]
        model_id: Option<String>,
        #[arg(long = "message")]
        messages: Vec<String>,
        #[arg(long)]
        parent_task_id: Option<String>,
        #[arg(long)]
        enable_recursion: bool,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Enqueue the initial messages without spawning a worker process.
        #[arg(long)]
        no_spawn: bool,
    },
    /// Stop a running task, escalating from SIGTERM to SIGKILL.
    Stop { task_id: String },
    /// Enqueue a user message onto a task's inbox without launching it.
    Enqueue {
        task_id: String,
        #[arg(long = "message")]
        messages: Vec<String>,
    },
    /// Query a task's liveness without mutating anything beyond reconciling
    /// a dead pid (SPEC_FULL.md §4.2).
    Probe { task_id: String },
    /// Run the iteration engine for a single task until its turn ends,
    /// `max_iterations` is exhausted, or it is asked to stop. This is the
    /// entrypoint the lifecycle manager spawns as a child process.
    Worker { task_id: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .json()
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<OrchestratorConfig> {
    match OrchestratorConfig::load(path) {
        Ok(cfg) => Ok(cfg),
        Err(sa_domain::error::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "no config file found, using defaults");
            Ok(OrchestratorConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

struct Context {
    store: Arc<StoreAdapter>,
    pubsub: Arc<PubSub<String>>,
    liveness: Arc<LivenessProbe>,
    lifecycle: Arc<TaskLifecycleManager>,
    config: OrchestratorConfig,
}

fn build_context(config: OrchestratorConfig) -> anyhow::Result<Context> {
    let store = Arc::new(StoreAdapter::new(config.store.root.clone())?);
    let pubsub = Arc::new(PubSub::new(config.store.channel_capacity));
    let liveness = Arc::new(LivenessProbe::new());
    let worker_binary = std::env::current_exe()?;
    let lifecycle = Arc::new(TaskLifecycleManager::new(
        store.clone(),
        pubsub.clone(),
        liveness.clone(),
        worker_binary,
        Duration::from_millis(config.tasks.stop_grace_ms),
    ));
    Ok(Context { store, pubsub, liveness, lifecycle, config })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let ctx = build_context(config)?;

    match cli.command {
        Command::Launch { task_id, model_id, messages, parent_task_id, enable_recursion, max_iterations, no_spawn } => {
            let outcome = ctx
                .lifecycle
                .launch(LaunchRequest {
                    task_id,
                    model_id,
                    enable_recursion: Some(enable_recursion),
                    initial_messages: messages,
                    parent_task_id,
                    max_iterations,
                    start_process: !no_spawn,
                })
                .await?;
            println!("task_id={} branch={} pid={:?}", outcome.task_id, outcome.branch, outcome.pid);
            Ok(())
        }
        Command::Stop { task_id } => {
            ctx.lifecycle.stop(&task_id).await?;
            println!("stopped {task_id}");
            Ok(())
        }
        Command::Enqueue { task_id, messages } => {
            for text in messages {
                sa_orchestrator::ingest::enqueue(&ctx.store, &task_id, sa_domain::queue::InboundEnvelope::user(text, None))?;
            }
            Ok(())
        }
        Command::Probe { task_id } => {
            let result = ctx.liveness.probe(&ctx.store, &ctx.pubsub, &task_id)?;
            println!("alive={} pid={:?} cpu={:?}", result.alive, result.pid, result.cpu_percent);
            Ok(())
        }
        Command::Worker { task_id } => {
            let providers = Arc::new(ProviderRegistry::from_config(&ctx.config.llm)?);
            let tools = Arc::new(ToolRegistry::new());
            let engine = IterationEngine::new(
                ctx.store.clone(),
                ctx.pubsub.clone(),
                providers,
                tools,
                ctx.liveness.clone(),
                ctx.lifecycle.clone(),
                ctx.config.throttle.clone(),
                ctx.config.llm.clone(),
                ctx.config.tasks.clone(),
            );
            engine.run_task(&task_id).await?;
            Ok(())
        }
    }
}
