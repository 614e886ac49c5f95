//! Ensemble - collaborative multi-agent response engine CLI
//!
//! The `ensemble` command drives the collaboration engine from a terminal,
//! standing in for the chat-transport layer: it normalizes a request into
//! the engine's inbound contract and renders the synthesized response.
//!
//! ## Commands
//!
//! - `init`: write a default `ensemble.toml`
//! - `run`: run a collaboration for a request (new or existing project)
//! - `create` / `projects` / `show` / `archive`: project management
//! - `workers`: list available workers
//! - `stats`: contribution-ledger statistics for a project
//!
//! Worker invocations here use the offline canned invoker; provider HTTP
//! clients live outside the engine behind the [`WorkerInvoker`] boundary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use ensemble_core::{
    init_tracing, CannedInvoker, Decomposer, Engine, InboundRequest, PlannerDecomposer,
    RunLockTable, TemplateDecomposer, WorkerInvoker, WorkerRegistry,
};
use ensemble_state::{FsProjectStore, Project, ProjectId, ProjectStore, UserId};

mod config;
use config::{load_config, write_default_config, Config, DecomposerKind};

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collaborative multi-agent response engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file path (default: ./ensemble.toml)
    #[arg(long, global = true, env = "ENSEMBLE_CONFIG")]
    config: Option<PathBuf>,

    /// Acting user id (normally supplied by the chat transport)
    #[arg(long, global = true, default_value_t = 1)]
    user: UserId,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Target path for the config file
        #[arg(default_value = "ensemble.toml")]
        path: PathBuf,
    },

    /// Run a collaboration for a request
    Run {
        /// Existing project to continue; omitted starts a new one
        #[arg(short, long)]
        project: Option<ProjectId>,

        /// The user request
        #[arg(required = true)]
        request: Vec<String>,
    },

    /// Create a project without running anything
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List your projects
    Projects,

    /// Show a project and its tasks
    Show { project: ProjectId },

    /// Archive a project
    Archive { project: ProjectId },

    /// Contribution-ledger statistics for a project
    Stats { project: ProjectId },

    /// List available workers
    Workers,
}

struct App {
    engine: Engine,
    store: Arc<FsProjectStore>,
    registry: Arc<WorkerRegistry>,
    user: UserId,
}

fn build_app(config: &Config, user: UserId) -> Result<App> {
    let store = Arc::new(
        FsProjectStore::new(&config.storage.root).with_context(|| {
            format!(
                "failed to open project store at {}",
                config.storage.root.display()
            )
        })?,
    );
    let policy = config.scheduler.to_policy();

    let registry = Arc::new(WorkerRegistry::new(policy.worker_failure_threshold));
    for worker in config.effective_workers() {
        registry.register(worker.to_spec())?;
    }

    let invoker: Arc<dyn WorkerInvoker> = Arc::new(CannedInvoker::new());
    let decomposer: Arc<dyn Decomposer> = match config.decomposer.kind {
        DecomposerKind::Template => {
            let template = TemplateDecomposer::new(Arc::clone(&registry));
            if config.decomposer.integrate {
                Arc::new(template.with_integration())
            } else {
                Arc::new(template)
            }
        }
        DecomposerKind::Planner => Arc::new(
            PlannerDecomposer::new(Arc::clone(&registry), Arc::clone(&invoker))
                .with_planner_role(config.decomposer.planner_role),
        ),
    };

    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn ProjectStore>,
        Arc::clone(&registry),
        invoker,
        decomposer,
        RunLockTable::new(),
        policy,
        config.synthesis.to_config(),
    );

    Ok(App {
        engine,
        store,
        registry,
        user,
    })
}

fn print_project_line(project: &Project) {
    let stats = project.stats();
    println!(
        "{}  {:<9}  {:<3}/{:<3} tasks  {}",
        project.project_id,
        format!("{:?}", project.status).to_lowercase(),
        stats.done_tasks,
        stats.total_tasks,
        project.name
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    if let Commands::Init { path } = &cli.command {
        write_default_config(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = load_config(cli.config.clone())?;
    let app = build_app(&config, cli.user)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Run { project, request } => {
            let response = app
                .engine
                .handle(InboundRequest {
                    user_id: app.user,
                    project_id: project,
                    message: request.join(" "),
                })
                .await?;

            println!("{}", response.text);
            println!();
            println!("project: {}", response.project_id);
            println!(
                "status:  {:?}",
                response.project_status
            );
            for (role, confidence) in &response.confidences {
                println!("  {role:<11} confidence {confidence:.2}");
            }
        }

        Commands::Create { name, description } => {
            let project = app
                .store
                .create_project(app.user, &name, &description)
                .await?;
            println!("created project {}", project.project_id);
        }

        Commands::Projects => {
            let mut projects = app.engine.projects(app.user).await?;
            projects.sort_by_key(|p| p.created_at);
            if projects.is_empty() {
                println!("no projects");
            }
            for project in &projects {
                print_project_line(project);
            }
        }

        Commands::Show { project } => {
            let project = app.engine.project(app.user, &project).await?;
            print_project_line(&project);
            println!("{}", project.description);
            for task in &project.tasks {
                let confidence = task
                    .confidence
                    .map(|c| format!(" ({c:.2})"))
                    .unwrap_or_default();
                println!(
                    "  {}  {:<8}  [{}]{} {}",
                    task.task_id,
                    format!("{:?}", task.status).to_lowercase(),
                    task.role,
                    confidence,
                    task.description
                );
            }
        }

        Commands::Archive { project } => {
            let project = app.engine.archive(app.user, &project).await?;
            println!("archived {}", project.project_id);
        }

        Commands::Stats { project } => {
            let stats = app.engine.stats(app.user, &project).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Workers => {
            for worker in app.registry.list_available(None) {
                println!(
                    "{:<12} {:<11} {:<16} {:?}",
                    worker.worker_key,
                    worker.role.to_string(),
                    worker.params.model,
                    worker.cost_class
                );
            }
        }
    }

    Ok(())
}
