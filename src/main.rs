// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, TasksCommand};
use lace_config::{AgentOverrideConfig, ProjectConfig, SessionConfig};
use lace_core::Agent;
use lace_delegate::{DelegateRuntime, MockModelProviderFactory};
use lace_store::{SqliteThreadStore, Task, ThreadMetadata, ThreadStore};
use lace_tasks::{CreateTaskRequest, TaskManager};
use lace_threads::ThreadManager;
use lace_tools::{DenyAllPrompter, ListDirTool, ReadFileTool, SessionApprovalBroker, ShellTool, ToolRegistry, WriteTool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_dir = cli
        .project
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let project_config = lace_config::load_project_config(&project_dir, cli.config.as_deref())
        .context("loading project configuration")?;

    match &cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&project_config)?);
            Ok(())
        }
        Commands::Run { prompt, mode } => run_prompt(&cli, project_config, prompt, (*mode).into()).await,
        Commands::Tasks(cmd) => run_tasks_command(&cli, cmd).await,
    }
}

fn db_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(p) = &cli.db {
        return Ok(p.clone());
    }
    Ok(lace_config::lace_dir()?.join("threads.db"))
}

fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn ThreadStore>> {
    let path = db_path(cli)?;
    let store = SqliteThreadStore::open(&path)
        .with_context(|| format!("opening thread store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_tool_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(ShellTool::default());
    registry.register(ReadFileTool);
    registry.register(WriteTool);
    registry.register(ListDirTool);
    Arc::new(registry)
}

/// Wires a fresh session thread, its [`TaskManager`] (with a
/// [`DelegateRuntime`] spawner), and the session's root [`Agent`], mirroring
/// what an interactive frontend would build on session start.
async fn run_prompt(
    cli: &Cli,
    project_config: ProjectConfig,
    prompt: &str,
    mode: lace_config::AgentMode,
) -> anyhow::Result<()> {
    let store = open_store(cli)?;
    let threads = Arc::new(ThreadManager::new(Arc::clone(&store)));

    let session_config = SessionConfig::default();
    let agent_override = AgentOverrideConfig::default();
    let user_instructions = lace_config::read_user_instructions()
        .context("reading $LACE_DIR/instructions.md")?;
    let effective = lace_config::effective_config(&project_config, &session_config, &agent_override)
        .with_user_instructions(user_instructions);

    let thread = threads
        .create_session_thread(ThreadMetadata {
            name: None,
            provider_instance_id: effective.provider_instance_id.clone(),
            model_id: effective.model_id.clone(),
            session_id: None,
            extra: Default::default(),
        })
        .await?;

    let broker = Arc::new(SessionApprovalBroker::new(Box::new(DenyAllPrompter)));
    let model_factory: Arc<dyn lace_delegate::ModelProviderFactory> =
        Arc::new(MockModelProviderFactory);

    let runtime = DelegateRuntime::new(
        Arc::clone(&threads),
        build_tool_registry(),
        Arc::clone(&model_factory),
        project_config,
        session_config,
    );
    let tasks = Arc::new(
        TaskManager::new(Arc::clone(&store), thread.id.clone()).with_spawner(runtime.clone()),
    );
    runtime.bind_task_manager(&tasks);

    let mut tools = ToolRegistry::new();
    tools.register(ShellTool::default());
    tools.register(ReadFileTool);
    tools.register(WriteTool);
    tools.register(ListDirTool);
    tools.register(lace_tasks::TaskTool::new(Arc::clone(&tasks), "cli-user"));
    let tools = Arc::new(tools);

    let model = model_factory
        .build(
            effective.provider_instance_id.as_deref().unwrap_or("mock"),
            effective.model_id.as_deref().unwrap_or("mock"),
        )
        .map_err(anyhow::Error::msg)?;

    let agent = Agent::new(thread.id.clone(), threads, model, tools, broker, effective, mode);
    let reply = agent.submit(prompt.to_string()).await?;
    println!("{reply}");
    Ok(())
}

async fn run_tasks_command(cli: &Cli, cmd: &TasksCommand) -> anyhow::Result<()> {
    let store = open_store(cli)?;
    match cmd {
        TasksCommand::List { thread } => {
            let manager = TaskManager::new(store, thread.clone());
            let tasks = manager
                .list_tasks(lace_tasks::ListFilter::All, false, "cli-user")
                .await?;
            print_tasks(&tasks);
        }
        TasksCommand::Create { thread, title, prompt, assigned_to } => {
            let manager = TaskManager::new(store, thread.clone());
            let task = manager
                .create_task(
                    CreateTaskRequest {
                        title: title.clone(),
                        description: String::new(),
                        prompt: prompt.clone(),
                        assigned_to: assigned_to.clone(),
                        priority: None,
                    },
                    "cli-user",
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    for t in tasks {
        println!("{}\t{:?}\t{}", t.id, t.status, t.title);
    }
}

/// Builds the tracing `EnvFilter`: `LACE_LOG` takes precedence over the
/// conventional `RUST_LOG` (spec.md §0's ambient stack), falling back to
/// a verbosity-derived default when neither is set.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("LACE_LOG")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
