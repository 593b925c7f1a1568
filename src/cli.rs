// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A multi-agent coding assistant built on an event-sourced conversation store.
#[derive(Parser, Debug)]
#[command(name = "lace", version, about)]
pub struct Cli {
    /// Project directory to run in. Defaults to the current directory.
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Explicit project config file, overriding the `lace.yaml` search chain.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the sqlite database backing the thread store. Defaults to
    /// `<lace-dir>/threads.db`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Increase log verbosity (stderr).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new session thread and submit one prompt to its root agent.
    Run {
        /// The prompt text to submit.
        prompt: String,

        /// Run in research/plan/agent mode. Defaults to `agent`.
        #[arg(long, value_enum, default_value = "agent")]
        mode: ModeArg,
    },
    /// Print the merged effective configuration for the current project.
    ShowConfig,
    /// List, create and inspect tasks in a session thread.
    #[command(subcommand)]
    Tasks(TasksCommand),
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// List tasks visible in a session thread.
    List {
        /// Session thread id to list tasks for.
        thread: String,
    },
    /// Create a task in a session thread.
    Create {
        /// Session thread id to create the task in.
        thread: String,
        /// Task title.
        title: String,
        /// Prompt handed to whoever works the task.
        prompt: String,
        /// Assignee, or `new:provider/model` to spawn a delegate agent.
        #[arg(long)]
        assigned_to: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ModeArg {
    Research,
    Plan,
    Agent,
}

impl From<ModeArg> for lace_config::AgentMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Research => lace_config::AgentMode::Research,
            ModeArg::Plan => lace_config::AgentMode::Plan,
            ModeArg::Agent => lace_config::AgentMode::Agent,
        }
    }
}
