// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Delegation: turns a `new:provider/model` assignment string into a
//! running child [`Agent`], linked back to the task that triggered it.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use lace_config::{AgentMode, AgentOverrideConfig, ProjectConfig, SessionConfig};
use lace_core::Agent;
use lace_store::ThreadMetadata;
use lace_tasks::{DelegateSpawner, Task, TaskManager, TaskPatch, TaskStatus};
use lace_threads::ThreadManager;
use lace_tools::{DenyAllPrompter, SessionApprovalBroker, ToolRegistry};

use crate::error::{Error, Result};
use crate::factory::ModelProviderFactory;

fn parse_spec(spec: &str) -> Result<(&str, &str)> {
    let rest = spec
        .strip_prefix("new:")
        .ok_or_else(|| Error::MalformedSpec(spec.to_string()))?;
    rest.split_once('/')
        .filter(|(provider, model)| !provider.is_empty() && !model.is_empty())
        .ok_or_else(|| Error::MalformedSpec(spec.to_string()))
}

/// Owns the plumbing `spawn_delegate` needs: a [`ThreadManager`] to
/// allocate the delegate thread, a [`ToolRegistry`] and
/// [`ModelProviderFactory`] to build the child [`Agent`], and the
/// project/session config layers the delegate inherits (overriding only
/// `providerInstanceId`/`modelId`).
///
/// Implements [`DelegateSpawner`] so a [`TaskManager`] can be wired to it
/// without `lace-tasks` ever depending on this crate. The reverse link —
/// used to write a failure note back onto the triggering task — is a
/// [`Weak`] reference bound after construction via [`bind_task_manager`],
/// since the `TaskManager` that calls `spawn` is the same one this runtime
/// must call back into.
///
/// [`bind_task_manager`]: DelegateRuntime::bind_task_manager
pub struct DelegateRuntime {
    threads: Arc<ThreadManager>,
    tools: Arc<ToolRegistry>,
    model_factory: Arc<dyn ModelProviderFactory>,
    project_config: ProjectConfig,
    session_config: SessionConfig,
    tasks: OnceLock<Weak<TaskManager>>,
}

impl DelegateRuntime {
    pub fn new(
        threads: Arc<ThreadManager>,
        tools: Arc<ToolRegistry>,
        model_factory: Arc<dyn ModelProviderFactory>,
        project_config: ProjectConfig,
        session_config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            threads,
            tools,
            model_factory,
            project_config,
            session_config,
            tasks: OnceLock::new(),
        })
    }

    /// Bind the [`TaskManager`] that owns this runtime as its spawner.
    /// Must be called exactly once, after both are constructed; later
    /// calls are ignored (the first binding wins).
    pub fn bind_task_manager(&self, tasks: &Arc<TaskManager>) {
        let _ = self.tasks.set(Arc::downgrade(tasks));
    }

    /// Runs the delegate's first turn in the background and converts any
    /// failure into a task note + `status=blocked` without propagating to
    /// the caller of `spawn`. Takes only a cloned [`Weak`] handle rather
    /// than `self`, since `DelegateSpawner::spawn` is only ever called
    /// through `&self`, never `Arc<Self>`.
    fn run_in_background(&self, agent: Arc<Agent>, task_id: String, prompt: String) {
        let tasks_weak = self.tasks.get().cloned();
        tokio::spawn(async move {
            info!(thread_id = agent.thread_id(), task_id = %task_id, "starting delegate turn");
            if let Err(e) = agent.submit(prompt).await {
                warn!(thread_id = agent.thread_id(), task_id = %task_id, error = %e, "delegate turn failed");
                record_failure(tasks_weak, &task_id, e.to_string()).await;
            }
        });
    }
}

async fn record_failure(tasks_weak: Option<Weak<TaskManager>>, task_id: &str, message: String) {
    let Some(tasks) = tasks_weak.and_then(|w| w.upgrade()) else {
        warn!(task_id, "delegate failed but no task manager is bound to record it");
        return;
    };
    if let Err(e) = tasks.add_note(task_id, format!("delegate failed: {message}"), "lace-delegate").await {
        warn!(task_id, error = %e, "failed to record delegate failure note");
    }
    let patch = TaskPatch { status: Some(TaskStatus::Blocked), ..Default::default() };
    if let Err(e) = tasks.update_task(task_id, patch, "lace-delegate").await {
        warn!(task_id, error = %e, "failed to flip task to blocked after delegate failure");
    }
}

#[async_trait]
impl DelegateSpawner for DelegateRuntime {
    /// Allocates the delegate thread, constructs the child agent with the
    /// overridden provider/model, and starts its first turn in the
    /// background. Returns the new thread id so the caller (`TaskManager`)
    /// can rewrite `assignedTo` and flip status itself.
    async fn spawn(&self, spec: &str, task: &Task) -> std::result::Result<String, String> {
        self.spawn_inner(spec, task).await.map_err(|e| e.to_string())
    }
}

impl DelegateRuntime {
    async fn spawn_inner(&self, spec: &str, task: &Task) -> Result<String> {
        let (provider, model) = parse_spec(spec)?;

        let parent = self.threads.get_thread(&task.thread_id).await?;
        let session_id = parent
            .and_then(|t| t.metadata.session_id)
            .or_else(|| Some(task.thread_id.clone()));

        let metadata = ThreadMetadata {
            name: Some(task.title.clone()),
            provider_instance_id: Some(provider.to_string()),
            model_id: Some(model.to_string()),
            session_id,
            extra: Default::default(),
        };
        let delegate_thread = self.threads.create_delegate_thread(&task.thread_id, metadata).await?;

        let agent_override = AgentOverrideConfig {
            provider_instance_id: Some(provider.to_string()),
            model_id: Some(model.to_string()),
            ..Default::default()
        };
        let config = lace_config::effective_config(&self.project_config, &self.session_config, &agent_override);

        let model_provider = self
            .model_factory
            .build(provider, model)
            .map_err(Error::ProviderFactory)?;
        let broker = Arc::new(SessionApprovalBroker::new(Box::new(DenyAllPrompter)));

        let agent = Arc::new(Agent::new(
            delegate_thread.id.clone(),
            Arc::clone(&self.threads),
            model_provider,
            Arc::clone(&self.tools),
            broker,
            config,
            AgentMode::Agent,
        ));

        self.run_in_background(agent, task.id.clone(), task.prompt.clone());

        Ok(delegate_thread.id)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
