// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `TaskManager` — session-scoped task CRUD over [`lace_store::ThreadStore`]
//! (spec.md §4.7). Detects `new:provider/model` assignment strings and
//! hands them to a pluggable [`DelegateSpawner`] rather than spawning
//! agents itself: actually constructing and running a delegate `Agent` is
//! `lace-delegate`'s concern (spec.md §4.9), and `lace-tasks` must not
//! depend back on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use lace_store::{Task, TaskNote, TaskPatch, TaskPriority, TaskStatus, ThreadStore};

use crate::error::{Error, Result};
use crate::events::TaskEvent;
use crate::id;

const NOTIFY_CAPACITY: usize = 256;

/// Invoked when a `createTask`/`updateTask` call assigns a `new:spec`
/// string (spec.md §4.9 step 1-2). Implementations allocate the delegate
/// thread and return its id; starting the delegate's turn and handling its
/// failure is the caller's (`lace-delegate`'s) responsibility, not this
/// trait's.
#[async_trait]
pub trait DelegateSpawner: Send + Sync {
    async fn spawn(&self, spec: &str, task: &Task) -> std::result::Result<String, String>;
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub assigned_to: Option<String>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
}

/// `listTasks`'s filter axis (spec.md §4.7): `mine` (assigned to the
/// caller), `created` (created by the caller), `thread` (scoped to one
/// delegate thread), or `all` (every task in the session).
#[derive(Debug, Clone)]
pub enum ListFilter {
    Mine,
    Created,
    Thread(String),
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub completed: usize,
    pub archived: usize,
}

fn spec_is_spawn_trigger(spec: &str) -> bool {
    spec.starts_with("new:")
}

fn matches_filters(task: &Task, filters: &TaskFilters) -> bool {
    if let Some(status) = filters.status {
        if task.status != status {
            return false;
        }
    }
    if let Some(priority) = filters.priority {
        if task.priority != priority {
            return false;
        }
    }
    if let Some(assignee) = &filters.assigned_to {
        if task.assigned_to.as_deref() != Some(assignee.as_str()) {
            return false;
        }
    }
    if let Some(creator) = &filters.created_by {
        if &task.created_by != creator {
            return false;
        }
    }
    true
}

/// `(priority asc {high<medium<low}, createdAt desc)`, spec.md §4.7's
/// `listTasks` order.
fn list_tasks_cmp(a: &Task, b: &Task) -> std::cmp::Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

pub struct TaskManager {
    store: Arc<dyn ThreadStore>,
    session_thread_id: String,
    spawner: Option<Arc<dyn DelegateSpawner>>,
    notify_tx: broadcast::Sender<TaskEvent>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn ThreadStore>, session_thread_id: impl Into<String>) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { store, session_thread_id: session_thread_id.into(), spawner: None, notify_tx }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn DelegateSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.notify_tx.subscribe()
    }

    async fn trigger_spawn(&self, spec: &str, task: &Task) -> Result<String> {
        let spawner = self
            .spawner
            .as_ref()
            .ok_or_else(|| Error::NoSpawner(spec.to_string()))?;
        spawner.spawn(spec, task).await.map_err(Error::SpawnFailed)
    }

    /// `createTask` (spec.md §4.7): validates `title`/`prompt` non-empty
    /// after trimming, defaults `priority=medium`, and — when `assignedTo`
    /// is a `new:` spec — spawns the delegate before persisting so the
    /// saved row already carries the real thread id and `in_progress`
    /// status.
    pub async fn create_task(&self, req: CreateTaskRequest, actor: &str) -> Result<Task> {
        let title = req.title.trim().to_string();
        let prompt = req.prompt.trim().to_string();
        if title.is_empty() || prompt.is_empty() {
            return Err(Error::Validation("title and prompt must be non-empty".into()));
        }

        let now = Utc::now();
        let mut task = Task {
            id: id::generate_task_id(),
            title,
            description: req.description,
            prompt,
            status: TaskStatus::Pending,
            priority: req.priority.unwrap_or(TaskPriority::Medium),
            assigned_to: req.assigned_to.clone(),
            created_by: actor.to_string(),
            thread_id: self.session_thread_id.clone(),
            created_at: now,
            updated_at: now,
            notes: Vec::new(),
        };

        if let Some(spec) = req.assigned_to.as_deref().filter(|s| spec_is_spawn_trigger(s)) {
            let thread_id = self.trigger_spawn(spec, &task).await?;
            task.assigned_to = Some(thread_id);
            task.status = TaskStatus::InProgress;
        }

        self.store.save_task(&task).await?;
        let _ = self.notify_tx.send(TaskEvent::Created { task_id: task.id.clone() });
        Ok(task)
    }

    /// `getTasks` (spec.md §4.7): session tasks, `createdAt` descending,
    /// with the given filters applied.
    pub async fn get_tasks(&self, filters: TaskFilters) -> Result<Vec<Task>> {
        let mut tasks = self.store.load_tasks_by_thread(&self.session_thread_id).await?;
        tasks.retain(|t| matches_filters(t, &filters));
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Returns `None` if the task exists but belongs to a different
    /// session (spec.md §4.7's "null if the task is not in this session").
    pub async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>> {
        let task = self.store.load_task(id).await?;
        Ok(task.filter(|t| t.thread_id == self.session_thread_id))
    }

    /// `updateTask` (spec.md §4.7). `id`/`threadId`/`createdBy`/`createdAt`
    /// are immutable by construction — [`TaskPatch`] has no fields for
    /// them. A patch that sets `assignedTo` to a `new:` spec triggers
    /// spawning before the patch is applied, exactly as `createTask` does.
    pub async fn update_task(&self, id: &str, mut patch: TaskPatch, actor: &str) -> Result<Task> {
        let _ = actor;
        if let Some(Some(spec)) = patch.assigned_to.as_deref() {
            if spec_is_spawn_trigger(spec) {
                let existing = self
                    .store
                    .load_task(id)
                    .await?
                    .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
                let thread_id = self.trigger_spawn(spec, &existing).await?;
                patch.assigned_to = Some(Some(thread_id));
                patch.status = Some(TaskStatus::InProgress);
            }
        }

        let task = self.store.update_task(id, patch).await?;
        let _ = self.notify_tx.send(TaskEvent::Updated { task_id: task.id.clone() });
        Ok(task)
    }

    /// `addNote` (spec.md §4.7): appends a note and bumps `updatedAt`
    /// (handled by the store so both happen in one transaction).
    pub async fn add_note(&self, task_id: &str, content: impl Into<String>, actor: &str) -> Result<TaskNote> {
        let note = TaskNote {
            id: id::generate_note_id(),
            author: actor.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.store.add_note(task_id, note.clone()).await?;
        let _ = self.notify_tx.send(TaskEvent::NoteAdded {
            task_id: task_id.to_string(),
            note_id: note.id.clone(),
        });
        Ok(note)
    }

    /// `deleteTask` (spec.md §4.7): soft-archive only (§9's Open Question
    /// resolution; no hard-delete path exists).
    pub async fn delete_task(&self, id: &str) -> Result<Task> {
        let patch = TaskPatch { status: Some(TaskStatus::Archived), ..Default::default() };
        let task = self.store.update_task(id, patch).await?;
        let _ = self.notify_tx.send(TaskEvent::Updated { task_id: task.id.clone() });
        Ok(task)
    }

    pub async fn get_task_summary(&self) -> Result<TaskSummary> {
        let tasks = self.store.load_tasks_by_thread(&self.session_thread_id).await?;
        let mut summary = TaskSummary::default();
        for t in &tasks {
            match t.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Blocked => summary.blocked += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Archived => summary.archived += 1,
            }
        }
        Ok(summary)
    }

    /// `listTasks` (spec.md §4.7): filter by actor along `filter`'s axis,
    /// then sort `(priority asc, createdAt desc)`.
    pub async fn list_tasks(
        &self,
        filter: ListFilter,
        include_completed: bool,
        actor: &str,
    ) -> Result<Vec<Task>> {
        let mut tasks = self.store.load_tasks_by_thread(&self.session_thread_id).await?;

        tasks.retain(|t| match &filter {
            ListFilter::Mine => t.assigned_to.as_deref() == Some(actor),
            ListFilter::Created => t.created_by == actor,
            ListFilter::Thread(thread_id) => &t.thread_id == thread_id,
            ListFilter::All => true,
        });

        if !include_completed {
            tasks.retain(|t| t.status != TaskStatus::Completed && t.status != TaskStatus::Archived);
        }

        tasks.sort_by(list_tasks_cmp);
        Ok(tasks)
    }
}

#[allow(dead_code)]
fn _assert_send_sync<T: Send + Sync>() {}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lace_store::SqliteThreadStore;

    fn store() -> Arc<dyn ThreadStore> {
        Arc::new(SqliteThreadStore::open_in_memory().unwrap())
    }

    fn manager() -> TaskManager {
        TaskManager::new(store(), "lace_20250101_abcdef")
    }

    fn req(title: &str, prompt: &str) -> CreateTaskRequest {
        CreateTaskRequest { title: title.into(), prompt: prompt.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn create_task_defaults_status_and_priority() {
        let mgr = manager();
        let task = mgr.create_task(req("Research", "Summarise X"), "user-1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.created_by, "user-1");
        assert_eq!(task.thread_id, "lace_20250101_abcdef");
        assert!(task.id.starts_with("task_"));
    }

    #[tokio::test]
    async fn create_task_rejects_blank_title_or_prompt() {
        let mgr = manager();
        assert!(mgr.create_task(req("  ", "x"), "u").await.is_err());
        assert!(mgr.create_task(req("x", "   "), "u").await.is_err());
    }

    #[tokio::test]
    async fn create_task_without_spawner_errors_on_new_spec() {
        let mgr = manager();
        let mut r = req("Research", "Summarise X");
        r.assigned_to = Some("new:anthropic/claude-3-5-haiku".into());
        let result = mgr.create_task(r, "user-1").await;
        assert!(matches!(result, Err(Error::NoSpawner(_))));
    }

    struct FakeSpawner;

    #[async_trait]
    impl DelegateSpawner for FakeSpawner {
        async fn spawn(&self, _spec: &str, _task: &Task) -> std::result::Result<String, String> {
            Ok("lace_20250101_abcdef.1".to_string())
        }
    }

    // ── spec.md §8 scenario 4 ────────────────────────────────────────────────

    #[tokio::test]
    async fn scenario_4_task_spawning_rewrites_assignment_and_status() {
        let mgr = manager().with_spawner(Arc::new(FakeSpawner));
        let mut r = req("Research", "Summarise X");
        r.assigned_to = Some("new:anthropic/claude-3-5-haiku".into());
        let task = mgr.create_task(r, "user-1").await.unwrap();
        assert_eq!(task.assigned_to.as_deref(), Some("lace_20250101_abcdef.1"));
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn update_task_with_new_spec_also_spawns() {
        let mgr = manager().with_spawner(Arc::new(FakeSpawner));
        let task = mgr.create_task(req("T", "P"), "user-1").await.unwrap();
        let patch = TaskPatch {
            assigned_to: Some(Some("new:anthropic/claude-3-5-haiku".into())),
            ..Default::default()
        };
        let updated = mgr.update_task(&task.id, patch, "user-1").await.unwrap();
        assert_eq!(updated.assigned_to.as_deref(), Some("lace_20250101_abcdef.1"));
        assert_eq!(updated.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn add_note_appends_and_bumps_updated_at() {
        let mgr = manager();
        let task = mgr.create_task(req("T", "P"), "user-1").await.unwrap();
        mgr.add_note(&task.id, "progress update", "user-1").await.unwrap();
        let loaded = mgr.get_task_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.notes.len(), 1);
        assert_eq!(loaded.notes[0].content, "progress update");
        assert!(loaded.updated_at >= task.updated_at);
    }

    #[tokio::test]
    async fn delete_task_soft_archives() {
        let mgr = manager();
        let task = mgr.create_task(req("T", "P"), "user-1").await.unwrap();
        let archived = mgr.delete_task(&task.id).await.unwrap();
        assert_eq!(archived.status, TaskStatus::Archived);
    }

    #[tokio::test]
    async fn get_task_by_id_returns_none_outside_session() {
        let mgr1 = manager();
        let task = mgr1.create_task(req("T", "P"), "user-1").await.unwrap();
        let mgr2 = TaskManager::new(store(), "lace_99999999_zzzzzz");
        // different store instance means no such task exists there at all
        assert!(mgr2.get_task_by_id(&task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_tasks_sorted_created_at_descending() {
        let mgr = manager();
        let t1 = mgr.create_task(req("first", "p1"), "u").await.unwrap();
        let t2 = mgr.create_task(req("second", "p2"), "u").await.unwrap();
        let tasks = mgr.get_tasks(TaskFilters::default()).await.unwrap();
        let pos1 = tasks.iter().position(|t| t.id == t1.id).unwrap();
        let pos2 = tasks.iter().position(|t| t.id == t2.id).unwrap();
        assert!(pos2 <= pos1, "more recently created task should sort first or tie");
    }

    #[tokio::test]
    async fn get_task_summary_counts_by_status() {
        let mgr = manager();
        let t1 = mgr.create_task(req("a", "p"), "u").await.unwrap();
        mgr.create_task(req("b", "p"), "u").await.unwrap();
        mgr.delete_task(&t1.id).await.unwrap();
        let summary = mgr.get_task_summary().await.unwrap();
        assert_eq!(summary.archived, 1);
        assert_eq!(summary.pending, 1);
    }

    #[tokio::test]
    async fn list_tasks_orders_by_priority_then_recency() {
        let mgr = manager();
        let low = mgr
            .create_task(
                CreateTaskRequest { priority: Some(TaskPriority::Low), ..req("low", "p") },
                "u",
            )
            .await
            .unwrap();
        let high = mgr
            .create_task(
                CreateTaskRequest { priority: Some(TaskPriority::High), ..req("high", "p") },
                "u",
            )
            .await
            .unwrap();
        let tasks = mgr.list_tasks(ListFilter::All, true, "u").await.unwrap();
        let pos_high = tasks.iter().position(|t| t.id == high.id).unwrap();
        let pos_low = tasks.iter().position(|t| t.id == low.id).unwrap();
        assert!(pos_high < pos_low, "high priority should sort before low");
    }

    #[tokio::test]
    async fn list_tasks_mine_filters_by_assignee() {
        let mgr = manager();
        let mut r = req("assigned", "p");
        r.assigned_to = Some("alice".into());
        let assigned = mgr.create_task(r, "u").await.unwrap();
        mgr.create_task(req("unassigned", "p"), "u").await.unwrap();
        let mine = mgr.list_tasks(ListFilter::Mine, true, "alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, assigned.id);
    }

    #[tokio::test]
    async fn list_tasks_excludes_completed_by_default() {
        let mgr = manager();
        let task = mgr.create_task(req("done", "p"), "u").await.unwrap();
        mgr.update_task(&task.id, TaskPatch { status: Some(TaskStatus::Completed), ..Default::default() }, "u")
            .await
            .unwrap();
        let visible = mgr.list_tasks(ListFilter::All, false, "u").await.unwrap();
        assert!(visible.is_empty());
        let with_completed = mgr.list_tasks(ListFilter::All, true, "u").await.unwrap();
        assert_eq!(with_completed.len(), 1);
    }

    #[tokio::test]
    async fn task_events_fire_on_create_update_and_note() {
        let mgr = manager();
        let mut rx = mgr.subscribe();
        let task = mgr.create_task(req("T", "P"), "u").await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), TaskEvent::Created { task_id } if task_id == task.id));
        mgr.update_task(&task.id, TaskPatch { title: Some("T2".into()), ..Default::default() }, "u")
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), TaskEvent::Updated { task_id } if task_id == task.id));
        mgr.add_note(&task.id, "note", "u").await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), TaskEvent::NoteAdded { task_id, .. } if task_id == task.id));
    }
}
