// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{Event, EventData, EventType, Task, TaskNote, TaskPatch, Thread, ThreadMetadata};

/// Durable, transactional storage for threads, events and tasks (spec.md
/// §4.1). `lace-threads` and `lace-tasks` are policy layers over this
/// trait; nothing above them ever touches SQL directly.
///
/// Writes to a single thread are serialized by the implementation (spec.md
/// §5: "per-thread writes are serialized by a thread-scoped mutex/lock");
/// cross-thread reads are lock-free, monotonically-advancing snapshots.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create a thread. `id` is opaque to the store — id grammar and
    /// delegate-suffix allocation are `lace-threads`'s concern (spec.md §4.2).
    async fn create_thread(
        &self,
        id: &str,
        parent_id: Option<&str>,
        metadata: ThreadMetadata,
    ) -> Result<Thread>;

    async fn get_thread(&self, id: &str) -> Result<Option<Thread>>;

    /// List every thread whose id is `root_id` or begins with `root_id.`,
    /// in no particular order — callers needing delegate discovery (not
    /// event merging) use this instead of walking the store by hand.
    async fn list_descendant_threads(&self, root_id: &str) -> Result<Vec<Thread>>;

    async fn update_metadata(&self, id: &str, metadata: ThreadMetadata) -> Result<()>;

    async fn set_closed(&self, id: &str, closed: bool) -> Result<()>;

    /// Atomically assign the next per-thread `seq` and persist `data`
    /// (spec.md §4.1). Returns the event with its assigned `seq` and
    /// server timestamp.
    async fn append_event(
        &self,
        thread_id: &str,
        event_type: EventType,
        data: EventData,
    ) -> Result<Event>;

    /// In insertion (`seq`) order, optionally starting strictly after
    /// `since_seq`.
    async fn list_events(&self, thread_id: &str, since_seq: Option<u64>) -> Result<Vec<Event>>;

    /// Union of `root_thread_id` and every descendant (prefix match on the
    /// dotted delegate id), sorted by `(timestamp, thread_id, seq)` —
    /// `timestamp` primary, ties broken lexicographically by thread id then
    /// by `seq` (spec.md §4.1, §8).
    async fn list_main_and_delegate_events(&self, root_thread_id: &str) -> Result<Vec<Event>>;

    async fn save_task(&self, task: &Task) -> Result<()>;

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task>;

    async fn load_task(&self, id: &str) -> Result<Option<Task>>;

    async fn load_tasks_by_thread(&self, thread_id: &str) -> Result<Vec<Task>>;

    async fn load_tasks_by_assignee(&self, assignee: &str) -> Result<Vec<Task>>;

    async fn add_note(&self, task_id: &str, note: TaskNote) -> Result<()>;
}
