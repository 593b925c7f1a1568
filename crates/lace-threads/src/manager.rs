// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `ThreadManager` — the policy layer over [`lace_store::ThreadStore`]:
//! id grammar, delegate-suffix allocation and best-effort live notification
//! of newly appended events (spec.md §4.1-§4.2).
//!
//! Modelled on a broadcast fan-out handle: a `broadcast::Sender` fed by
//! whoever mutates state, subscribed to by however many observers want a
//! live feed, with no guarantee a lagging subscriber sees every event (the
//! store itself remains the source of truth; `listEvents` always recovers
//! anything a subscriber missed).

use std::sync::Arc;

use lace_store::{Event, EventData, EventType, Thread, ThreadMetadata, ThreadStore};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::id;

const NOTIFY_CAPACITY: usize = 1024;

/// Emitted whenever an event is appended or a thread's lifecycle changes.
/// Subscribers that lag past `NOTIFY_CAPACITY` silently miss notifications —
/// `ThreadManager::list_events` remains authoritative.
#[derive(Debug, Clone)]
pub enum ThreadNotification {
    EventAppended { thread_id: String, seq: u64 },
    ThreadClosed { thread_id: String },
}

pub struct ThreadManager {
    store: Arc<dyn ThreadStore>,
    notify_tx: broadcast::Sender<ThreadNotification>,
}

impl ThreadManager {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { store, notify_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThreadNotification> {
        self.notify_tx.subscribe()
    }

    /// Creates a fresh, non-delegate session thread with a newly generated id.
    pub async fn create_session_thread(&self, metadata: ThreadMetadata) -> Result<Thread> {
        let new_id = id::generate_base_id();
        Ok(self.store.create_thread(&new_id, None, metadata).await?)
    }

    /// Allocates and creates the next delegate thread under `parent_id`.
    ///
    /// Delegate ordinals are assigned in creation order with no gaps or
    /// duplicates: if the most recently created direct child has no events
    /// yet, its ordinal is reused (the caller is presumed to be retrying a
    /// delegate that never got off the ground) rather than skipping ahead.
    pub async fn create_delegate_thread(
        &self,
        parent_id: &str,
        metadata: ThreadMetadata,
    ) -> Result<Thread> {
        if self.store.get_thread(parent_id).await?.is_none() {
            return Err(Error::UnknownThread(parent_id.to_string()));
        }

        let children = self.store.list_descendant_threads(parent_id).await?;
        let mut max_child: Option<(u32, String)> = None;
        for child in &children {
            if let Some(n) = id::direct_child_ordinal(parent_id, &child.id) {
                if max_child.as_ref().map(|(m, _)| n > *m).unwrap_or(true) {
                    max_child = Some((n, child.id.clone()));
                }
            }
        }

        if let Some((n, existing_id)) = &max_child {
            let events = self.store.list_events(existing_id, None).await?;
            if events.is_empty() {
                debug!(thread_id = %existing_id, "reusing empty delegate slot");
                self.store.update_metadata(existing_id, metadata).await?;
                return Ok(self.store.get_thread(existing_id).await?.expect("just updated"));
            }
            let next_id = id::delegate_id(parent_id, n + 1);
            return Ok(self.store.create_thread(&next_id, Some(parent_id), metadata).await?);
        }

        let first_id = id::delegate_id(parent_id, 1);
        Ok(self.store.create_thread(&first_id, Some(parent_id), metadata).await?)
    }

    pub async fn get_thread(&self, id: &str) -> Result<Option<Thread>> {
        Ok(self.store.get_thread(id).await?)
    }

    pub async fn close(&self, thread_id: &str) -> Result<()> {
        self.store.set_closed(thread_id, true).await?;
        let _ = self.notify_tx.send(ThreadNotification::ThreadClosed {
            thread_id: thread_id.to_string(),
        });
        Ok(())
    }

    pub async fn append_event(
        &self,
        thread_id: &str,
        event_type: EventType,
        data: EventData,
    ) -> Result<Event> {
        let event = self.store.append_event(thread_id, event_type, data).await?;
        let _ = self.notify_tx.send(ThreadNotification::EventAppended {
            thread_id: thread_id.to_string(),
            seq: event.seq,
        });
        Ok(event)
    }

    pub async fn list_events(&self, thread_id: &str, since_seq: Option<u64>) -> Result<Vec<Event>> {
        Ok(self.store.list_events(thread_id, since_seq).await?)
    }

    /// Union of `root_thread_id` and every delegate beneath it, merged by
    /// `(timestamp, thread_id, seq)` (spec.md §4.1).
    pub async fn get_main_and_delegate_events(&self, root_thread_id: &str) -> Result<Vec<Event>> {
        Ok(self.store.list_main_and_delegate_events(root_thread_id).await?)
    }

    pub async fn list_delegate_threads(&self, root_thread_id: &str) -> Result<Vec<Thread>> {
        let mut threads = self.store.list_descendant_threads(root_thread_id).await?;
        threads.retain(|t| t.id != root_thread_id);
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lace_store::SqliteThreadStore;

    fn manager() -> ThreadManager {
        let store = Arc::new(SqliteThreadStore::open_in_memory().unwrap());
        ThreadManager::new(store)
    }

    #[tokio::test]
    async fn creates_valid_session_thread_id() {
        let mgr = manager();
        let t = mgr.create_session_thread(ThreadMetadata::default()).await.unwrap();
        assert!(id::is_base_id(&t.id));
    }

    #[tokio::test]
    async fn delegate_ordinals_increment_without_gaps() {
        let mgr = manager();
        let root = mgr.create_session_thread(ThreadMetadata::default()).await.unwrap();
        let d1 = mgr.create_delegate_thread(&root.id, ThreadMetadata::default()).await.unwrap();
        mgr.append_event(&d1.id, EventType::AgentMessage, EventData::Text("x".into()))
            .await
            .unwrap();
        let d2 = mgr.create_delegate_thread(&root.id, ThreadMetadata::default()).await.unwrap();
        assert_eq!(d1.id, format!("{}.1", root.id));
        assert_eq!(d2.id, format!("{}.2", root.id));
    }

    #[tokio::test]
    async fn empty_delegate_slot_is_reused_not_skipped() {
        let mgr = manager();
        let root = mgr.create_session_thread(ThreadMetadata::default()).await.unwrap();
        let d1 = mgr.create_delegate_thread(&root.id, ThreadMetadata::default()).await.unwrap();
        // No events appended to d1 — retry should reuse the same ordinal.
        let d1_retry = mgr.create_delegate_thread(&root.id, ThreadMetadata::default()).await.unwrap();
        assert_eq!(d1.id, d1_retry.id);
    }

    #[tokio::test]
    async fn create_delegate_under_unknown_parent_errors() {
        let mgr = manager();
        let result = mgr.create_delegate_thread("nope", ThreadMetadata::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_delegate_threads_excludes_root() {
        let mgr = manager();
        let root = mgr.create_session_thread(ThreadMetadata::default()).await.unwrap();
        mgr.create_delegate_thread(&root.id, ThreadMetadata::default()).await.unwrap();
        let delegates = mgr.list_delegate_threads(&root.id).await.unwrap();
        assert_eq!(delegates.len(), 1);
        assert!(delegates[0].id != root.id);
    }

    #[tokio::test]
    async fn notifications_fire_on_append_and_close() {
        let mgr = manager();
        let root = mgr.create_session_thread(ThreadMetadata::default()).await.unwrap();
        let mut rx = mgr.subscribe();
        mgr.append_event(&root.id, EventType::UserMessage, EventData::Text("hi".into()))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            ThreadNotification::EventAppended { thread_id, seq } => {
                assert_eq!(thread_id, root.id);
                assert_eq!(seq, 0);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
        mgr.close(&root.id).await.unwrap();
        match rx.recv().await.unwrap() {
            ThreadNotification::ThreadClosed { thread_id } => assert_eq!(thread_id, root.id),
            other => panic!("unexpected notification: {other:?}"),
        }
    }
}
