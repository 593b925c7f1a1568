// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable, transactional storage for threads, events and tasks.
//!
//! `lace-store` owns the only SQL in the workspace. Everything above it —
//! `lace-threads`'s id grammar and notification fan-out, `lace-tasks`'s CRUD
//! policy, `lace-core`'s turn loop — speaks the [`ThreadStore`] trait and
//! never touches `rusqlite` directly. Grounded on the sibling pack's
//! `agtrace-index::Database` (`Connection` + `execute_batch` schema init +
//! prepared `query_map`), adapted from a read-mostly index into an
//! append-heavy event log.

mod error;
mod schema;
mod sqlite;
mod store;

pub use error::{Error, Result};
pub use schema::{
    Event, EventData, EventType, Task, TaskNote, TaskPatch, TaskPriority, TaskStatus, Thread,
    ThreadMetadata,
};
pub use sqlite::SqliteThreadStore;
pub use store::ThreadStore;
