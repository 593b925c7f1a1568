// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task lifecycle notifications (spec.md §4.7's `task:created` /
//! `task:updated` / `task:note_added`), emitted synchronously relative to
//! the call that caused them — mirrors `lace_threads::ThreadNotification`'s
//! broadcast-fan-out shape.

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Created { task_id: String },
    Updated { task_id: String },
    NoteAdded { task_id: String, note_id: String },
}
