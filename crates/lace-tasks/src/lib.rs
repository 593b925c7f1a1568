// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session-scoped task tracking (spec.md §4.7): create/update/note/list
//! operations layered over [`lace_store::ThreadStore`], with `new:`
//! assignment strings handed off to an injected [`DelegateSpawner`] rather
//! than spawned in-crate.

mod error;
mod events;
mod id;
mod manager;
mod tool;

pub use error::{Error, Result};
pub use events::TaskEvent;
pub use manager::{
    CreateTaskRequest, DelegateSpawner, ListFilter, TaskFilters, TaskManager, TaskSummary,
};
pub use tool::TaskTool;

pub use lace_store::{Task, TaskNote, TaskPatch, TaskPriority, TaskStatus};
