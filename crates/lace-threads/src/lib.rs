// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Thread id grammar and the [`ThreadManager`] policy layer over
//! [`lace_store::ThreadStore`] (spec.md §3, §4.1-§4.2).

mod error;
pub mod id;
mod manager;

pub use error::{Error, Result};
pub use manager::{ThreadManager, ThreadNotification};

pub use lace_store::{Event, EventData, EventType, Task, TaskNote, TaskPatch, TaskPriority, TaskStatus, Thread, ThreadMetadata};
