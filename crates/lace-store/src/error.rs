// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failure modes surfaced by [`crate::ThreadStore`] (spec.md §4.1, §7).
///
/// Every persistence failure — a bad SQL statement, a locked file, a
/// serialization mismatch — is normalised to a storage variant so callers
/// only ever branch on `ErrStorage` at the boundary, never on
/// `rusqlite`/`serde_json` internals.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("thread not found: {0}")]
    UnknownThread(String),

    #[error("task not found: {0}")]
    UnknownTask(String),

    #[error("tool result references unknown call id: {0}")]
    UnknownCallId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
