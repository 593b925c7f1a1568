// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The turn-level error taxonomy (spec.md §7). Tool-level failures never
//! reach here — `ToolRegistry::execute_checked` already normalises them into
//! a `ToolOutput{isError:true}` fed back to the provider as a `TOOL_RESULT`.
//! What's left is what can end a turn.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Safe to retry with backoff (§7); exhausting the retry budget promotes
    /// the last attempt's cause to `ProviderFatal`.
    #[error("provider stream error (transient): {0}")]
    ProviderTransient(String),

    #[error("provider stream error (fatal): {0}")]
    ProviderFatal(String),

    #[error(transparent)]
    Storage(#[from] lace_store::Error),

    #[error(transparent)]
    Threads(#[from] lace_threads::Error),

    #[error("turn cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
