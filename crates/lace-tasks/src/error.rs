// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    UnknownTask(String),

    #[error("'{0}' requires a delegate spawner but none is configured")]
    NoSpawner(String),

    #[error("delegate spawn failed: {0}")]
    SpawnFailed(String),

    #[error(transparent)]
    Store(#[from] lace_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
