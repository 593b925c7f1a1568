// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed thread id: {0}")]
    MalformedId(String),

    #[error("thread not found: {0}")]
    UnknownThread(String),

    #[error(transparent)]
    Store(#[from] lace_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
