// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed delegate spec '{0}', expected 'new:provider/model'")]
    MalformedSpec(String),

    #[error("model provider construction failed: {0}")]
    ProviderFactory(String),

    #[error(transparent)]
    Threads(#[from] lace_threads::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
