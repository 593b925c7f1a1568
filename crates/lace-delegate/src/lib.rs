// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Delegation: wires a `new:provider/model` assignment string to a spawned
//! child [`lace_core::Agent`]. This is the one crate allowed to depend on
//! the rest of the workspace at once — every other crate stays ignorant of
//! how delegates actually run.

mod error;
mod factory;
mod runtime;

pub use error::{Error, Result};
pub use factory::{MockModelProviderFactory, ModelProviderFactory};
pub use runtime::DelegateRuntime;
