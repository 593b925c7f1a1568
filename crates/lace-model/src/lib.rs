// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider-agnostic model abstraction.
//!
//! This crate defines the [`ModelProvider`] trait and the request/response
//! vocabulary the rest of the workspace speaks — `CompletionRequest`,
//! `Message`, and the streamed [`ResponseEvent`] chunks. It intentionally
//! carries no HTTP client and no concrete provider implementations: wiring a
//! real transport onto [`ModelProvider`] is the concern of whatever embeds
//! this crate, not of the agent runtime itself.
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider, ScriptedTurn};
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;
