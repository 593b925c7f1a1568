// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Constructs a [`ModelProvider`] for a `new:provider/model` spec.
//!
//! `lace-model` deliberately ships no HTTP client (see its crate docs) —
//! wiring a real transport onto a provider/model pair is left to whatever
//! embeds this workspace. The composition root supplies a concrete
//! [`ModelProviderFactory`]; tests and offline runs use
//! [`MockModelProviderFactory`].

use std::sync::Arc;

use lace_model::ModelProvider;

pub trait ModelProviderFactory: Send + Sync {
    /// Build the provider for `provider_instance_id`/`model_id`. Returns
    /// `Err` if the pair names a provider this factory does not know how
    /// to construct.
    fn build(&self, provider_instance_id: &str, model_id: &str) -> Result<Arc<dyn ModelProvider>, String>;
}

/// Always resolves to [`lace_model::MockProvider`], regardless of the
/// requested provider/model. Used where no real transport is configured.
#[derive(Debug, Default)]
pub struct MockModelProviderFactory;

impl ModelProviderFactory for MockModelProviderFactory {
    fn build(&self, _provider_instance_id: &str, _model_id: &str) -> Result<Arc<dyn ModelProvider>, String> {
        Ok(Arc::new(lace_model::MockProvider))
    }
}
