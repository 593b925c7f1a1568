// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use crate::schema::{AgentOverrideConfig, ProjectConfig, SessionConfig, ToolPolicy};

/// The fully resolved configuration for one agent, computed by chaining
/// `project → session → agent`. Scalar and array
/// fields are replaced wholesale by the most specific layer that sets
/// them; `tool_policies` is the one field that merges key-wise, with the
/// most specific layer winning per key.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub working_directory: String,
    pub provider_instance_id: Option<String>,
    pub model_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    pub tools: Vec<String>,
    pub tool_policies: HashMap<String, ToolPolicy>,
    pub capabilities: Vec<String>,
    pub restrictions: Vec<String>,
    pub memory_size: Option<usize>,
    pub conversation_history: usize,
    pub role: Option<String>,
    /// Contents of `$LACE_DIR/instructions.md`, if present (spec.md §6).
    /// Not part of the project/session/agent merge chain — it's global
    /// per-user state, attached by the composition root after
    /// `effective_config` runs via [`EffectiveConfig::with_user_instructions`].
    pub user_instructions: Option<String>,
}

/// Merge `tool_policies` key-wise: for each key, the most specific layer
/// that sets it wins. Keys absent from every layer fall back to whatever
/// `project` already carries (its own defaults).
fn merge_tool_policies(
    project: &HashMap<String, ToolPolicy>,
    session: &HashMap<String, ToolPolicy>,
    agent: &HashMap<String, ToolPolicy>,
) -> HashMap<String, ToolPolicy> {
    let mut merged = project.clone();
    for (k, v) in session {
        merged.insert(k.clone(), *v);
    }
    for (k, v) in agent {
        merged.insert(k.clone(), *v);
    }
    merged
}

/// Compute the effective configuration for an agent given its three
/// config layers. `project` is always fully populated (it has a
/// [`Default`] impl with concrete defaults); `session`/`agent` only
/// carry the fields they override.
pub fn effective_config(
    project: &ProjectConfig,
    session: &SessionConfig,
    agent: &AgentOverrideConfig,
) -> EffectiveConfig {
    EffectiveConfig {
        working_directory: project.working_directory.clone(),
        provider_instance_id: agent
            .provider_instance_id
            .clone()
            .or_else(|| session.provider_instance_id.clone())
            .or_else(|| project.provider_instance_id.clone()),
        model_id: agent
            .model_id
            .clone()
            .or_else(|| session.model_id.clone())
            .or_else(|| project.model_id.clone()),
        max_tokens: agent.max_tokens.or(session.max_tokens).or(project.max_tokens),
        temperature: agent
            .temperature
            .or(session.temperature)
            .or(project.temperature),
        system_prompt: agent
            .system_prompt
            .clone()
            .or_else(|| session.system_prompt.clone())
            .or_else(|| project.system_prompt.clone()),
        tools: agent
            .tools
            .clone()
            .or_else(|| session.tools.clone())
            .unwrap_or_else(|| project.tools.clone()),
        tool_policies: merge_tool_policies(
            &project.tool_policies,
            &session.tool_policies,
            &agent.tool_policies,
        ),
        capabilities: agent
            .capabilities
            .clone()
            .or_else(|| session.capabilities.clone())
            .unwrap_or_else(|| project.capabilities.clone()),
        restrictions: agent
            .restrictions
            .clone()
            .or_else(|| session.restrictions.clone())
            .unwrap_or_else(|| project.restrictions.clone()),
        memory_size: agent.memory_size.or(session.memory_size).or(project.memory_size),
        conversation_history: agent
            .conversation_history
            .or(session.conversation_history)
            .or(project.conversation_history)
            .unwrap_or(40),
        role: agent
            .role
            .clone()
            .or_else(|| session.role.clone())
            .or_else(|| project.role.clone()),
        user_instructions: None,
    }
}

impl EffectiveConfig {
    /// `true` when the session has opted into working-directory
    /// sandboxing (the "no-escape-cwd" restriction).
    pub fn no_escape_cwd(&self) -> bool {
        self.restrictions.iter().any(|r| r == "no-escape-cwd")
    }

    /// Attach `$LACE_DIR/instructions.md` content (spec.md §6), read by
    /// the composition root via [`crate::read_user_instructions`].
    pub fn with_user_instructions(mut self, text: Option<String>) -> Self {
        self.user_instructions = text;
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
