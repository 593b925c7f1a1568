// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use lace_config::ToolPolicy;

use crate::tool::Tool;

/// Resolve the effective policy for a tool call: the most specific
/// project/session/agent config layer wins (the key-wise `tool_policies`
/// merge already performed by `lace_config::effective_config`); a tool not
/// named in that map falls back to its own `default_policy()`.
pub fn resolve_policy(tool: &dyn Tool, policies: &HashMap<String, ToolPolicy>) -> ToolPolicy {
    policies
        .get(tool.name())
        .copied()
        .unwrap_or_else(|| tool.default_policy())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
