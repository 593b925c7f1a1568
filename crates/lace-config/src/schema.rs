// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-tool execution policy, read from the merged session configuration.
///
/// `RequireApproval` is the default for destructive tools; `Allow` for
/// read-only ones. The executor's decision, per tool call, is:
/// `Allow` → execute, `Deny` → `ErrDenied`, `RequireApproval` → ask the
/// broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolPolicy {
    Allow,
    Deny,
    RequireApproval,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        ToolPolicy::RequireApproval
    }
}

/// The mode an agent thread is running in. Mirrors the corpus's own
/// `AgentMode` three-way split between read-only research, planning and
/// full read/write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Research,
    Plan,
    Agent,
}

impl Default for AgentMode {
    fn default() -> Self {
        AgentMode::Agent
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Research => write!(f, "research"),
            AgentMode::Plan => write!(f, "plan"),
            AgentMode::Agent => write!(f, "agent"),
        }
    }
}

fn default_tool_policies() -> HashMap<String, ToolPolicy> {
    let mut m = HashMap::new();
    m.insert("file-read".into(), ToolPolicy::Allow);
    m.insert("bash".into(), ToolPolicy::RequireApproval);
    m
}

/// Per-tool-name policy table. A bare struct (rather than a raw
/// `HashMap<String, ToolPolicy>` field) so every config layer can carry
/// one and `merge::merge_tool_policies` has a stable place to hang its
/// key-wise merge logic.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default = "default_tool_policies")]
    pub policies: HashMap<String, ToolPolicy>,
}

/// Project-level configuration: the top of the chain. Owns the working
/// directory and the defaults every session in the project inherits
/// unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub working_directory: String,
    #[serde(default)]
    pub provider_instance_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub tool_policies: HashMap<String, ToolPolicy>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub memory_size: Option<usize>,
    #[serde(default)]
    pub conversation_history: Option<usize>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            working_directory: ".".into(),
            provider_instance_id: None,
            model_id: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            system_prompt: None,
            tools: vec!["file-read".into(), "bash".into()],
            tool_policies: default_tool_policies(),
            capabilities: Vec::new(),
            restrictions: vec!["no-escape-cwd".into()],
            memory_size: None,
            conversation_history: Some(40),
            role: None,
        }
    }
}

/// Session-level configuration: overrides a subset of the project's
/// fields for all threads in one session. Every field is optional —
/// `None` means "inherit the parent layer unchanged" (a shallow merge
/// with child overriding parent).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub provider_instance_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub tool_policies: HashMap<String, ToolPolicy>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub restrictions: Option<Vec<String>>,
    #[serde(default)]
    pub memory_size: Option<usize>,
    #[serde(default)]
    pub conversation_history: Option<usize>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Agent-level configuration: the most specific layer, scoped to one
/// agent/thread. Same override shape as [`SessionConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentOverrideConfig {
    #[serde(default)]
    pub provider_instance_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub tool_policies: HashMap<String, ToolPolicy>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub restrictions: Option<Vec<String>>,
    #[serde(default)]
    pub memory_size: Option<usize>,
    #[serde(default)]
    pub conversation_history: Option<usize>,
    #[serde(default)]
    pub role: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_default_restricts_cwd_escape() {
        let p = ProjectConfig::default();
        assert!(p.restrictions.iter().any(|r| r == "no-escape-cwd"));
    }

    #[test]
    fn project_default_tool_policy_bash_requires_approval() {
        let p = ProjectConfig::default();
        assert_eq!(p.tool_policies.get("bash"), Some(&ToolPolicy::RequireApproval));
    }

    #[test]
    fn project_default_tool_policy_file_read_allowed() {
        let p = ProjectConfig::default();
        assert_eq!(p.tool_policies.get("file-read"), Some(&ToolPolicy::Allow));
    }

    #[test]
    fn session_config_default_has_no_overrides() {
        let s = SessionConfig::default();
        assert!(s.model_id.is_none());
        assert!(s.temperature.is_none());
        assert!(s.tools.is_none());
    }

    #[test]
    fn agent_mode_display_matches_lowercase_names() {
        assert_eq!(AgentMode::Research.to_string(), "research");
        assert_eq!(AgentMode::Plan.to_string(), "plan");
        assert_eq!(AgentMode::Agent.to_string(), "agent");
    }

    #[test]
    fn agent_mode_default_is_agent() {
        assert_eq!(AgentMode::default(), AgentMode::Agent);
    }

    #[test]
    fn tool_policy_default_is_require_approval() {
        assert_eq!(ToolPolicy::default(), ToolPolicy::RequireApproval);
    }

    #[test]
    fn tool_policy_round_trips_through_yaml() {
        let y = serde_yaml::to_string(&ToolPolicy::RequireApproval).unwrap();
        assert_eq!(y.trim(), "require-approval");
        let back: ToolPolicy = serde_yaml::from_str(&y).unwrap();
        assert_eq!(back, ToolPolicy::RequireApproval);
    }
}
