// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt construction (spec.md §4.6's "seed the new thread with a
//! system prompt" step). Kept deliberately small: this workspace has no
//! skills/knowledge-base/git-context subsystem, so the prompt is just a
//! mode-aware identity block plus whatever the effective configuration
//! exposes about the agent's role and available tools.

use lace_config::{AgentMode, EffectiveConfig};

fn mode_instructions(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Research => {
            "You are a research assistant.  You may read files and search the codebase to \
             gather information.  You MUST NOT write, modify, or delete any files. Research \
             mode is non-destructive: focus on collecting what's needed to answer the request."
        }
        AgentMode::Plan => {
            "You are a planning assistant.  Analyse the request and produce a clear, structured \
             plan with numbered steps.  You may read files to inform the plan, but MUST NOT \
             modify them.  Present the plan in Markdown."
        }
        AgentMode::Agent => {
            "You are a capable coding agent.  You can read and write files, run shell commands, \
             and search the codebase.  Work systematically, verify your changes, and report \
             your progress clearly.\n\
             - Maximize parallel tool calls where they are independent.\n\
             - Finish the task the user asked for before ending your turn."
        }
    }
}

fn build_guidelines_section() -> String {
    "## Guidelines\n\n\
     - Read before you write: understand the surrounding code before changing it.\n\
     - Prefer the smallest change that satisfies the request.\n\
     - When a tool call fails, read the error before retrying — don't guess blindly.\n\
     - State what you changed and why only when it isn't obvious from the diff."
        .to_string()
}

fn build_tools_section(config: &EffectiveConfig) -> String {
    if config.tools.is_empty() {
        return String::new();
    }
    format!(
        "\n\n## Available Tools\n\nThis turn may use: {}.",
        config.tools.join(", ")
    )
}

fn build_role_section(config: &EffectiveConfig) -> String {
    match &config.role {
        Some(role) => format!("\n\n## Role\n\n{role}"),
        None => String::new(),
    }
}

fn build_user_instructions_section(config: &EffectiveConfig) -> String {
    match &config.user_instructions {
        Some(text) if !text.trim().is_empty() => {
            format!("\n\n## User Instructions\n\n{text}")
        }
        _ => String::new(),
    }
}

/// Build the system prompt for the given agent mode and effective
/// configuration. `config.system_prompt`, when set, is used verbatim by
/// the caller instead of calling this function at all (spec.md §4.6's
/// `EffectiveConfig.systemPrompt` override).
pub fn system_prompt(mode: AgentMode, config: &EffectiveConfig) -> String {
    let identity = format!(
        "You are Lace, a coding agent running in `{mode}` mode.\n\n\
         Working directory: `{}`",
        config.working_directory
    );

    format!(
        "{identity}\n\n{instructions}{role}{tools}{user_instructions}\n\n{guidelines}",
        identity = identity,
        instructions = mode_instructions(mode),
        role = build_role_section(config),
        tools = build_tools_section(config),
        user_instructions = build_user_instructions_section(config),
        guidelines = build_guidelines_section(),
    )
}
