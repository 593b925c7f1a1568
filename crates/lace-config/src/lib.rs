// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod merge;
mod schema;
mod window;

pub use loader::{config_search_paths, lace_dir, load_project_config, read_user_instructions};
pub use merge::{effective_config, EffectiveConfig};
pub use schema::{
    AgentMode, AgentOverrideConfig, ProjectConfig, SessionConfig, ToolPolicy, ToolsConfig,
};
pub use window::{conversation_window, MessageKind, WindowedMessage};
