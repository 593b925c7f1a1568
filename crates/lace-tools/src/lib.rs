// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod broker;
pub mod builtin;
pub mod policy;
pub mod registry;
pub mod tool;

pub use broker::{BrokerVerdict, Decision, DenyAllPrompter, Prompter, SessionApprovalBroker};
pub use policy::resolve_policy;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::list_dir::ListDirTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::shell::ShellTool;
pub use builtin::write::WriteTool;
