// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The event-sourced data model (spec.md §3): `Thread`, `Event`, `Task`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant for [`Event`] — the seven event types named in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserMessage,
    AgentMessage,
    ToolCall,
    ToolResult,
    LocalSystemMessage,
    SystemPrompt,
    UserSystemPrompt,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserMessage => "USER_MESSAGE",
            EventType::AgentMessage => "AGENT_MESSAGE",
            EventType::ToolCall => "TOOL_CALL",
            EventType::ToolResult => "TOOL_RESULT",
            EventType::LocalSystemMessage => "LOCAL_SYSTEM_MESSAGE",
            EventType::SystemPrompt => "SYSTEM_PROMPT",
            EventType::UserSystemPrompt => "USER_SYSTEM_PROMPT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "USER_MESSAGE" => EventType::UserMessage,
            "AGENT_MESSAGE" => EventType::AgentMessage,
            "TOOL_CALL" => EventType::ToolCall,
            "TOOL_RESULT" => EventType::ToolResult,
            "LOCAL_SYSTEM_MESSAGE" => EventType::LocalSystemMessage,
            "SYSTEM_PROMPT" => EventType::SystemPrompt,
            "USER_SYSTEM_PROMPT" => EventType::UserSystemPrompt,
            _ => return None,
        })
    }
}

/// The tagged payload carried by an [`Event`] (spec.md §3: "a tagged
/// payload whose shape is determined by `type`"). Plain messages carry a
/// string; tool events carry the structured call/result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    /// `USER_MESSAGE` / `AGENT_MESSAGE` / `SYSTEM_PROMPT` / `USER_SYSTEM_PROMPT`.
    Text(String),
    /// `TOOL_CALL`: a model-requested action, args already assembled from
    /// streamed fragments.
    ToolCall {
        call_id: String,
        name: String,
        args: serde_json::Value,
    },
    /// `TOOL_RESULT`: the paired outcome of a prior `TOOL_CALL`.
    /// `metadata` is the explicit linkage channel delegation uses to carry
    /// a spawned thread id (spec.md §9's Open Question resolution).
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    /// `LOCAL_SYSTEM_MESSAGE`: a note attributable to no model turn —
    /// abandonment records, delegate failures, terminal-transition causes.
    /// `call_id` is set when this note resolves an outstanding `TOOL_CALL`.
    LocalSystemMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

/// One immutable, append-only unit of thread history (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing within `thread_id`; defines logical time.
    pub seq: u64,
    pub thread_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

/// Free-form, per-thread key/value metadata plus the well-known fields
/// spec.md §3 names explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub name: Option<String>,
    pub provider_instance_id: Option<String>,
    pub model_id: Option<String>,
    /// The session this thread belongs to (spec.md §4.6 "session lookup").
    /// `None` for orphan agents used in isolated tests.
    pub session_id: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// `{ id, parentId?, createdAt, metadata }` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: ThreadMetadata,
    /// Set once the thread's agent has reported the terminal state of its
    /// last turn (spec.md §3: "closed ... can be resumed by attaching a
    /// new agent").
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TaskStatus::Pending,
            "in_progress" => TaskStatus::InProgress,
            "blocked" => TaskStatus::Blocked,
            "completed" => TaskStatus::Completed,
            "archived" => TaskStatus::Archived,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Sort rank used by `listTasks`'s `(priority asc, createdAt desc)`
    /// order (spec.md §4.7): high < medium < low.
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "high" => TaskPriority::High,
            "medium" => TaskPriority::Medium,
            "low" => TaskPriority::Low,
            _ => return None,
        })
    }
}

/// `{ id, author, content, timestamp }`, appended in order (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNote {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Session-scoped unit of work (spec.md §3). `thread_id` names the
/// *session* thread that owns this task, not any one delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Vec<TaskNote>,
}

/// Partial update applied by `updateTask` (spec.md §4.7). `id`,
/// `thread_id`, `created_by`, `created_at` are immutable and have no
/// field here — the store rejects any attempt to change them by
/// construction, not by runtime check.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<Option<String>>,
}
