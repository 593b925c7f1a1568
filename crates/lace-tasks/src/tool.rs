// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `task` tool (spec.md §4.7): exposes [`TaskManager`]'s CRUD surface to
//! the agent as a single dispatched tool rather than one tool per action,
//! grounded on the teacher's `task_tool.rs` (which similarly spawns
//! sub-agents from a single `task` tool call).
//!
//! When a `create`/`update` call assigns a `new:` spec, the resulting
//! delegate thread id is attached as this result's structured `metadata`
//! (spec.md §9's Open Question resolution) rather than left for a reader
//! to infer from `content`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use lace_config::{AgentMode, ToolPolicy};
use lace_store::{Task, TaskPatch, TaskPriority, TaskStatus};
use lace_tools::{Tool, ToolCall, ToolOutput};

use crate::manager::{CreateTaskRequest, ListFilter, TaskManager};

pub struct TaskTool {
    manager: Arc<TaskManager>,
    actor: String,
}

impl TaskTool {
    pub fn new(manager: Arc<TaskManager>, actor: impl Into<String>) -> Self {
        Self { manager, actor: actor.into() }
    }
}

fn task_json(task: &Task) -> Value {
    serde_json::to_value(task).unwrap_or(Value::Null)
}

fn str_arg<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
    call.args.get(key).and_then(|v| v.as_str())
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Create, update, annotate, list, or fetch session tasks. Set `assigned_to` to \
         `new:provider/model` on create or update to spawn a delegate agent that works the \
         task; the new delegate thread id is returned in this call's metadata."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "update", "add_note", "list", "get"]
                },
                "id": { "type": "string", "description": "Task id (update/add_note/get)" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "prompt": { "type": "string" },
                "assigned_to": {
                    "type": "string",
                    "description": "Assignee, or 'new:provider/model' to spawn a delegate. \
                                     Pass an empty string on update to clear the assignment."
                },
                "priority": { "type": "string", "enum": ["high", "medium", "low"] },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "blocked", "completed", "archived"]
                },
                "note": { "type": "string", "description": "Note content (add_note)" },
                "filter": {
                    "type": "string",
                    "enum": ["mine", "created", "all"],
                    "description": "listTasks filter axis (default: all)"
                },
                "include_completed": { "type": "boolean" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ToolPolicy {
        ToolPolicy::RequireApproval
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match str_arg(call, "action") {
            Some(a) => a,
            None => return ToolOutput::err(&call.id, "missing required parameter 'action'"),
        };
        match action {
            "create" => self.create(call).await,
            "update" => self.update(call).await,
            "add_note" => self.add_note(call).await,
            "list" => self.list(call).await,
            "get" => self.get(call).await,
            other => ToolOutput::err(&call.id, format!("unknown action '{other}'")),
        }
    }
}

impl TaskTool {
    async fn create(&self, call: &ToolCall) -> ToolOutput {
        let Some(title) = str_arg(call, "title") else {
            return ToolOutput::err(&call.id, "missing required parameter 'title'");
        };
        let Some(prompt) = str_arg(call, "prompt") else {
            return ToolOutput::err(&call.id, "missing required parameter 'prompt'");
        };
        let assigned_to = str_arg(call, "assigned_to").map(str::to_string);
        let is_spawn = assigned_to.as_deref().is_some_and(|s| s.starts_with("new:"));

        let req = CreateTaskRequest {
            title: title.to_string(),
            description: str_arg(call, "description").unwrap_or_default().to_string(),
            prompt: prompt.to_string(),
            assigned_to,
            priority: str_arg(call, "priority").and_then(TaskPriority::from_str),
        };

        match self.manager.create_task(req, &self.actor).await {
            Ok(task) => {
                let mut out = ToolOutput::ok(&call.id, task_json(&task).to_string());
                if is_spawn {
                    if let Some(thread_id) = &task.assigned_to {
                        out = out.with_metadata(json!({ "delegate_thread_id": thread_id }));
                    }
                }
                out
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }

    async fn update(&self, call: &ToolCall) -> ToolOutput {
        let Some(id) = str_arg(call, "id") else {
            return ToolOutput::err(&call.id, "missing required parameter 'id'");
        };

        let assigned_to_arg = str_arg(call, "assigned_to");
        let is_spawn = assigned_to_arg.is_some_and(|s| s.starts_with("new:"));

        let patch = TaskPatch {
            title: str_arg(call, "title").map(str::to_string),
            description: str_arg(call, "description").map(str::to_string),
            prompt: str_arg(call, "prompt").map(str::to_string),
            status: str_arg(call, "status").and_then(TaskStatus::from_str),
            priority: str_arg(call, "priority").and_then(TaskPriority::from_str),
            assigned_to: assigned_to_arg
                .map(|s| if s.is_empty() { None } else { Some(s.to_string()) }),
        };

        match self.manager.update_task(id, patch, &self.actor).await {
            Ok(task) => {
                let mut out = ToolOutput::ok(&call.id, task_json(&task).to_string());
                if is_spawn {
                    if let Some(thread_id) = &task.assigned_to {
                        out = out.with_metadata(json!({ "delegate_thread_id": thread_id }));
                    }
                }
                out
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }

    async fn add_note(&self, call: &ToolCall) -> ToolOutput {
        let Some(id) = str_arg(call, "id") else {
            return ToolOutput::err(&call.id, "missing required parameter 'id'");
        };
        let Some(note) = str_arg(call, "note") else {
            return ToolOutput::err(&call.id, "missing required parameter 'note'");
        };
        match self.manager.add_note(id, note, &self.actor).await {
            Ok(note) => ToolOutput::ok(&call.id, serde_json::to_string(&note).unwrap_or_default()),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }

    async fn list(&self, call: &ToolCall) -> ToolOutput {
        let filter = match str_arg(call, "filter") {
            Some("mine") => ListFilter::Mine,
            Some("created") => ListFilter::Created,
            Some("all") | None => ListFilter::All,
            Some(other) => return ToolOutput::err(&call.id, format!("unknown filter '{other}'")),
        };
        let include_completed = call
            .args
            .get("include_completed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match self.manager.list_tasks(filter, include_completed, &self.actor).await {
            Ok(tasks) => {
                let values: Vec<Value> = tasks.iter().map(task_json).collect();
                ToolOutput::ok(&call.id, Value::Array(values).to_string())
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }

    async fn get(&self, call: &ToolCall) -> ToolOutput {
        let Some(id) = str_arg(call, "id") else {
            return ToolOutput::err(&call.id, "missing required parameter 'id'");
        };
        match self.manager.get_task_by_id(id).await {
            Ok(Some(task)) => ToolOutput::ok(&call.id, task_json(&task).to_string()),
            Ok(None) => ToolOutput::err(&call.id, format!("no such task in this session: {id}")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use lace_store::SqliteThreadStore;
    use serde_json::json;

    use super::*;
    use crate::manager::DelegateSpawner;

    fn tool() -> TaskTool {
        let store: Arc<dyn lace_store::ThreadStore> = Arc::new(SqliteThreadStore::open_in_memory().unwrap());
        let manager = Arc::new(TaskManager::new(store, "lace_20250101_abcdef"));
        TaskTool::new(manager, "user-1")
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "call-1".into(), name: "task".into(), args }
    }

    #[tokio::test]
    async fn create_requires_title_and_prompt() {
        let tool = tool();
        let out = tool.execute(&call(json!({"action": "create"}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn create_returns_task_json() {
        let tool = tool();
        let out = tool
            .execute(&call(json!({"action": "create", "title": "T", "prompt": "P"})))
            .await;
        assert!(!out.is_error);
        let parsed: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed["title"], "T");
        assert_eq!(parsed["status"], "pending");
        assert!(out.metadata.is_none());
    }

    struct FakeSpawner;

    #[async_trait]
    impl DelegateSpawner for FakeSpawner {
        async fn spawn(&self, _spec: &str, _task: &Task) -> std::result::Result<String, String> {
            Ok("lace_20250101_abcdef.1".to_string())
        }
    }

    #[tokio::test]
    async fn create_with_new_spec_attaches_delegate_metadata() {
        let store: Arc<dyn lace_store::ThreadStore> = Arc::new(SqliteThreadStore::open_in_memory().unwrap());
        let manager = Arc::new(
            TaskManager::new(store, "lace_20250101_abcdef").with_spawner(Arc::new(FakeSpawner)),
        );
        let tool = TaskTool::new(manager, "user-1");

        let out = tool
            .execute(&call(json!({
                "action": "create",
                "title": "T",
                "prompt": "P",
                "assigned_to": "new:anthropic/claude-3-5-haiku"
            })))
            .await;
        assert!(!out.is_error);
        assert_eq!(
            out.metadata.unwrap()["delegate_thread_id"],
            "lace_20250101_abcdef.1"
        );
    }

    #[tokio::test]
    async fn add_note_then_get_reflects_it() {
        let tool = tool();
        let created = tool
            .execute(&call(json!({"action": "create", "title": "T", "prompt": "P"})))
            .await;
        let task: Value = serde_json::from_str(&created.content).unwrap();
        let id = task["id"].as_str().unwrap();

        let note_out = tool
            .execute(&call(json!({"action": "add_note", "id": id, "note": "progress"})))
            .await;
        assert!(!note_out.is_error);

        let got = tool.execute(&call(json!({"action": "get", "id": id}))).await;
        let got_task: Value = serde_json::from_str(&got.content).unwrap();
        assert_eq!(got_task["notes"][0]["content"], "progress");
    }

    #[tokio::test]
    async fn get_unknown_id_errors() {
        let tool = tool();
        let out = tool.execute(&call(json!({"action": "get", "id": "task_nope"}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn list_defaults_to_all_excluding_completed() {
        let tool = tool();
        tool.execute(&call(json!({"action": "create", "title": "a", "prompt": "p"}))).await;
        let out = tool.execute(&call(json!({"action": "list"}))).await;
        let tasks: Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(tasks.as_array().unwrap().len(), 1);
    }
}
