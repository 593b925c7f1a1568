// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use lace_config::{AgentMode, ToolPolicy};

use crate::broker::{BrokerVerdict, SessionApprovalBroker};
use crate::policy::resolve_policy;
use crate::{Tool, ToolCall, ToolOutput};

/// Default size of the per-session tool worker pool (spec.md §5: "tool
/// executions run on a bounded worker pool per session (default size 4)").
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// A tool schema – mirrors lace_model::ToolSchema but keeps tools crate
/// independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all available tools.
///
/// `worker_pool` bounds how many `Tool::execute` calls may run
/// concurrently across a session's agents (spec.md §5); a single turn
/// already serializes its own tool calls (there is only ever one
/// in-flight `execute_checked` per `Agent`), so the pool matters once a
/// session has multiple agents — e.g. a parent and its delegates —
/// executing tools at the same time.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    worker_pool: Arc<Semaphore>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_worker_pool_size(DEFAULT_WORKER_POOL_SIZE)
    }

    /// Build a registry whose tool worker pool holds `size` concurrent
    /// execution slots instead of the spec's default of 4.
    pub fn with_worker_pool_size(size: usize) -> Self {
        Self { tools: HashMap::new(), worker_pool: Arc::new(Semaphore::new(size.max(1))) }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas for ALL registered tools (mode-unfiltered).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        }).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: AgentMode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Dispatch `call` directly to its tool with no schema validation or
    /// approval check. Used by tests and by callers that have already
    /// validated/approved the call themselves.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => {
                let _permit = self.worker_pool.acquire().await.expect("worker pool semaphore never closes");
                tool.execute(call).await
            }
            None => ToolOutput::err(
                &call.id,
                format!("unknown tool: {}", call.name),
            ),
        }
    }

    /// Full dispatch path: validate `call.args` against the tool's JSON
    /// Schema, enforce working-directory sandboxing when
    /// `no_escape_cwd` is set, resolve the effective policy, consult the
    /// approval broker, and only then run it.
    pub async fn execute_checked(
        &self,
        call: &ToolCall,
        policies: &HashMap<String, ToolPolicy>,
        broker: &SessionApprovalBroker,
        working_directory: &str,
        no_escape_cwd: bool,
    ) -> ToolOutput {
        let tool = match self.tools.get(&call.name) {
            Some(t) => t,
            None => {
                return ToolOutput::err(&call.id, format!("unknown tool: {}", call.name));
            }
        };

        if let Err(msg) = validate_args(tool.parameters_schema(), &call.args) {
            return ToolOutput::err(&call.id, format!("invalid arguments: {msg}"));
        }

        if no_escape_cwd {
            for key in ["path", "workdir"] {
                if let Some(path) = call.args.get(key).and_then(|v| v.as_str()) {
                    if !path_stays_within(working_directory, path) {
                        return ToolOutput::err(
                            &call.id,
                            format!("path '{path}' escapes the working directory"),
                        );
                    }
                }
            }
        }

        let policy = resolve_policy(tool.as_ref(), policies);
        match broker.check(tool.as_ref(), policy, call).await {
            BrokerVerdict::Proceed => {
                let _permit = self.worker_pool.acquire().await.expect("worker pool semaphore never closes");
                tool.execute(call).await
            }
            BrokerVerdict::Refuse => {
                ToolOutput::err(&call.id, format!("'{}' was not approved", call.name))
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn names_for_mode(&self, mode: AgentMode) -> Vec<String> {
        let mut names: Vec<String> = self.tools.values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

/// Lexically normalize `components` (collapsing `.` and resolving `..`
/// without touching the filesystem, since a tool like `write` may target a
/// path that doesn't exist yet).
fn normalize(path: &std::path::Path) -> std::path::PathBuf {
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `true` when `path` (resolved relative to `working_directory` if not
/// already absolute) stays inside `working_directory` after normalization
/// (the "no-escape-cwd" restriction).
fn path_stays_within(working_directory: &str, path: &str) -> bool {
    let base = normalize(std::path::Path::new(working_directory));
    let candidate = std::path::Path::new(path);
    let resolved = if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&base.join(candidate))
    };
    resolved.starts_with(&base)
}

/// Validate `args` against a tool's declared JSON Schema, returning the
/// first validation error message on failure.
fn validate_args(schema: serde_json::Value, args: &serde_json::Value) -> Result<(), String> {
    let compiled = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(e) => return Err(format!("malformed tool schema: {e}")),
    };
    if let Some(err) = compiled.iter_errors(args).next() {
        return Err(err.to_string());
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use lace_config::ToolPolicy;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    /// Minimal no-op tool for registry tests.
    struct EchoTool { name: &'static str }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "echoes its input" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ToolPolicy { ToolPolicy::Allow }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn names_returns_all_registered() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn schemas_contains_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "my_tool" });
        let schemas = reg.schemas();
        assert!(schemas.iter().any(|s| s.name == "my_tool"));
    }

    #[test]
    fn schemas_include_description() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.names().len(), 1);
    }

    // ── execute_checked: schema validation + approval broker ────────────────

    struct StrictTool;

    #[async_trait]
    impl Tool for StrictTool {
        fn name(&self) -> &str { "strict" }
        fn description(&self) -> &str { "requires an integer 'n'" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "n": { "type": "integer" } },
                "required": ["n"]
            })
        }
        fn default_policy(&self) -> ToolPolicy { ToolPolicy::Allow }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("n={}", call.args["n"]))
        }
    }

    struct GatedTool;

    #[async_trait]
    impl Tool for GatedTool {
        fn name(&self) -> &str { "gated" }
        fn description(&self) -> &str { "requires approval" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ToolPolicy { ToolPolicy::RequireApproval }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ran")
        }
    }

    use crate::broker::{DenyAllPrompter, Decision, Prompter, SessionApprovalBroker};

    struct AllowOncePrompter;

    #[async_trait]
    impl Prompter for AllowOncePrompter {
        async fn ask(&self, _call: &ToolCall) -> Decision {
            Decision::AllowOnce
        }
    }

    #[tokio::test]
    async fn execute_checked_rejects_invalid_args() {
        let mut reg = ToolRegistry::new();
        reg.register(StrictTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "strict".into(), args: json!({}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, ".", false).await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn execute_checked_runs_with_valid_args() {
        let mut reg = ToolRegistry::new();
        reg.register(StrictTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "strict".into(), args: json!({"n": 3}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, ".", false).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, "n=3");
    }

    #[tokio::test]
    async fn execute_checked_refuses_when_approval_denied() {
        let mut reg = ToolRegistry::new();
        reg.register(GatedTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "gated".into(), args: json!({}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, ".", false).await;
        assert!(out.is_error);
        assert!(out.content.contains("not approved"));
    }

    #[tokio::test]
    async fn execute_checked_proceeds_when_approved() {
        let mut reg = ToolRegistry::new();
        reg.register(GatedTool);
        let broker = SessionApprovalBroker::new(Box::new(AllowOncePrompter));
        let call = ToolCall { id: "1".into(), name: "gated".into(), args: json!({}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, ".", false).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, "ran");
    }

    #[tokio::test]
    async fn execute_checked_config_override_denies() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let mut policies = HashMap::new();
        policies.insert("echo".to_string(), ToolPolicy::Deny);
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({}) };
        let out = reg.execute_checked(&call, &policies, &broker, ".", false).await;
        assert!(out.is_error);
        assert!(out.content.contains("not approved"));
    }

    // ── no-escape-cwd sandboxing ─────────────────────────────────────────────

    struct PathTool;

    #[async_trait]
    impl Tool for PathTool {
        fn name(&self) -> &str { "path_tool" }
        fn description(&self) -> &str { "takes a path" }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "path": { "type": "string" } } })
        }
        fn default_policy(&self) -> ToolPolicy { ToolPolicy::Allow }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ran")
        }
    }

    #[tokio::test]
    async fn sandboxing_allows_paths_inside_working_directory() {
        let mut reg = ToolRegistry::new();
        reg.register(PathTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "path_tool".into(), args: json!({"path": "src/lib.rs"}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, "/proj", true).await;
        assert!(!out.is_error, "{}", out.content);
    }

    #[tokio::test]
    async fn sandboxing_rejects_dotdot_escape() {
        let mut reg = ToolRegistry::new();
        reg.register(PathTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "path_tool".into(), args: json!({"path": "../../etc/passwd"}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, "/proj", true).await;
        assert!(out.is_error);
        assert!(out.content.contains("escapes the working directory"));
    }

    #[tokio::test]
    async fn sandboxing_rejects_absolute_escape() {
        let mut reg = ToolRegistry::new();
        reg.register(PathTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "path_tool".into(), args: json!({"path": "/etc/passwd"}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, "/proj", true).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn sandboxing_disabled_allows_escape() {
        let mut reg = ToolRegistry::new();
        reg.register(PathTool);
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let call = ToolCall { id: "1".into(), name: "path_tool".into(), args: json!({"path": "/etc/passwd"}) };
        let out = reg.execute_checked(&call, &HashMap::new(), &broker, "/proj", false).await;
        assert!(!out.is_error, "{}", out.content);
    }

    // ── bounded worker pool (spec.md §5) ─────────────────────────────────────

    struct SlowTool(Arc<std::sync::atomic::AtomicUsize>, Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "sleeps while tracking concurrent in-flight calls" }
        fn parameters_schema(&self) -> Value { json!({ "type": "object" }) }
        fn default_policy(&self) -> ToolPolicy { ToolPolicy::Allow }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            use std::sync::atomic::Ordering;
            let inflight = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            self.1.fetch_max(inflight, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.fetch_sub(1, Ordering::SeqCst);
            ToolOutput::ok(&call.id, "done")
        }
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrent_executions() {
        let inflight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut reg = ToolRegistry::with_worker_pool_size(2);
        reg.register(SlowTool(Arc::clone(&inflight), Arc::clone(&peak)));
        let reg = Arc::new(reg);

        let mut handles = Vec::new();
        for i in 0..6 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                let call = ToolCall { id: format!("{i}"), name: "slow".into(), args: json!({}) };
                reg.execute(&call).await
            }));
        }
        for h in handles {
            let out = h.await.unwrap();
            assert!(!out.is_error);
        }

        assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2, "never more than 2 concurrent executions");
    }
}
