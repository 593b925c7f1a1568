// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Approval broker.
//!
//! Sits between `ToolRegistry::execute` and a human (or automation) that
//! grants or refuses permission for a `require-approval` tool call. Decisions
//! are cached per session so a user is not re-prompted for every invocation
//! of a tool they already said "allow for this session" to.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use lace_config::ToolPolicy;

use crate::tool::{Tool, ToolCall};

/// The three-way answer a prompter can give for a single approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run this one call, ask again next time.
    AllowOnce,
    /// Run this call and every future call to the same tool for the rest of
    /// the session, without asking again.
    AllowSession,
    /// Refuse this call.
    Deny,
}

/// Asks something — a human at a terminal, a UI dialog, a CI policy file —
/// whether a tool call should proceed. Implemented once per frontend.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, call: &ToolCall) -> Decision;
}

/// A [`Prompter`] for headless/non-interactive runs: every prompt is denied.
/// Useful as a safe default and in tests that should never block on input.
pub struct DenyAllPrompter;

#[async_trait]
impl Prompter for DenyAllPrompter {
    async fn ask(&self, _call: &ToolCall) -> Decision {
        Decision::Deny
    }
}

/// Outcome of consulting the broker before running a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerVerdict {
    Proceed,
    Refuse,
}

/// Session-scoped approval broker.
///
/// `require-approval` tools consult a [`Prompter`] the first time they are
/// called; an `AllowSession` answer is cached for the lifetime of this
/// broker instance so later calls to the same tool proceed without asking
/// again. `allow`/`deny` policies never reach the prompter at all.
pub struct SessionApprovalBroker {
    prompter: Box<dyn Prompter>,
    session_allowed: Mutex<HashMap<String, ()>>,
}

impl SessionApprovalBroker {
    pub fn new(prompter: Box<dyn Prompter>) -> Self {
        Self {
            prompter,
            session_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Consult the broker for `call` against `tool`'s resolved policy.
    /// `policy` should already be the effective, config-resolved policy for
    /// this tool (see [`crate::policy::resolve_policy`]).
    pub async fn check(&self, tool: &dyn Tool, policy: ToolPolicy, call: &ToolCall) -> BrokerVerdict {
        match policy {
            ToolPolicy::Deny => BrokerVerdict::Refuse,
            ToolPolicy::Allow => BrokerVerdict::Proceed,
            ToolPolicy::RequireApproval => {
                if self.session_allowed.lock().unwrap().contains_key(tool.name()) {
                    return BrokerVerdict::Proceed;
                }
                match self.prompter.ask(call).await {
                    Decision::AllowOnce => BrokerVerdict::Proceed,
                    Decision::AllowSession => {
                        self.session_allowed
                            .lock()
                            .unwrap()
                            .insert(tool.name().to_string(), ());
                        BrokerVerdict::Proceed
                    }
                    Decision::Deny => BrokerVerdict::Refuse,
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{ToolOutput};

    struct NoopTool;

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({ "type": "object" })
        }
        fn default_policy(&self) -> ToolPolicy {
            ToolPolicy::RequireApproval
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "ok")
        }
    }

    struct ScriptedPrompter(Decision);

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn ask(&self, _call: &ToolCall) -> Decision {
            self.0
        }
    }

    fn call() -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "noop".into(),
            args: json!({}),
        }
    }

    #[tokio::test]
    async fn allow_policy_never_consults_prompter() {
        let broker = SessionApprovalBroker::new(Box::new(DenyAllPrompter));
        let verdict = broker.check(&NoopTool, ToolPolicy::Allow, &call()).await;
        assert_eq!(verdict, BrokerVerdict::Proceed);
    }

    #[tokio::test]
    async fn deny_policy_never_consults_prompter() {
        let broker = SessionApprovalBroker::new(Box::new(ScriptedPrompter(Decision::AllowSession)));
        let verdict = broker.check(&NoopTool, ToolPolicy::Deny, &call()).await;
        assert_eq!(verdict, BrokerVerdict::Refuse);
    }

    #[tokio::test]
    async fn require_approval_allow_once_proceeds_but_does_not_cache() {
        let broker = SessionApprovalBroker::new(Box::new(ScriptedPrompter(Decision::AllowOnce)));
        let v1 = broker.check(&NoopTool, ToolPolicy::RequireApproval, &call()).await;
        assert_eq!(v1, BrokerVerdict::Proceed);
        assert!(broker.session_allowed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn require_approval_allow_session_is_cached() {
        let broker = SessionApprovalBroker::new(Box::new(ScriptedPrompter(Decision::AllowSession)));
        let v1 = broker.check(&NoopTool, ToolPolicy::RequireApproval, &call()).await;
        assert_eq!(v1, BrokerVerdict::Proceed);
        assert!(broker.session_allowed.lock().unwrap().contains_key("noop"));

        // Second call should proceed without consulting the prompter again
        // (this broker's prompter always answers AllowSession anyway, but the
        // cache check happens before ever calling ask()).
        let v2 = broker.check(&NoopTool, ToolPolicy::RequireApproval, &call()).await;
        assert_eq!(v2, BrokerVerdict::Proceed);
    }

    #[tokio::test]
    async fn require_approval_deny_refuses() {
        let broker = SessionApprovalBroker::new(Box::new(ScriptedPrompter(Decision::Deny)));
        let verdict = broker.check(&NoopTool, ToolPolicy::RequireApproval, &call()).await;
        assert_eq!(verdict, BrokerVerdict::Refuse);
    }
}
