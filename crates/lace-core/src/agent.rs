// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The turn loop (spec.md §4.6): one [`Agent`] drives one thread against a
//! [`ModelProvider`] while mediating tool execution through
//! [`ToolRegistry`]/[`SessionApprovalBroker`], persisting every step as an
//! [`Event`] through [`ThreadManager`].
//!
//! Structurally this keeps the corpus's own turn-loop shape — accumulate
//! streamed tool-call fragments by parallel-call index, flush buffered
//! assistant text around tool boundaries, drive everything through a
//! cancellable `select!` — but the event-sourced thread replaces the
//! corpus's in-memory `Session`, and tool calls run serially within a turn
//! rather than via `tokio::spawn` (spec.md §5: "a provider stream is a
//! single causal order").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::warn;

use lace_config::{conversation_window, AgentMode, EffectiveConfig, MessageKind, WindowedMessage};
use lace_model::{CompletionRequest, FunctionCall, Message, MessageContent, ModelProvider, ResponseEvent, Role};
use lace_threads::{Event, EventData, EventType, ThreadManager};
use lace_tools::{SessionApprovalBroker, ToolCall, ToolRegistry};

use crate::error::{Error, Result};
use crate::prompts;
use crate::state::{TurnState, TurnStateCell};

/// Total transient-error retries permitted per turn (spec.md §7).
const MAX_PROVIDER_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;
/// Safety rail against a misbehaving provider/tool pair looping forever.
/// Not named by the spec; the spec bounds retries, not round count.
const MAX_ROUNDS: u32 = 50;
/// How long the turn waits for the next chunk before treating the stream as
/// stalled (spec.md §5: "elapses only if no chunk arrives within an idle
/// window").
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

fn retry_backoff(attempt: u32) -> Duration {
    let millis = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(4));
    Duration::from_millis(millis.min(MAX_BACKOFF_MS))
}

/// One parallel tool call's fragments, keyed by the provider's `index`
/// (reassembled by provider-reported index).
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

enum ChunkOutcome {
    Event(ResponseEvent),
    Timeout,
    StreamClosed,
    Error(String),
    Cancelled,
}

enum RoundOutcome {
    Done(String),
    ContinueRounds,
    Cancelled,
}

/// Drives one thread's turns against a model and a tool registry.
///
/// An `Agent` only ever appends events to the single `thread_id` it was
/// constructed with (spec.md §4.6's "never appends to a thread it does not
/// own"); `turn_lock` serializes concurrent `submit` calls so "exactly one
/// turn active, concurrent inputs queued FIFO" holds without the caller
/// having to coordinate.
pub struct Agent {
    thread_id: String,
    threads: Arc<ThreadManager>,
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    broker: Arc<SessionApprovalBroker>,
    config: EffectiveConfig,
    mode: AgentMode,
    state: Mutex<TurnStateCell>,
    turn_lock: Mutex<()>,
}

impl Agent {
    pub fn new(
        thread_id: impl Into<String>,
        threads: Arc<ThreadManager>,
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        broker: Arc<SessionApprovalBroker>,
        config: EffectiveConfig,
        mode: AgentMode,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            threads,
            model,
            tools,
            broker,
            config,
            mode,
            state: Mutex::new(TurnStateCell::new()),
            turn_lock: Mutex::new(()),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn state(&self) -> TurnState {
        self.state.lock().await.get()
    }

    /// Run one turn to completion, never cancelling.
    pub async fn submit(&self, text: impl Into<String>) -> Result<String> {
        let (keep_alive, cancel) = tokio::sync::oneshot::channel();
        let _keep_alive = keep_alive;
        self.submit_with_cancel(text, cancel).await
    }

    /// Run one turn to completion, or stop early if `cancel` fires
    /// (spec.md §4.6 step 5).
    pub async fn submit_with_cancel(
        &self,
        text: impl Into<String>,
        mut cancel: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<String> {
        // Concurrent callers queue here in arrival order (Tokio's Mutex is
        // FIFO-fair under contention), realising "exactly one turn active
        // per agent at a time" without the caller needing its own queue.
        let _turn_guard = self.turn_lock.lock().await;

        {
            let mut state = self.state.lock().await;
            state.transition(TurnState::Running);
        }

        let existing = self.threads.list_events(&self.thread_id, None).await?;
        if existing.is_empty() {
            self.seed_system_prompt().await?;
        }

        self.threads
            .append_event(&self.thread_id, EventType::UserMessage, EventData::Text(text.into()))
            .await?;

        let mut attempt = 0u32;
        loop {
            match self.run_rounds(&mut cancel).await {
                Ok(final_text) => {
                    self.state.lock().await.transition(TurnState::Done);
                    return Ok(final_text);
                }
                Err(Error::Cancelled) => {
                    self.state.lock().await.transition(TurnState::Cancelled);
                    return Err(Error::Cancelled);
                }
                Err(Error::ProviderTransient(msg)) => {
                    attempt += 1;
                    if attempt > MAX_PROVIDER_RETRIES {
                        self.note(
                            format!("provider error, retries exhausted: {msg}"),
                            None,
                        )
                        .await?;
                        self.state.lock().await.transition(TurnState::Failed);
                        return Err(Error::ProviderFatal(msg));
                    }
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                Err(e) => {
                    self.note(format!("turn failed: {e}"), None).await?;
                    self.state.lock().await.transition(TurnState::Failed);
                    return Err(e);
                }
            }
        }
    }

    async fn seed_system_prompt(&self) -> Result<()> {
        let text = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(self.mode, &self.config));
        self.threads
            .append_event(&self.thread_id, EventType::SystemPrompt, EventData::Text(text))
            .await?;
        Ok(())
    }

    async fn note(&self, text: impl Into<String>, call_id: Option<String>) -> Result<()> {
        self.threads
            .append_event(
                &self.thread_id,
                EventType::LocalSystemMessage,
                EventData::LocalSystemMessage { text: text.into(), call_id },
            )
            .await?;
        Ok(())
    }

    async fn flush_text(&self, buf: &mut String) -> Result<Option<String>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let text = std::mem::take(buf);
        self.threads
            .append_event(&self.thread_id, EventType::AgentMessage, EventData::Text(text.clone()))
            .await?;
        Ok(Some(text))
    }

    fn available_tool_schemas(&self) -> Vec<lace_model::ToolSchema> {
        let enabled: std::collections::HashSet<&str> =
            self.config.tools.iter().map(|s| s.as_str()).collect();
        self.tools
            .schemas_for_mode(self.mode)
            .into_iter()
            .filter(|s| enabled.contains(s.name.as_str()))
            .map(|s| lace_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    /// Repeatedly call the provider until a round produces no tool calls
    /// (spec.md §4.6 step 4: re-feed the extended history and restart).
    async fn run_rounds(&self, cancel: &mut tokio::sync::oneshot::Receiver<()>) -> Result<String> {
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            if rounds > MAX_ROUNDS {
                return Err(Error::ProviderFatal(format!(
                    "exceeded {MAX_ROUNDS} provider round-trips in a single turn without completing"
                )));
            }
            match self.run_one_round(cancel).await? {
                RoundOutcome::Done(text) => return Ok(text),
                RoundOutcome::ContinueRounds => continue,
                RoundOutcome::Cancelled => return Err(Error::Cancelled),
            }
        }
    }

    async fn run_one_round(&self, cancel: &mut tokio::sync::oneshot::Receiver<()>) -> Result<RoundOutcome> {
        if !matches!(
            cancel.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Empty)
        ) {
            return Ok(RoundOutcome::Cancelled);
        }

        let events = self.threads.list_events(&self.thread_id, None).await?;
        let messages = build_provider_messages(&events, self.config.conversation_history);
        let req = CompletionRequest {
            messages,
            tools: self.available_tool_schemas(),
            stream: true,
            system_dynamic_suffix: None,
        };

        let mut stream = self
            .model
            .complete(req)
            .await
            .map_err(|e| Error::ProviderTransient(e.to_string()))?;

        let mut text_buf = String::new();
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
        let mut had_tool_calls = false;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut *cancel => ChunkOutcome::Cancelled,
                timed = tokio::time::timeout(IDLE_TIMEOUT, stream.next()) => match timed {
                    Err(_) => ChunkOutcome::Timeout,
                    Ok(None) => ChunkOutcome::StreamClosed,
                    Ok(Some(Err(e))) => ChunkOutcome::Error(e.to_string()),
                    Ok(Some(Ok(event))) => ChunkOutcome::Event(event),
                },
            };

            match outcome {
                ChunkOutcome::Cancelled => {
                    self.flush_text(&mut text_buf).await?;
                    return Ok(RoundOutcome::Cancelled);
                }
                ChunkOutcome::Timeout => {
                    self.flush_text(&mut text_buf).await?;
                    return Err(Error::ProviderTransient("provider stream idle timeout".into()));
                }
                ChunkOutcome::Error(msg) => {
                    self.flush_text(&mut text_buf).await?;
                    return Err(Error::ProviderTransient(msg));
                }
                ChunkOutcome::StreamClosed => {
                    let text = self.flush_text(&mut text_buf).await?.unwrap_or_default();
                    return Ok(RoundOutcome::Done(text));
                }
                ChunkOutcome::Event(event) => match event {
                    ResponseEvent::TextDelta(delta) => text_buf.push_str(&delta),
                    // Reasoning traces aren't part of the persisted thread
                    // model (spec.md §3 names seven event types; thinking
                    // isn't one of them) so they're observed and dropped.
                    ResponseEvent::ThinkingDelta(_) => {}
                    ResponseEvent::ToolCallStart { index, id, name } => {
                        let ptc = pending.entry(index).or_insert_with(PendingToolCall::default);
                        if !id.is_empty() {
                            ptc.id = id;
                        }
                        if !name.is_empty() {
                            ptc.name = name;
                        }
                    }
                    ResponseEvent::ToolCallDelta { index, fragment } => {
                        pending
                            .entry(index)
                            .or_insert_with(PendingToolCall::default)
                            .args_buf
                            .push_str(&fragment);
                    }
                    ResponseEvent::ToolCallEnd { index } => {
                        let Some(ptc) = pending.remove(&index) else {
                            continue;
                        };
                        if ptc.name.is_empty() {
                            warn!("dropping tool call with empty name from model");
                            continue;
                        }

                        self.flush_text(&mut text_buf).await?;

                        let call_id = if ptc.id.is_empty() {
                            format!("tc_{}_{index}", self.thread_id)
                        } else {
                            ptc.id.clone()
                        };
                        let args: serde_json::Value = serde_json::from_str(&ptc.args_buf)
                            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));

                        self.state.lock().await.transition(TurnState::WaitingForTool);
                        self.threads
                            .append_event(
                                &self.thread_id,
                                EventType::ToolCall,
                                EventData::ToolCall {
                                    call_id: call_id.clone(),
                                    name: ptc.name.clone(),
                                    args: args.clone(),
                                },
                            )
                            .await?;

                        let tool_call = ToolCall { id: call_id.clone(), name: ptc.name.clone(), args };

                        let executed = tokio::select! {
                            biased;
                            _ = &mut *cancel => None,
                            out = self.tools.execute_checked(
                                &tool_call,
                                &self.config.tool_policies,
                                &self.broker,
                                &self.config.working_directory,
                                self.config.no_escape_cwd(),
                            ) => Some(out),
                        };

                        let output = match executed {
                            Some(out) => out,
                            None => {
                                self.note("tool call abandoned due to cancellation", Some(call_id))
                                    .await?;
                                return Ok(RoundOutcome::Cancelled);
                            }
                        };

                        self.state.lock().await.transition(TurnState::Appending);
                        self.threads
                            .append_event(
                                &self.thread_id,
                                EventType::ToolResult,
                                EventData::ToolResult {
                                    call_id,
                                    content: output.content,
                                    is_error: output.is_error,
                                    metadata: output.metadata,
                                },
                            )
                            .await?;
                        self.state.lock().await.transition(TurnState::Running);
                        had_tool_calls = true;
                    }
                    ResponseEvent::End(_usage) => {
                        let text = self.flush_text(&mut text_buf).await?.unwrap_or_default();
                        return if had_tool_calls {
                            Ok(RoundOutcome::ContinueRounds)
                        } else {
                            Ok(RoundOutcome::Done(text))
                        };
                    }
                    ResponseEvent::Error(msg) => {
                        warn!("provider emitted a recoverable stream warning: {msg}");
                    }
                },
            }
        }
    }
}

fn event_kind(event_type: EventType) -> MessageKind {
    match event_type {
        EventType::SystemPrompt => MessageKind::SystemPrompt,
        EventType::UserSystemPrompt => MessageKind::UserSystemPrompt,
        EventType::ToolCall => MessageKind::ToolCall,
        EventType::ToolResult => MessageKind::ToolResult,
        EventType::UserMessage | EventType::AgentMessage | EventType::LocalSystemMessage => {
            MessageKind::Other
        }
    }
}

fn event_tool_call_id(event: &Event) -> Option<String> {
    match &event.data {
        EventData::ToolCall { call_id, .. } | EventData::ToolResult { call_id, .. } => {
            Some(call_id.clone())
        }
        _ => None,
    }
}

fn event_to_message(event: &Event) -> Option<Message> {
    match (&event.event_type, &event.data) {
        (EventType::UserMessage, EventData::Text(t)) => Some(Message::user(t)),
        (EventType::AgentMessage, EventData::Text(t)) => Some(Message::assistant(t)),
        (EventType::SystemPrompt, EventData::Text(t)) => Some(Message::system(t)),
        (EventType::UserSystemPrompt, EventData::Text(t)) => Some(Message::system(t)),
        (EventType::ToolCall, EventData::ToolCall { call_id, name, args }) => Some(Message {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: call_id.clone(),
                function: FunctionCall { name: name.clone(), arguments: args.to_string() },
            },
        }),
        (EventType::ToolResult, EventData::ToolResult { call_id, content, .. }) => {
            Some(Message::tool_result(call_id, content))
        }
        (EventType::LocalSystemMessage, EventData::LocalSystemMessage { text, .. }) => {
            Some(Message::user(format!("[system] {text}")))
        }
        _ => None,
    }
}

/// Translate a thread's persisted events into the provider-facing message
/// list, applying the conversation window policy (spec.md §4.8) once per
/// turn rather than once per chunk.
fn build_provider_messages(events: &[Event], keep: usize) -> Vec<Message> {
    let windowed: Vec<WindowedMessage<Event>> = events
        .iter()
        .map(|e| WindowedMessage {
            payload: e.clone(),
            kind: event_kind(e.event_type),
            tool_call_id: event_tool_call_id(e),
        })
        .collect();

    conversation_window(&windowed, keep)
        .into_iter()
        .filter_map(|w| event_to_message(&w.payload))
        .collect()
}
