// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation window policy.
//!
//! `lace-core` hands this a flat, chronological list of a thread's
//! messages and asks for the subset that should be sent to the
//! provider: the last `conversation_history` entries, plus every tool
//! call/result pair that falls inside that window, while the system
//! prompt and any user system prompt are always retained regardless of
//! where they fall in history.

/// A single conversation entry, abstracted just enough for window
/// selection: callers map their own message/event type into this and
/// back.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedMessage<T> {
    pub payload: T,
    pub kind: MessageKind,
    /// Present on tool-call and tool-result entries; used to keep a
    /// call/result pair together even when the call falls just outside
    /// the naive tail window.
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SystemPrompt,
    UserSystemPrompt,
    ToolCall,
    ToolResult,
    Other,
}

/// Select the messages that should be included in the provider request.
///
/// Always-retained: every [`MessageKind::SystemPrompt`] and
/// [`MessageKind::UserSystemPrompt`] entry, wherever it sits in
/// `history`. From the remainder, keep the last `keep` entries, then
/// extend that tail backwards to pull in the matching half of any
/// split tool call/result pair (a `ToolResult` at the very start of the
/// tail whose `ToolCall` fell just before it, or vice versa).
pub fn conversation_window<T: Clone>(
    history: &[WindowedMessage<T>],
    keep: usize,
) -> Vec<WindowedMessage<T>> {
    let system: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m.kind, MessageKind::SystemPrompt | MessageKind::UserSystemPrompt))
        .map(|(i, _)| i)
        .collect();

    let non_system: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| !matches!(m.kind, MessageKind::SystemPrompt | MessageKind::UserSystemPrompt))
        .map(|(i, _)| i)
        .collect();

    let tail_start = non_system.len().saturating_sub(keep);
    let mut tail: Vec<usize> = non_system[tail_start..].to_vec();

    // Extend backwards across the boundary to keep split call/result
    // pairs whole: if the first kept entry is a ToolResult, pull in its
    // ToolCall even if that call landed in the truncated prefix.
    if let Some(&first) = tail.first() {
        if history[first].kind == MessageKind::ToolResult {
            if let Some(call_id) = &history[first].tool_call_id {
                if let Some(pos) = non_system[..tail_start].iter().rev().find(|&&i| {
                    history[i].kind == MessageKind::ToolCall
                        && history[i].tool_call_id.as_deref() == Some(call_id.as_str())
                }) {
                    tail.insert(0, *pos);
                }
            }
        }
    }

    let mut kept_indices: Vec<usize> = system.into_iter().chain(tail).collect();
    kept_indices.sort_unstable();
    kept_indices.dedup();

    kept_indices.into_iter().map(|i| history[i].clone()).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
