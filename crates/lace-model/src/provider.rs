// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::{CompletionRequest, CompletionResponse, ResponseEvent, ToolCallRequest};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    args_buf: String,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Non-streaming completion: drains `complete`'s stream and coalesces
    /// the chunks into a single `{content, usage, toolCalls}` result.
    ///
    /// Tool calls are reassembled by their parallel-call `index`, the same
    /// way a streaming caller would accumulate `ToolCallStart`/`Delta`/`End`
    /// events. Providers with a native non-streaming endpoint may override
    /// this for efficiency; the default always goes through `complete`.
    async fn create_response(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let mut stream = self.complete(req).await?;
        let mut content = String::new();
        let mut usage = crate::Usage::default();
        let mut pending: HashMap<u32, PendingCall> = HashMap::new();
        let mut order: Vec<u32> = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => content.push_str(&delta),
                ResponseEvent::ThinkingDelta(_) => {}
                ResponseEvent::ToolCallStart { index, id, name } => {
                    if !pending.contains_key(&index) {
                        order.push(index);
                    }
                    let call = pending.entry(index).or_default();
                    call.id = id;
                    call.name = name;
                }
                ResponseEvent::ToolCallDelta { index, fragment } => {
                    pending.entry(index).or_default().args_buf.push_str(&fragment);
                }
                ResponseEvent::ToolCallEnd { .. } => {}
                ResponseEvent::End(final_usage) => usage = final_usage,
                ResponseEvent::Error(msg) => return Err(anyhow::anyhow!(msg)),
            }
        }

        let tool_calls = order
            .into_iter()
            .filter_map(|index| pending.remove(&index))
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.name,
                arguments: call.args_buf,
            })
            .collect();

        Ok(CompletionResponse { content, usage, tool_calls })
    }
}
