//! Anthropic Messages API client.
//!
//! Conversation content blocks already use the Messages API shape, so request
//! bodies are built by serializing them directly. Streaming follows the
//! `message_start` / `content_block_*` / `message_delta` / `message_stop`
//! event sequence; `input_json_delta` fragments are accumulated per block and
//! a tool call is only emitted at the block's `content_block_stop`.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::streaming::{make_final_chunk, make_text_chunk, make_tool_chunk, SseDecoder};
use crate::{
    parse_retry_after, CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream,
    ContentBlock, LLMProvider, Message, ProviderError, StopReason, ToolCall, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Anthropic API key is empty; set provider.api_key or ANTHROPIC_API_KEY");
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "claude-sonnet-4-5".to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tokens: max_tokens.unwrap_or(8192),
            temperature,
        })
    }

    fn create_request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": convert_messages(&request.messages),
            "stream": stream,
        });

        if !request.system.is_empty() {
            body["system"] = json!(request.system);
        }

        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error {}: {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), &error_text, retry_after).into());
        }

        Ok(response)
    }

    async fn parse_streaming_response(
        mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
        tx: mpsc::Sender<Result<CompletionChunk>>,
    ) {
        let mut decoder = SseDecoder::new();
        let mut state = StreamState::default();

        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Stream error: {}", e);
                    let _ = tx.send(Err(ProviderError::from_reqwest(e).into())).await;
                    return;
                }
            };

            for event in decoder.push(&chunk) {
                for item in state.handle_event(&event.data) {
                    let done = matches!(&item, Ok(c) if c.finished) || item.is_err();
                    if tx.send(item).await.is_err() {
                        debug!("Receiver dropped, stopping stream");
                        return;
                    }
                    if done {
                        return;
                    }
                }
            }
        }

        if let Some(event) = decoder.finish() {
            for item in state.handle_event(&event.data) {
                let done = matches!(&item, Ok(c) if c.finished) || item.is_err();
                let _ = tx.send(item).await;
                if done {
                    return;
                }
            }
        }

        // Closed without message_stop; partial text and open tool blocks are not a reply
        warn!("Anthropic stream closed before message_stop");
        let _ = tx.send(Err(ProviderError::truncated_stream().into())).await;
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!(
            "Processing Anthropic completion request with {} messages",
            request.messages.len()
        );

        let body = self.create_request_body(&request, false);
        let response = self.post(&body).await?;
        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let response = api_response.into_completion();
        debug!(
            "Anthropic completion finished: stop_reason={:?}, {} output tokens",
            response.stop_reason, response.usage.output_tokens
        );
        Ok(response)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        debug!(
            "Processing Anthropic streaming request with {} messages",
            request.messages.len()
        );

        let body = self.create_request_body(&request, true);
        let response = self.post(&body).await?;

        let stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            Self::parse_streaming_response(stream, tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Drop empty text blocks and empty turns, which the endpoint rejects.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .filter_map(|msg| {
            let content: Vec<&ContentBlock> = msg
                .content
                .iter()
                .filter(|block| !matches!(block, ContentBlock::Text { text } if text.trim().is_empty()))
                .collect();
            if content.is_empty() {
                return None;
            }
            Some(json!({
                "role": msg.role,
                "content": content,
            }))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream state machine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PartialToolUse {
    id: String,
    name: String,
    json: String,
}

/// Accumulates one streamed message.
#[derive(Debug, Default)]
struct StreamState {
    tool_blocks: HashMap<usize, PartialToolUse>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

impl StreamState {
    fn handle_event(&mut self, data: &str) -> Vec<Result<CompletionChunk>> {
        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                debug!("Failed to parse stream event: {} - Data: {}", e, data);
                return Vec::new();
            }
        };

        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.input_tokens = usage.input_tokens;
                    self.usage.output_tokens = usage.output_tokens;
                }
                Vec::new()
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StartBlock::Text { text } if !text.is_empty() => vec![Ok(make_text_chunk(text))],
                StartBlock::ToolUse { id, name } => {
                    self.tool_blocks.insert(
                        index,
                        PartialToolUse {
                            id,
                            name,
                            json: String::new(),
                        },
                    );
                    Vec::new()
                }
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } => vec![Ok(make_text_chunk(text))],
                Delta::InputJsonDelta { partial_json } => {
                    if let Some(block) = self.tool_blocks.get_mut(&index) {
                        block.json.push_str(&partial_json);
                    }
                    Vec::new()
                }
                Delta::Other => Vec::new(),
            },
            StreamEvent::ContentBlockStop { index } => match self.tool_blocks.remove(&index) {
                Some(block) => vec![Ok(make_tool_chunk(block.into_tool_call()))],
                None => Vec::new(),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(StopReason::from_wire(&reason));
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                }
                Vec::new()
            }
            StreamEvent::MessageStop => vec![Ok(self.finish())],
            StreamEvent::Error { error } => {
                vec![Err(ProviderError::from_stream_error(&error.error_type, &error.message).into())]
            }
            StreamEvent::Ping | StreamEvent::Unknown => Vec::new(),
        }
    }

    fn finish(&mut self) -> CompletionChunk {
        if !self.tool_blocks.is_empty() {
            warn!(
                "Discarding {} incomplete tool-use block(s) at end of stream",
                self.tool_blocks.len()
            );
            self.tool_blocks.clear();
        }
        make_final_chunk(
            self.stop_reason.clone().unwrap_or(StopReason::EndTurn),
            Some(self.usage),
        )
    }
}

impl PartialToolUse {
    fn into_tool_call(self) -> ToolCall {
        let input = if self.json.trim().is_empty() {
            json!({})
        } else {
            // Invalid JSON is handed on as a string so schema validation reports it
            serde_json::from_str(&self.json).unwrap_or(serde_json::Value::String(self.json))
        };
        ToolCall {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire structures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
    model: String,
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                ResponseBlock::Other => None,
            })
            .collect();

        CompletionResponse {
            content,
            stop_reason: self
                .stop_reason
                .as_deref()
                .map(StopReason::from_wire)
                .unwrap_or(StopReason::EndTurn),
            usage: Usage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
            model: self.model,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
