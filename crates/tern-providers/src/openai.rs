//! OpenAI chat-completions client.
//!
//! Also used for any compatible endpoint (self-hosted gateways, proxies)
//! reached through a custom `base_url`.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::streaming::{make_final_chunk, make_text_chunk, make_tool_chunk, SseDecoder};
use crate::{
    parse_retry_after, CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream,
    ContentBlock, LLMProvider, Message, MessageRole, ProviderError, StopReason, Tool, ToolCall,
    Usage,
};

#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    name: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        Self::new_with_name(
            "openai".to_string(),
            api_key,
            model,
            base_url,
            max_tokens,
            temperature,
        )
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tokens,
            temperature,
            name,
        })
    }

    fn create_request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(&request.system, &request.messages),
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = json!(temperature);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(convert_tools(&request.tools));
        }

        if stream {
            body["stream_options"] = json!({
                "include_usage": true,
            });
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await.map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("OpenAI API error {}: {}", status, error_text);
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
                if event.data == "[DONE]" {
                    debug!("Received stream completion marker");
                    for item in state.finish() {
                        let _ = tx.send(Ok(item)).await;
                    }
                    return;
                }
                if let Some(text) = state.handle_data(&event.data) {
                    if tx.send(Ok(make_text_chunk(text))).await.is_err() {
                        debug!("Receiver dropped, stopping stream");
                        return;
                    }
                }
            }
        }

        // Closed without [DONE]; buffered tool calls may be cut off, so none are released
        warn!("OpenAI stream closed before [DONE]");
        let _ = tx.send(Err(ProviderError::truncated_stream().into())).await;
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!(
            "Processing OpenAI completion request with {} messages",
            request.messages.len()
        );

        let body = self.create_request_body(&request, false);
        let response = self.post(&body).await?;
        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let completion = openai_response.into_completion(&self.model);
        debug!(
            "OpenAI completion successful: {} tokens generated",
            completion.usage.output_tokens
        );
        Ok(completion)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        debug!(
            "Processing OpenAI streaming request with {} messages",
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
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(16000)
    }
}

/// Map content-block turns onto chat messages.
///
/// Tool results become `role: tool` messages placed directly after the
/// assistant message that requested them.
fn convert_messages(system: &str, messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(json!({"role": "system", "content": system}));
    }

    for msg in messages {
        match msg.role {
            MessageRole::Assistant => {
                let text = msg.text();
                let tool_calls: Vec<serde_json::Value> = msg
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.input.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if text.is_empty() {
                    serde_json::Value::Null
                } else {
                    json!(text)
                };
                let mut value = json!({
                    "role": "assistant",
                    "content": content,
                });
                if !tool_calls.is_empty() {
                    value["tool_calls"] = json!(tool_calls);
                }
                out.push(value);
            }
            MessageRole::User => {
                let mut parts = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            let content = if *is_error {
                                format!("Error: {}", content)
                            } else {
                                content.clone()
                            };
                            out.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "content": content,
                            }));
                        }
                        ContentBlock::Text { text } if !text.is_empty() => {
                            parts.push(json!({"type": "text", "text": text}));
                        }
                        ContentBlock::Image { source } => {
                            parts.push(json!({
                                "type": "image_url",
                                "image_url": {
                                    "url": format!("data:{};base64,{}", source.media_type, source.data)
                                }
                            }));
                        }
                        _ => {}
                    }
                }
                if !parts.is_empty() {
                    out.push(json!({"role": "user", "content": parts}));
                }
            }
        }
    }
    out
}

fn convert_tools(tools: &[Tool]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

// Streaming tool call accumulator
#[derive(Debug, Default)]
struct OpenAIStreamingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl OpenAIStreamingToolCall {
    fn to_tool_call(&self) -> Option<ToolCall> {
        let id = self.id.as_ref()?;
        let name = self.name.as_ref()?;

        Some(ToolCall {
            id: id.clone(),
            name: name.clone(),
            input: parse_arguments(&self.arguments),
        })
    }
}

#[derive(Debug, Default)]
struct StreamState {
    tool_calls: Vec<OpenAIStreamingToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl StreamState {
    /// Returns any text delta carried by the event.
    fn handle_data(&mut self, data: &str) -> Option<String> {
        let chunk: OpenAIStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("Failed to parse stream chunk: {} - Data: {}", e, data);
                return None;
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let index = delta.index.unwrap_or(0);
                while self.tool_calls.len() <= index {
                    self.tool_calls.push(OpenAIStreamingToolCall::default());
                }
                let tool_call = &mut self.tool_calls[index];
                if let Some(id) = delta.id {
                    tool_call.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        tool_call.name = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        tool_call.arguments.push_str(&arguments);
                    }
                }
            }
        }

        (!text.is_empty()).then_some(text)
    }

    /// Tool calls are only released once the stream is over.
    fn finish(&mut self) -> Vec<CompletionChunk> {
        let calls: Vec<ToolCall> = self
            .tool_calls
            .drain(..)
            .filter_map(|tc| tc.to_tool_call())
            .collect();

        let stop_reason = if !calls.is_empty() {
            StopReason::ToolUse
        } else {
            self.finish_reason
                .as_deref()
                .map(StopReason::from_wire)
                .unwrap_or(StopReason::EndTurn)
        };

        let mut chunks: Vec<CompletionChunk> = calls.into_iter().map(make_tool_chunk).collect();
        chunks.push(make_final_chunk(stop_reason, self.usage));
        chunks
    }
}

// OpenAI API response structures
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    fn into_completion(self, model: &str) -> CompletionResponse {
        let mut content = Vec::new();
        let mut stop_reason = StopReason::EndTurn;

        if let Some(choice) = self.choices.into_iter().next() {
            if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
                content.push(ContentBlock::Text { text });
            }
            for call in choice.message.tool_calls.unwrap_or_default() {
                content.push(ContentBlock::ToolUse {
                    id: call.id,
                    name: call.function.name,
                    input: parse_arguments(&call.function.arguments),
                });
            }
            stop_reason = choice
                .finish_reason
                .as_deref()
                .map(StopReason::from_wire)
                .unwrap_or(StopReason::EndTurn);
        }

        // Some gateways report "stop" even when tool calls are present
        if content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })) {
            stop_reason = StopReason::ToolUse;
        }

        let usage = self
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        CompletionResponse {
            content,
            stop_reason,
            usage,
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// Streaming response structures
#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAIDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
