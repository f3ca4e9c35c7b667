//! Mock model provider for testing
//!
//! A configurable provider that simulates endpoint behaviour for integration
//! tests: scripted text, streamed chunks, tool-use requests and transport or
//! quota failures, returned in queue order. Every request is recorded.
//!
//! # Example
//!
//! ```rust,ignore
//! use tern_providers::mock::{MockProvider, MockResponse};
//!
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::tool_call("Bash", json!({"command": "ls"})),
//!     MockResponse::text("Done."),
//! ]);
//! ```
//!
//! The provider is `Clone` and clones share their queue and request log, so a
//! test can keep a handle after registering it with a `ProviderRegistry`.

use crate::{
    CompletionChunk, CompletionRequest, CompletionResponse, CompletionStream, ContentBlock,
    LLMProvider, ProviderError, StopReason, ToolCall, Usage,
};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Global counter for generating unique tool-use IDs
static TOOL_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_tool_id() -> String {
    format!("toolu_mock_{}", TOOL_CALL_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// A mock response that can be configured for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub chunks: Vec<MockChunk>,
    pub usage: Usage,
    /// When set, the request fails with this error instead
    pub error: Option<ProviderError>,
}

/// A single chunk in a mock streaming response
#[derive(Debug, Clone)]
pub struct MockChunk {
    pub text: String,
    pub tool_call: Option<ToolCall>,
    pub finished: bool,
    pub stop_reason: Option<StopReason>,
}

impl MockChunk {
    /// Create a content chunk (not finished)
    pub fn content(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tool_call: None,
            finished: false,
            stop_reason: None,
        }
    }

    /// Create a final chunk with stop reason
    pub fn finished(stop_reason: StopReason) -> Self {
        Self {
            text: String::new(),
            tool_call: None,
            finished: true,
            stop_reason: Some(stop_reason),
        }
    }

    /// Create a chunk with a complete tool call
    pub fn tool_call(name: &str, input: serde_json::Value) -> Self {
        Self {
            text: String::new(),
            tool_call: Some(ToolCall {
                id: next_tool_id(),
                name: name.to_string(),
                input,
            }),
            finished: false,
            stop_reason: None,
        }
    }
}

fn usage_for(text_len: usize) -> Usage {
    Usage {
        input_tokens: 100,
        output_tokens: (text_len / 4) as u32 + 1,
    }
}

impl MockResponse {
    /// Create a simple text-only response (single chunk + finish)
    pub fn text(content: &str) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(content),
                MockChunk::finished(StopReason::EndTurn),
            ],
            usage: usage_for(content.len()),
            error: None,
        }
    }

    /// Create a streaming text response with multiple chunks
    pub fn streaming(chunks: Vec<&str>) -> Self {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut mock_chunks: Vec<MockChunk> = chunks.into_iter().map(MockChunk::content).collect();
        mock_chunks.push(MockChunk::finished(StopReason::EndTurn));

        Self {
            chunks: mock_chunks,
            usage: usage_for(total),
            error: None,
        }
    }

    /// Create a response requesting a single tool
    pub fn tool_call(name: &str, input: serde_json::Value) -> Self {
        Self::tool_calls(vec![(name, input)])
    }

    /// Create a response requesting several tools in order
    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let mut chunks: Vec<MockChunk> = calls
            .into_iter()
            .map(|(name, input)| MockChunk::tool_call(name, input))
            .collect();
        chunks.push(MockChunk::finished(StopReason::ToolUse));
        Self {
            chunks,
            usage: usage_for(50),
            error: None,
        }
    }

    /// Create a response with text followed by a tool call
    pub fn text_then_tool(text: &str, name: &str, input: serde_json::Value) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(text),
                MockChunk::tool_call(name, input),
                MockChunk::finished(StopReason::ToolUse),
            ],
            usage: usage_for(text.len() + 50),
            error: None,
        }
    }

    /// Create a response that gets cut off by max_tokens
    pub fn truncated(content: &str) -> Self {
        Self {
            chunks: vec![
                MockChunk::content(content),
                MockChunk::finished(StopReason::MaxTokens),
            ],
            usage: usage_for(content.len()),
            error: None,
        }
    }

    /// The endpoint rejects the request with HTTP 429
    pub fn quota_error() -> Self {
        Self::failure(ProviderError::Quota {
            message: "rate limit exceeded".to_string(),
            retry_after: None,
        })
    }

    /// The endpoint fails with a server error
    pub fn transport_error(status: u16) -> Self {
        Self::failure(ProviderError::Transport {
            status: Some(status),
            message: "internal server error".to_string(),
        })
    }

    pub fn failure(error: ProviderError) -> Self {
        Self {
            chunks: Vec::new(),
            usage: Usage::default(),
            error: Some(error),
        }
    }

    /// Create a custom response with explicit chunks
    pub fn custom(chunks: Vec<MockChunk>, usage: Usage) -> Self {
        Self {
            chunks,
            usage,
            error: None,
        }
    }

    /// Builder: set custom usage
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Collapse the chunks into the content blocks a non-streaming call returns.
    fn into_completion(self, model: &str) -> CompletionResponse {
        let mut content: Vec<ContentBlock> = Vec::new();
        let mut stop_reason = StopReason::EndTurn;

        for chunk in self.chunks {
            if !chunk.text.is_empty() {
                match content.last_mut() {
                    Some(ContentBlock::Text { text }) => text.push_str(&chunk.text),
                    _ => content.push(ContentBlock::text(chunk.text)),
                }
            }
            if let Some(call) = chunk.tool_call {
                content.push(call.into());
            }
            if let Some(reason) = chunk.stop_reason {
                stop_reason = reason;
            }
        }

        CompletionResponse {
            content,
            stop_reason,
            usage: self.usage,
            model: model.to_string(),
        }
    }
}

/// A mock model provider for testing
///
/// The provider maintains a queue of responses that are returned in order.
/// It also tracks all requests made for verification in tests.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    max_tokens: u32,
    /// Queue of responses to return (FIFO)
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// All requests received (for verification)
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Default response when queue is empty
    default_response: Option<MockResponse>,
    /// Pause between streamed chunks
    chunk_delay: std::time::Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new mock provider with default settings
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            max_tokens: 4096,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
            chunk_delay: std::time::Duration::from_micros(100),
        }
    }

    /// Set the provider name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the model name
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the pause between streamed chunks
    pub fn with_chunk_delay(mut self, delay: std::time::Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Add a response to the queue
    pub fn with_response(self, response: MockResponse) -> Self {
        lock(&self.responses).push(response);
        self
    }

    /// Add multiple responses to the queue
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        lock(&self.responses).extend(responses);
        self
    }

    /// Set a default response when queue is empty
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Get all requests that were made to this provider
    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Get the number of requests made
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Clear recorded requests
    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }

    /// Get the next response from the queue (or default)
    fn next_response(&self) -> MockResponse {
        let mut responses = lock(&self.responses);
        if responses.is_empty() {
            self.default_response
                .clone()
                .unwrap_or_else(|| MockResponse::text("Mock response (no responses configured)"))
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        lock(&self.requests).push(request);

        let mut response = self.next_response();
        if let Some(error) = response.error.take() {
            return Err(error.into());
        }
        Ok(response.into_completion(&self.model))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        lock(&self.requests).push(request);

        let mut response = self.next_response();
        if let Some(error) = response.error.take() {
            return Err(error.into());
        }
        let usage = response.usage;
        let delay = self.chunk_delay;

        let (tx, rx) = mpsc::channel(32);
        let num_chunks = response.chunks.len();

        tokio::spawn(async move {
            for (i, chunk) in response.chunks.into_iter().enumerate() {
                let completion_chunk = CompletionChunk {
                    text: chunk.text,
                    tool_call: chunk.tool_call,
                    finished: chunk.finished,
                    stop_reason: chunk.stop_reason,
                    usage: if chunk.finished { Some(usage) } else { None },
                };

                if tx.send(Ok(completion_chunk)).await.is_err() {
                    // Receiver dropped, stop sending
                    break;
                }

                if i + 1 < num_chunks {
                    tokio::time::sleep(delay).await;
                }
            }
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
        self.max_tokens
    }
}

// ============================================================================
// Preset Scenarios for Common Test Cases
// ============================================================================

/// Preset scenarios for common testing patterns
pub mod scenarios {
    use super::*;

    /// Create a provider that returns a simple text response
    pub fn text_only_response(text: &str) -> MockProvider {
        MockProvider::new().with_response(MockResponse::text(text))
    }

    /// Create a provider for multi-turn conversation
    /// Each call returns the next response in sequence
    pub fn multi_turn(responses: Vec<&str>) -> MockProvider {
        let mock_responses: Vec<MockResponse> =
            responses.into_iter().map(MockResponse::text).collect();
        MockProvider::new().with_responses(mock_responses)
    }

    /// Create a provider that simulates tool execution flow:
    /// 1. First call: returns tool call
    /// 2. Second call: returns text response after tool result
    pub fn tool_then_response(
        tool: &str,
        input: serde_json::Value,
        final_response: &str,
    ) -> MockProvider {
        MockProvider::new().with_responses(vec![
            MockResponse::tool_call(tool, input),
            MockResponse::text(final_response),
        ])
    }

    /// A model that never stops asking for tools
    pub fn endless_tool_use(tool: &str, input: serde_json::Value) -> MockProvider {
        MockProvider::new().with_default_response(MockResponse::tool_call(tool, input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use tokio_stream::StreamExt;

    fn request(stream: bool) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
            stream,
        }
    }

    #[tokio::test]
    async fn test_mock_provider_text_response() {
        let provider = MockProvider::new().with_response(MockResponse::text("Hello, world!"));

        let response = provider.complete(request(false)).await.unwrap();
        assert_eq!(response.text(), "Hello, world!");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_streaming() {
        let provider =
            MockProvider::new().with_response(MockResponse::streaming(vec!["Hello, ", "world!"]));

        let mut stream = provider.stream(request(true)).await.unwrap();

        let mut content = String::new();
        let mut chunk_count = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            content.push_str(&chunk.text);
            chunk_count += 1;
        }

        assert_eq!(content, "Hello, world!");
        assert_eq!(chunk_count, 3); // 2 content chunks + 1 finish chunk
    }

    #[tokio::test]
    async fn test_mock_provider_multi_turn() {
        let provider = scenarios::multi_turn(vec!["First response", "Second response"]);

        let response1 = provider.complete(request(false)).await.unwrap();
        assert_eq!(response1.text(), "First response");

        let response2 = provider.complete(request(false)).await.unwrap();
        assert_eq!(response2.text(), "Second response");
    }

    #[tokio::test]
    async fn test_mock_provider_tool_call() {
        let provider = MockProvider::new().with_response(MockResponse::text_then_tool(
            "Listing.",
            "Bash",
            serde_json::json!({"command": "ls"}),
        ));

        let response = provider.complete(request(false)).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.content.len(), 2);
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "Bash");
        assert!(calls[0].id.starts_with("toolu_mock_"));
    }

    #[tokio::test]
    async fn test_mock_provider_errors() {
        let provider = MockProvider::new().with_responses(vec![
            MockResponse::quota_error(),
            MockResponse::transport_error(503),
        ]);

        let err = provider.complete(request(false)).await.unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().unwrap().is_retryable());

        let err = provider.stream(request(true)).await.unwrap_err();
        assert!(!err.downcast_ref::<ProviderError>().unwrap().is_retryable());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let provider = MockProvider::new().with_default_response(MockResponse::text("OK"));
        let handle = provider.clone();

        let mut req = request(false);
        req.messages.push(Message::user_text("Hello"));
        provider.complete(req).await.unwrap();

        assert_eq!(handle.request_count(), 1);
        assert_eq!(handle.get_requests()[0].messages[0].text(), "Hello");
    }

    #[test]
    fn test_set_model() {
        let mut provider = MockProvider::new().with_model("small");
        assert_eq!(provider.model(), "small");
        provider.set_model("large");
        assert_eq!(provider.model(), "large");
    }
}
