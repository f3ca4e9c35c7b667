pub mod approval;
pub mod diff;
pub mod error_handling;
pub mod paths;
pub mod project;
pub mod prompts;
pub mod provider_registration;
pub mod session;
pub mod tool_definitions;
pub mod tool_dispatch;
pub mod tools;
pub mod ui_writer;

pub use approval::{ApprovalDecision, ApprovalRequest, AutoApprove, AutoDeny, ToolApprover};
pub use diff::{DiffLine, DiffLineKind, FileDiff};
pub use project::ProjectContext;
pub use session::{MemoryStore, Session};
pub use tools::{ToolName, ToolOutcome};
pub use ui_writer::{NullUiWriter, UiWriter};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tern_computer_control::visual_intent::references_visual_state;
use tern_computer_control::{create_controller, CaptureTarget, ComputerController, ControllerSettings};
use tern_config::Config;
use tern_providers::{
    CompletionRequest, ContentBlock, Message, MessageRole, ProviderRegistry, StopReason, Tool, ToolCall, Usage,
};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error_handling::{classify_error, retry_delay_for, truncate_for_logging, ErrorType};
use crate::tool_definitions::{create_tool_definitions, ToolConfig};
use crate::tools::ToolContext;

/// Result text recorded for tool requests left unexecuted at the iteration cap.
const ITERATION_LIMIT_RESULT: &str = "Not executed: iteration limit reached";

/// Why a turn ended without a final answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// The endpoint could not be reached or rejected the request.
    #[error("{0}\nCheck the network connection and API key, then send the message again.")]
    Transport(String),
    /// Still rate limited after every retry.
    #[error("{0}\nQuota still exhausted after retrying; wait a while before trying again.")]
    Quota(String),
    #[error("Stopped after {0} model calls without a final answer (iteration limit). Ask to continue or raise agent.max_iterations.")]
    IterationLimit(usize),
    #[error("Cancelled")]
    Cancelled,
}

/// Where the agent loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    AwaitingModel,
    ToolUse,
    ExecutingTools,
    Done,
    Error,
}

/// One assistant response, assembled from a stream or a single completion.
struct ModelTurn {
    content: Vec<ContentBlock>,
    stop_reason: StopReason,
    usage: Usage,
}

pub struct Agent<W: UiWriter> {
    providers: ProviderRegistry,
    config: Config,
    ui_writer: W,
    working_dir: PathBuf,
    session: Session,
    memory: Option<MemoryStore>,
    approver: Arc<dyn ToolApprover>,
    controller: Option<Arc<dyn ComputerController>>,
    project: ProjectContext,
    usage: Usage,
    state: AgentState,
}

impl<W: UiWriter> Agent<W> {
    /// Build an agent talking to the configured endpoint.
    ///
    /// Session memory for `working_dir` is hydrated from `~/.tern/memory`, and
    /// an automation backend is probed when computer control is enabled.
    pub fn new(config: Config, ui_writer: W, working_dir: PathBuf) -> Result<Self> {
        let providers = provider_registration::register_providers(&config)?;
        let working_dir = working_dir.canonicalize().unwrap_or(working_dir);
        let memory = MemoryStore::default_location(config.agent.history_limit);
        let mut agent = Self::with_providers(config, ui_writer, working_dir, providers).with_memory_store(memory);
        agent.refresh_controller();
        Ok(agent)
    }

    /// Build an agent around an existing registry, without persistence or
    /// desktop automation.
    pub fn with_providers(config: Config, ui_writer: W, working_dir: PathBuf, providers: ProviderRegistry) -> Self {
        let project = ProjectContext::analyze(&working_dir);
        let session = Session::new(&working_dir, &config.provider.model);
        Self {
            providers,
            config,
            ui_writer,
            working_dir,
            session,
            memory: None,
            approver: Arc::new(AutoDeny),
            controller: None,
            project,
            usage: Usage::default(),
            state: AgentState::Idle,
        }
    }

    /// Persist to `store`, replacing the in-memory session with the stored one.
    pub fn with_memory_store(mut self, store: MemoryStore) -> Self {
        self.session = store.load_or_new(&self.working_dir, self.model());
        self.memory = Some(store);
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ToolApprover>) -> Self {
        self.approver = approver;
        self
    }

    pub fn with_controller(mut self, controller: Arc<dyn ComputerController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Create or drop the automation backend to match the configuration.
    fn refresh_controller(&mut self) {
        let settings = &self.config.computer_control;
        if !settings.enabled {
            self.controller = None;
        } else if self.controller.is_none() {
            let controller = create_controller(ControllerSettings {
                command_timeout: std::time::Duration::from_secs(settings.command_timeout_seconds),
                max_screenshot_width: settings.max_screenshot_width,
            });
            info!(
                "Computer control backend: {} ({})",
                controller.backend_name(),
                controller.capabilities()
            );
            self.controller = Some(controller);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ui_writer(&self) -> &W {
        &self.ui_writer
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn project_context(&self) -> &ProjectContext {
        &self.project
    }

    pub fn controller(&self) -> Option<&Arc<dyn ComputerController>> {
        self.controller.as_ref()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn provider_name(&self) -> &str {
        self.providers.get(None).map(|p| p.name()).unwrap_or("none")
    }

    pub fn model(&self) -> &str {
        self.providers
            .get(None)
            .map(|p| p.model())
            .unwrap_or(self.config.provider.model.as_str())
    }

    /// Switch the model for subsequent requests.
    pub fn set_model(&mut self, model: &str) -> Result<()> {
        let model = model.trim();
        if model.is_empty() {
            anyhow::bail!("Model name must not be empty");
        }
        self.providers.get_mut(None)?.set_model(model);
        self.config.provider.model = model.to_string();
        self.session.selected_model = model.to_string();
        info!("Switched model to {}", model);
        Ok(())
    }

    /// Update one configuration value and apply it to the running agent.
    pub fn set_config_value(&mut self, key: &str, value: &str) -> Result<()> {
        let previous_model = self.config.provider.model.clone();
        self.config.set_value(key, value)?;
        if self.config.provider.model != previous_model {
            let model = self.config.provider.model.clone();
            self.set_model(&model)?;
        }
        if let Some(memory) = self.memory.as_mut() {
            memory.set_limit(self.config.agent.history_limit);
        }
        self.refresh_controller();
        Ok(())
    }

    /// The last `n` turns, oldest first.
    pub fn history_tail(&self, n: usize) -> &[Message] {
        self.session.tail(n)
    }

    /// Forget the conversation and persist the empty session.
    pub fn clear_history(&mut self) -> Result<()> {
        self.session.clear();
        self.state = AgentState::Idle;
        if let Some(memory) = &self.memory {
            memory.save(&self.session)?;
        }
        Ok(())
    }

    /// Run one tool directly on the operator's behalf, without approval.
    pub async fn execute_tool(
        &self,
        name: &str,
        input: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let ctx = self.tool_context(cancel);
        tool_dispatch::dispatch_tool(name, input, &ctx).await
    }

    fn tool_context<'a>(&'a self, cancel: &'a CancellationToken) -> ToolContext<'a, W> {
        ToolContext {
            working_dir: &self.working_dir,
            config: &self.config.agent,
            ui_writer: &self.ui_writer,
            controller: self.controller.as_ref(),
            cancel,
        }
    }

    pub async fn converse(&mut self, text: &str) -> Result<String, AgentError> {
        self.converse_cancellable(text, CancellationToken::new()).await
    }

    pub async fn converse_cancellable(&mut self, text: &str, cancel: CancellationToken) -> Result<String, AgentError> {
        self.converse_with_attachments(text, Vec::new(), cancel).await
    }

    /// Send an operator turn with extra content blocks (such as a screenshot)
    /// and run the tool-use loop to completion.
    pub async fn converse_with_attachments(
        &mut self,
        text: &str,
        attachments: Vec<ContentBlock>,
        cancel: CancellationToken,
    ) -> Result<String, AgentError> {
        debug!("New operator turn: {}", truncate_for_logging(text, 200));

        let mut content = vec![ContentBlock::text(text)];
        if attachments.is_empty() {
            if let Some(capture) = self.capture_for_request(text).await {
                content.push(capture);
            }
        } else {
            content.extend(attachments);
        }
        self.session.push(Message::new(MessageRole::User, content));

        let result = self.run_loop(&cancel).await;
        self.state = match &result {
            Ok(_) => AgentState::Done,
            Err(AgentError::Cancelled) => AgentState::Idle,
            Err(_) => AgentState::Error,
        };
        debug!("Turn finished in state {:?}", self.state);
        self.persist();
        result
    }

    fn persist(&self) {
        if let Some(memory) = &self.memory {
            if let Err(e) = memory.save(&self.session) {
                warn!("Failed to persist session memory: {:#}", e);
                self.ui_writer
                    .print_status(&format!("Warning: could not save session memory: {}", e));
            }
        }
    }

    /// Attach a screenshot when the request is about what is on screen.
    async fn capture_for_request(&self, text: &str) -> Option<ContentBlock> {
        let controller = self.controller.as_ref()?;
        if !self.config.computer_control.auto_capture
            || !controller.capabilities().screenshot
            || !references_visual_state(text)
        {
            return None;
        }
        match controller.take_screenshot(CaptureTarget::FullScreen).await {
            Ok(shot) => {
                debug!("Auto-captured {}x{} screenshot", shot.width, shot.height);
                self.ui_writer
                    .print_status(&format!("Attached a {}x{} screenshot", shot.width, shot.height));
                Some(ContentBlock::image(&shot.media_type, shot.base64))
            }
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                self.ui_writer
                    .print_status(&format!("Could not capture the screen: {}", e));
                None
            }
        }
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<String, AgentError> {
        let max_iterations = self.config.agent.max_iterations.max(1) as usize;
        let tools = create_tool_definitions(ToolConfig::new(self.controller.is_some()));
        let system = prompts::build_system_prompt(&self.working_dir, &self.project, self.controller.is_some());

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            self.state = AgentState::AwaitingModel;
            debug!("Model call {}/{}", iteration, max_iterations);
            let turn = self.call_model(&system, &tools, cancel).await?;
            self.usage.add(&turn.usage);

            let assistant = Message::new(MessageRole::Assistant, turn.content);
            let calls = assistant.tool_calls();
            let text = assistant.text();
            if !assistant.content.is_empty() {
                self.session.push(assistant);
            }

            if calls.is_empty() {
                if turn.stop_reason == StopReason::MaxTokens {
                    self.ui_writer
                        .print_status("Response was cut off at the max_tokens limit.");
                }
                return Ok(text);
            }

            self.state = AgentState::ToolUse;
            if iteration == max_iterations {
                warn!("Iteration limit of {} reached with {} tool calls pending", max_iterations, calls.len());
                let results = calls
                    .iter()
                    .map(|call| ContentBlock::tool_result(&call.id, ITERATION_LIMIT_RESULT, true))
                    .collect();
                self.session.push(Message::new(MessageRole::User, results));
                return Err(AgentError::IterationLimit(max_iterations));
            }

            self.state = AgentState::ExecutingTools;
            let mut content = self.execute_tool_calls(&calls, cancel).await;
            let cancelled = cancel.is_cancelled();
            if cancelled {
                // Attachments from a cancelled batch are not worth sending
                content.retain(|b| matches!(b, ContentBlock::ToolResult { .. }));
            }
            self.session.push(Message::new(MessageRole::User, content));
            if cancelled {
                return Err(AgentError::Cancelled);
            }
        }

        Err(AgentError::IterationLimit(max_iterations))
    }

    /// Run every requested tool in order. Returns one result per call, in
    /// request order, followed by any attachments the tools produced.
    async fn execute_tool_calls(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(calls.len());
        let mut attachments = Vec::new();

        for call in calls {
            if cancel.is_cancelled() {
                results.push(ContentBlock::tool_result(&call.id, "Cancelled by operator before running", true));
                continue;
            }

            self.ui_writer.print_tool_header(&call.name, Some(&call.input));
            let outcome = self.run_tool_call(call, cancel).await;
            self.ui_writer.print_tool_result(&call.name, &outcome);
            if let Some(diff) = outcome.diff.as_ref().filter(|d| !d.is_empty()) {
                self.ui_writer.print_diff(diff);
            }
            debug!(
                "Tool {} finished (error: {}): {}",
                call.name,
                outcome.is_error,
                truncate_for_logging(&outcome.output, 200)
            );

            results.push(ContentBlock::tool_result(&call.id, outcome.output, outcome.is_error));
            if let Some(attachment) = outcome.attachment {
                attachments.push(attachment);
            }
        }

        results.extend(attachments);
        results
    }

    async fn run_tool_call(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolOutcome {
        let tool = match tool_dispatch::check_call(&call.name, &call.input, self.controller.is_some()) {
            Ok(tool) => tool,
            Err(outcome) => return outcome,
        };

        if self.config.agent.confirm_side_effects && tools::is_side_effect(&call.name, &call.input) {
            let request = ApprovalRequest {
                tool_name: call.name.clone(),
                summary: approval::summarize_call(&call.name, &call.input),
                input: call.input.clone(),
            };
            let decision = tokio::select! {
                decision = self.approver.review(&request) => decision,
                _ = cancel.cancelled() => ApprovalDecision::Denied,
            };
            if decision == ApprovalDecision::Denied {
                debug!("{} call denied", call.name);
                return ToolOutcome::error("Tool call denied by operator");
            }
        }

        let ctx = self.tool_context(cancel);
        tool_dispatch::run_tool(tool, &call.input, &ctx).await
    }

    /// One model call, retrying quota rejections with backoff.
    async fn call_model(
        &self,
        system: &str,
        tools: &[Tool],
        cancel: &CancellationToken,
    ) -> Result<ModelTurn, AgentError> {
        let max_retries = self.config.agent.max_retry_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let request = CompletionRequest {
                system: system.to_string(),
                messages: self.session.request_messages(),
                tools: tools.to_vec(),
                max_tokens: Some(self.config.provider.max_tokens),
                temperature: self.config.provider.temperature,
                stream: self.config.agent.enable_streaming,
            };

            let result = tokio::select! {
                result = self.request_once(request) => result,
                _ = cancel.cancelled() => {
                    self.ui_writer.stop_thinking();
                    return Err(AgentError::Cancelled);
                }
            };

            let error = match result {
                Ok(turn) => return Ok(turn),
                Err(e) => e,
            };

            match classify_error(&error) {
                ErrorType::Recoverable(kind) if attempt <= max_retries => {
                    let delay = retry_delay_for(&kind, attempt);
                    warn!(
                        "Quota error (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        max_retries + 1,
                        delay,
                        error
                    );
                    self.ui_writer.print_status(&format!(
                        "Rate limited; retrying in {:.1}s ({}/{})",
                        delay.as_secs_f64(),
                        attempt,
                        max_retries
                    ));
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    }
                }
                ErrorType::Recoverable(_) => {
                    warn!("Giving up after {} attempts: {}", attempt, error);
                    return Err(AgentError::Quota(format!("{:#}", error)));
                }
                ErrorType::NonRecoverable => {
                    warn!("Model call failed: {:#}", error);
                    return Err(AgentError::Transport(format!("{:#}", error)));
                }
            }
        }
    }

    async fn request_once(&self, request: CompletionRequest) -> Result<ModelTurn> {
        let provider = self.providers.get(None)?;
        self.ui_writer.start_thinking();

        if !request.stream {
            let response = provider.complete(request).await;
            self.ui_writer.stop_thinking();
            let response = response?;
            let text = response.text();
            if !text.is_empty() {
                self.ui_writer.print_agent_response(&text);
                self.ui_writer.finish_agent_response();
            }
            return Ok(ModelTurn {
                content: response.content,
                stop_reason: response.stop_reason,
                usage: response.usage,
            });
        }

        let mut stream = match provider.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.ui_writer.stop_thinking();
                return Err(e);
            }
        };

        let mut content: Vec<ContentBlock> = Vec::new();
        let mut stop_reason = None;
        let mut usage = Usage::default();
        let mut thinking = true;
        let mut printed_text = false;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if thinking {
                        self.ui_writer.stop_thinking();
                    }
                    if printed_text {
                        self.ui_writer.finish_agent_response();
                    }
                    return Err(e);
                }
            };

            if !chunk.text.is_empty() {
                if thinking {
                    self.ui_writer.stop_thinking();
                    thinking = false;
                }
                self.ui_writer.print_agent_response(&chunk.text);
                printed_text = true;
                match content.last_mut() {
                    Some(ContentBlock::Text { text }) => text.push_str(&chunk.text),
                    _ => content.push(ContentBlock::text(chunk.text)),
                }
            }
            if let Some(call) = chunk.tool_call {
                content.push(call.into());
            }
            if let Some(chunk_usage) = chunk.usage {
                usage = chunk_usage;
            }
            if let Some(reason) = chunk.stop_reason {
                stop_reason = Some(reason);
            }
            if chunk.finished {
                break;
            }
        }

        if thinking {
            self.ui_writer.stop_thinking();
        }
        if printed_text {
            self.ui_writer.finish_agent_response();
        }

        let has_calls = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        let stop_reason = stop_reason.unwrap_or(if has_calls {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        });
        Ok(ModelTurn {
            content,
            stop_reason,
            usage,
        })
    }
}
