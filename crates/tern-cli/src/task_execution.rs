//! Running one exchange with Ctrl-C cancellation.

use tern_core::ui_writer::UiWriter;
use tern_core::{Agent, AgentError, ToolOutcome};
use tern_providers::ContentBlock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::display::{print_dim, print_error};

/// Send `input` to the agent and run the exchange to completion.
///
/// Ctrl-C while the exchange runs cancels the model call or the running tool;
/// the session stays usable afterwards.
pub async fn execute_turn<W: UiWriter>(
    agent: &mut Agent<W>,
    input: &str,
    attachments: Vec<ContentBlock>,
) -> Result<String, AgentError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = agent
        .converse_with_attachments(input, attachments, cancel)
        .await;
    watcher.abort();

    match &result {
        Ok(_) => {
            let usage = agent.usage();
            debug!(
                "Exchange complete; session usage {} in / {} out",
                usage.input_tokens, usage.output_tokens
            );
        }
        Err(e) => report_error(e),
    }
    agent.ui_writer().flush();
    result
}

/// Run one tool on the operator's behalf; Ctrl-C stops it.
pub async fn execute_tool_interruptible<W: UiWriter>(
    agent: &Agent<W>,
    name: &str,
    input: &serde_json::Value,
) -> ToolOutcome {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let outcome = agent.execute_tool(name, input, &cancel).await;
    watcher.abort();
    outcome
}

fn report_error(e: &AgentError) {
    match e {
        AgentError::Cancelled => print_dim("Cancelled."),
        other => {
            debug!("Exchange failed: {:?}", other);
            print_error(&other.to_string());
        }
    }
}
