pub mod linux;
pub mod macos;
pub mod windows;

use crate::runner::{Invocation, ProgramRunner};
use crate::{AutomationError, AutomationResult, WindowInfo};

/// Longest scroll accepted in one call, in wheel notches.
pub const MAX_SCROLL: u32 = 50;

pub(crate) fn check_scroll_amount(amount: u32) -> AutomationResult<u32> {
    match amount {
        0 => Err(AutomationError::InvalidArgument(
            "scroll amount must be at least 1".to_string(),
        )),
        n => Ok(n.min(MAX_SCROLL)),
    }
}

/// Run invocations in order, stopping at the first failure.
pub(crate) async fn run_all(
    runner: &dyn ProgramRunner,
    invocations: &[Invocation],
) -> AutomationResult<String> {
    let mut last = String::new();
    for invocation in invocations {
        last = runner.run(invocation).await?;
    }
    Ok(last)
}

/// Exact title match first, then the first partial title or app match.
pub(crate) fn select_window(windows: Vec<WindowInfo>, query: &str) -> AutomationResult<WindowInfo> {
    let query_trimmed = query.trim();
    if query_trimmed.is_empty() {
        return Err(AutomationError::InvalidArgument(
            "window title must not be empty".to_string(),
        ));
    }
    if let Some(exact) = windows
        .iter()
        .find(|w| w.title.eq_ignore_ascii_case(query_trimmed))
    {
        return Ok(exact.clone());
    }
    windows
        .into_iter()
        .find(|w| w.matches(query_trimmed))
        .ok_or_else(|| {
            AutomationError::InvalidArgument(format!(
                "no window matches '{}'; list windows to see what is open",
                query_trimmed
            ))
        })
}
