//! OS automation: pointer, keyboard, clipboard, screen capture and windows.
//!
//! Each platform backend drives host utilities (xdotool, cliclick,
//! PowerShell, ...) discovered once at startup. Missing utilities, missing
//! display sessions and permission failures surface as [`AutomationError`]
//! values, never panics.

pub mod capture;
pub mod keys;
pub mod platform;
pub mod probe;
pub mod runner;
pub mod types;
pub mod visual_intent;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub use keys::KeyChord;
pub use types::*;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AutomationError {
    #[error("automation unavailable: {0}")]
    Unavailable(String),

    #[error("{program} failed{}: {detail}", .status.map(|s| format!(" (exit {})", s)).unwrap_or_default())]
    CommandFailed {
        program: String,
        status: Option<i32>,
        detail: String,
    },

    #[error("{program} did not finish within {seconds}s and was killed")]
    Timeout { program: String, seconds: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AutomationError {
    fn from(e: std::io::Error) -> Self {
        AutomationError::Io(e.to_string())
    }
}

pub type AutomationResult<T> = Result<T, AutomationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub command_timeout: Duration,
    pub max_screenshot_width: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            max_screenshot_width: 1568,
        }
    }
}

#[async_trait]
pub trait ComputerController: Send + Sync {
    /// Short description of the selected utilities, e.g. `x11 (xdotool, xclip)`.
    fn backend_name(&self) -> String;
    fn capabilities(&self) -> AutomationCapability;
    fn settings(&self) -> ControllerSettings;

    async fn move_pointer(&self, to: Point) -> AutomationResult<()>;
    /// Click at `at`, or at the current pointer position when `None`.
    async fn click(&self, at: Option<Point>, button: MouseButton, double: bool) -> AutomationResult<()>;
    async fn drag(&self, from: Point, to: Point) -> AutomationResult<()>;
    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> AutomationResult<()>;

    async fn type_text(&self, text: &str) -> AutomationResult<()>;
    async fn key_chord(&self, chord: &KeyChord) -> AutomationResult<()>;

    async fn clipboard_get(&self) -> AutomationResult<String>;
    async fn clipboard_set(&self, text: &str) -> AutomationResult<()>;

    async fn list_windows(&self) -> AutomationResult<Vec<WindowInfo>>;
    async fn focus_window(&self, query: &str) -> AutomationResult<WindowInfo>;

    /// Write a PNG capture of `target` to `path`.
    async fn capture_to(&self, path: &Path, target: &CaptureTarget) -> AutomationResult<()>;

    /// Capture into the scratch directory and encode for a model request.
    async fn take_screenshot(&self, target: CaptureTarget) -> AutomationResult<Screenshot> {
        if !self.capabilities().screenshot {
            return Err(AutomationError::Unavailable(
                "no screenshot utility found on this host".to_string(),
            ));
        }
        let path = capture::scratch_path()?;
        self.capture_to(&path, &target).await?;
        let shot = capture::encode_capture(&path, self.settings().max_screenshot_width)?;
        debug!("Captured {}x{} to {}", shot.width, shot.height, shot.path.display());
        Ok(shot)
    }
}

/// Returned when automation is disabled or the platform is unsupported.
pub struct UnavailableController {
    reason: String,
    settings: ControllerSettings,
}

impl UnavailableController {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            settings: ControllerSettings::default(),
        }
    }

    fn fail<T>(&self) -> AutomationResult<T> {
        Err(AutomationError::Unavailable(self.reason.clone()))
    }
}

#[async_trait]
impl ComputerController for UnavailableController {
    fn backend_name(&self) -> String {
        format!("none ({})", self.reason)
    }

    fn capabilities(&self) -> AutomationCapability {
        AutomationCapability::default()
    }

    fn settings(&self) -> ControllerSettings {
        self.settings
    }

    async fn move_pointer(&self, _to: Point) -> AutomationResult<()> {
        self.fail()
    }

    async fn click(&self, _at: Option<Point>, _button: MouseButton, _double: bool) -> AutomationResult<()> {
        self.fail()
    }

    async fn drag(&self, _from: Point, _to: Point) -> AutomationResult<()> {
        self.fail()
    }

    async fn scroll(&self, _direction: ScrollDirection, _amount: u32) -> AutomationResult<()> {
        self.fail()
    }

    async fn type_text(&self, _text: &str) -> AutomationResult<()> {
        self.fail()
    }

    async fn key_chord(&self, _chord: &KeyChord) -> AutomationResult<()> {
        self.fail()
    }

    async fn clipboard_get(&self) -> AutomationResult<String> {
        self.fail()
    }

    async fn clipboard_set(&self, _text: &str) -> AutomationResult<()> {
        self.fail()
    }

    async fn list_windows(&self) -> AutomationResult<Vec<WindowInfo>> {
        self.fail()
    }

    async fn focus_window(&self, _query: &str) -> AutomationResult<WindowInfo> {
        self.fail()
    }

    async fn capture_to(&self, _path: &Path, _target: &CaptureTarget) -> AutomationResult<()> {
        self.fail()
    }
}

// Platform-specific constructor, probed once
pub fn create_controller(settings: ControllerSettings) -> Arc<dyn ComputerController> {
    let host = probe::SystemHost;
    let runner: Arc<dyn runner::ProgramRunner> =
        Arc::new(runner::ProcessRunner::new(settings.command_timeout));

    #[cfg(target_os = "macos")]
    let controller: Arc<dyn ComputerController> =
        Arc::new(platform::macos::MacOSController::probe(&host, runner, settings));

    #[cfg(target_os = "linux")]
    let controller: Arc<dyn ComputerController> =
        Arc::new(platform::linux::LinuxController::probe(&host, runner, settings));

    #[cfg(target_os = "windows")]
    let controller: Arc<dyn ComputerController> =
        Arc::new(platform::windows::WindowsController::probe(&host, runner, settings));

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let controller: Arc<dyn ComputerController> = {
        let _ = (&host, runner, settings);
        Arc::new(UnavailableController::new("unsupported platform"))
    };

    info!(
        "Automation backend: {} [{}]",
        controller.backend_name(),
        controller.capabilities()
    );
    controller
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_controller_fails_every_operation() {
        let controller = UnavailableController::new("disabled in configuration");
        assert!(!controller.capabilities().any());
        assert!(matches!(
            controller.click(None, MouseButton::Left, false).await,
            Err(AutomationError::Unavailable(_))
        ));
        assert!(matches!(
            controller.take_screenshot(CaptureTarget::FullScreen).await,
            Err(AutomationError::Unavailable(_))
        ));
        assert!(controller.backend_name().contains("disabled"));
    }

    #[test]
    fn test_error_messages() {
        let err = AutomationError::CommandFailed {
            program: "xdotool".to_string(),
            status: Some(1),
            detail: "Can't open display".to_string(),
        };
        assert_eq!(err.to_string(), "xdotool failed (exit 1): Can't open display");

        let err = AutomationError::Timeout {
            program: "scrot".to_string(),
            seconds: 10,
        };
        assert!(err.to_string().contains("killed"));
    }
}
