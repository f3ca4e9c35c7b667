use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::AutomationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(MouseButton::Left),
            "right" | "r" => Ok(MouseButton::Right),
            "middle" | "m" => Ok(MouseButton::Middle),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown mouse button '{}' (expected left, right or middle)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for ScrollDirection {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown scroll direction '{}' (expected up, down, left or right)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Backend-specific identifier (X11 window id, process name, pid).
    pub id: String,
    pub title: String,
    pub app_name: Option<String>,
    pub bounds: Option<Rect>,
}

impl WindowInfo {
    /// Case-insensitive match against the title or owning application.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self
                .app_name
                .as_ref()
                .is_some_and(|app| app.to_lowercase().contains(&query))
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.app_name {
            Some(app) if !app.is_empty() => write!(f, "[{}] {} - {}", self.id, app, self.title)?,
            _ => write!(f, "[{}] {}", self.id, self.title)?,
        }
        if let Some(b) = self.bounds {
            write!(f, " ({}x{} at {},{})", b.width, b.height, b.x, b.y)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    FullScreen,
    /// First window whose title or application matches.
    Window(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub path: PathBuf,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    /// Base64 payload, already scaled for inclusion in a model request.
    pub base64: String,
}

/// Which operation groups have a working backend on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutomationCapability {
    pub screenshot: bool,
    pub pointer: bool,
    pub keyboard: bool,
    pub clipboard: bool,
    pub windowing: bool,
}

impl AutomationCapability {
    pub fn any(&self) -> bool {
        self.screenshot || self.pointer || self.keyboard || self.clipboard || self.windowing
    }
}

impl fmt::Display for AutomationCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "screenshot: {}, pointer: {}, keyboard: {}, clipboard: {}, windowing: {}",
            mark(self.screenshot),
            mark(self.pointer),
            mark(self.keyboard),
            mark(self.clipboard),
            mark(self.windowing)
        )
    }
}
