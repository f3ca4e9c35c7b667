use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{check_scroll_amount, run_all, select_window};
use crate::keys::applescript_escape;
use crate::probe::Host;
use crate::runner::{Invocation, ProgramRunner};
use crate::{
    AutomationCapability, AutomationError, AutomationResult, CaptureTarget, ComputerController,
    ControllerSettings, KeyChord, MouseButton, Point, Rect, ScrollDirection, WindowInfo,
};

/// Emits one `app<TAB>title<TAB>x,y,w,h` line per visible window.
const LIST_WINDOWS_SCRIPT: &str = r#"set out to ""
tell application "System Events"
    repeat with p in (every process whose visible is true)
        set appName to name of p
        repeat with w in (every window of p)
            try
                set {px, py} to position of w
                set {sw, sh} to size of w
                set out to out & appName & tab & (name of w) & tab & px & "," & py & "," & sw & "," & sh & linefeed
            end try
        end repeat
    end repeat
end tell
return out"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacBackends {
    pub screencapture: bool,
    pub cliclick: bool,
    pub osascript: bool,
    pub pasteboard: bool,
}

impl MacBackends {
    pub fn probe(host: &dyn Host) -> Self {
        Self {
            screencapture: host.has_program("screencapture"),
            cliclick: host.has_program("cliclick"),
            osascript: host.has_program("osascript"),
            pasteboard: host.has_program("pbcopy") && host.has_program("pbpaste"),
        }
    }
}

pub struct MacOSController {
    backends: MacBackends,
    runner: Arc<dyn ProgramRunner>,
    settings: ControllerSettings,
}

fn osascript(script: &str) -> Invocation {
    Invocation::new("osascript", ["-e", script])
}

fn cliclick_point(p: Point) -> String {
    format!("{},{}", p.x, p.y)
}

pub fn click_invocation(at: Option<Point>, button: MouseButton, double: bool) -> AutomationResult<Invocation> {
    let target = at.map(cliclick_point).unwrap_or_else(|| ".".to_string());
    let command = match (button, double) {
        (MouseButton::Left, false) => "c",
        (MouseButton::Left, true) => "dc",
        (MouseButton::Right, false) => "rc",
        (MouseButton::Right, true) => {
            return Err(AutomationError::InvalidArgument(
                "double right-click is not supported on macOS".to_string(),
            ))
        }
        (MouseButton::Middle, _) => {
            return Err(AutomationError::InvalidArgument(
                "middle click is not supported on macOS".to_string(),
            ))
        }
    };
    Ok(Invocation::new("cliclick", [format!("{}:{}", command, target)]))
}

/// Type text line by line, pressing Return between lines.
pub fn type_script(text: &str) -> String {
    let mut script = String::from("tell application \"System Events\"\n");
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            script.push_str("    key code 36\n");
        }
        if !line.is_empty() {
            script.push_str(&format!("    keystroke \"{}\"\n", applescript_escape(line)));
        }
    }
    script.push_str("end tell");
    script
}

pub fn parse_window_list(output: &str) -> Vec<WindowInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let app = parts.next()?.trim();
            let title = parts.next()?.trim();
            let bounds = parts.next().and_then(|geometry| {
                let nums: Vec<i32> = geometry
                    .split(',')
                    .filter_map(|n| n.trim().parse().ok())
                    .collect();
                match nums.as_slice() {
                    [x, y, width, height] => Some(Rect {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                    }),
                    _ => None,
                }
            });
            if app.is_empty() {
                return None;
            }
            Some(WindowInfo {
                id: app.to_string(),
                title: if title.is_empty() || title == "missing value" {
                    app.to_string()
                } else {
                    title.to_string()
                },
                app_name: Some(app.to_string()),
                bounds,
            })
        })
        .collect()
}

impl MacOSController {
    pub fn probe(host: &dyn Host, runner: Arc<dyn ProgramRunner>, settings: ControllerSettings) -> Self {
        let backends = MacBackends::probe(host);
        debug!("macOS automation backends: {:?}", backends);
        Self {
            backends,
            runner,
            settings,
        }
    }

    fn require(&self, available: bool, what: &str, hint: &str) -> AutomationResult<()> {
        if available {
            Ok(())
        } else {
            Err(AutomationError::Unavailable(format!("{} needs {}", what, hint)))
        }
    }

    fn pointer(&self) -> AutomationResult<()> {
        self.require(self.backends.cliclick, "pointer control", "cliclick (brew install cliclick)")
    }

    fn scripting(&self) -> AutomationResult<()> {
        self.require(self.backends.osascript, "keyboard and window control", "osascript")
    }

    async fn run(&self, invocations: &[Invocation]) -> AutomationResult<String> {
        run_all(self.runner.as_ref(), invocations).await.map_err(|e| match e {
            // System Events refuses without the accessibility grant
            AutomationError::CommandFailed { detail, program, .. }
                if detail.contains("not allowed") || detail.contains("-1743") || detail.contains("-25211") =>
            {
                AutomationError::Unavailable(format!(
                    "{} was denied accessibility permission; allow your terminal under System Settings > Privacy & Security > Accessibility",
                    program
                ))
            }
            other => other,
        })
    }
}

#[async_trait]
impl ComputerController for MacOSController {
    fn backend_name(&self) -> String {
        let mut tools = vec!["screencapture", "osascript"];
        if self.backends.cliclick {
            tools.push("cliclick");
        }
        format!("macos ({})", tools.join(", "))
    }

    fn capabilities(&self) -> AutomationCapability {
        AutomationCapability {
            screenshot: self.backends.screencapture,
            pointer: self.backends.cliclick,
            keyboard: self.backends.osascript,
            clipboard: self.backends.pasteboard,
            windowing: self.backends.osascript,
        }
    }

    fn settings(&self) -> ControllerSettings {
        self.settings
    }

    async fn move_pointer(&self, to: Point) -> AutomationResult<()> {
        self.pointer()?;
        self.run(&[Invocation::new("cliclick", [format!("m:{}", cliclick_point(to))])])
            .await
            .map(|_| ())
    }

    async fn click(&self, at: Option<Point>, button: MouseButton, double: bool) -> AutomationResult<()> {
        self.pointer()?;
        self.run(&[click_invocation(at, button, double)?]).await.map(|_| ())
    }

    async fn drag(&self, from: Point, to: Point) -> AutomationResult<()> {
        self.pointer()?;
        self.run(&[Invocation::new(
            "cliclick",
            [
                format!("dd:{}", cliclick_point(from)),
                format!("dm:{}", cliclick_point(to)),
                format!("du:{}", cliclick_point(to)),
            ],
        )])
        .await
        .map(|_| ())
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> AutomationResult<()> {
        self.scripting()?;
        let amount = check_scroll_amount(amount)?;
        // No wheel events without a helper binary; page keys are the closest fallback
        let key = match direction {
            ScrollDirection::Up => 116,
            ScrollDirection::Down => 121,
            ScrollDirection::Left | ScrollDirection::Right => {
                return Err(AutomationError::Unavailable(
                    "horizontal scrolling is not supported on macOS".to_string(),
                ))
            }
        };
        let presses = amount.div_ceil(3);
        let script = format!(
            "tell application \"System Events\"\n    repeat {} times\n        key code {}\n    end repeat\nend tell",
            presses, key
        );
        self.run(&[osascript(&script)]).await.map(|_| ())
    }

    async fn type_text(&self, text: &str) -> AutomationResult<()> {
        self.scripting()?;
        if text.is_empty() {
            return Ok(());
        }
        self.run(&[osascript(&type_script(text))]).await.map(|_| ())
    }

    async fn key_chord(&self, chord: &KeyChord) -> AutomationResult<()> {
        self.scripting()?;
        let script = format!("tell application \"System Events\" to {}", chord.to_applescript());
        self.run(&[osascript(&script)]).await.map(|_| ())
    }

    async fn clipboard_get(&self) -> AutomationResult<String> {
        self.require(self.backends.pasteboard, "clipboard access", "pbcopy and pbpaste")?;
        self.run(&[Invocation::new("pbpaste", Vec::<String>::new())]).await
    }

    async fn clipboard_set(&self, text: &str) -> AutomationResult<()> {
        self.require(self.backends.pasteboard, "clipboard access", "pbcopy and pbpaste")?;
        self.run(&[Invocation::new("pbcopy", Vec::<String>::new()).with_stdin(text)])
            .await
            .map(|_| ())
    }

    async fn list_windows(&self) -> AutomationResult<Vec<WindowInfo>> {
        self.scripting()?;
        let out = self.run(&[osascript(LIST_WINDOWS_SCRIPT)]).await?;
        Ok(parse_window_list(&out))
    }

    async fn focus_window(&self, query: &str) -> AutomationResult<WindowInfo> {
        let window = select_window(self.list_windows().await?, query)?;
        let app = applescript_escape(window.app_name.as_deref().unwrap_or(&window.id));
        let title = applescript_escape(&window.title);
        let script = format!(
            "tell application \"{app}\" to activate\n\
             tell application \"System Events\"\n    \
                 try\n        \
                     perform action \"AXRaise\" of (first window of process \"{app}\" whose name is \"{title}\")\n    \
                 end try\n\
             end tell"
        );
        self.run(&[osascript(&script)]).await?;
        Ok(window)
    }

    async fn capture_to(&self, path: &Path, target: &CaptureTarget) -> AutomationResult<()> {
        self.require(self.backends.screencapture, "screen capture", "screencapture")?;
        let mut args = vec!["-x".to_string()];
        if let CaptureTarget::Window(query) = target {
            let window = select_window(self.list_windows().await?, query)?;
            let b = window.bounds.ok_or_else(|| {
                AutomationError::Unavailable(format!("bounds of '{}' are unknown", window.title))
            })?;
            args.push("-R".to_string());
            args.push(format!("{},{},{},{}", b.x, b.y, b.width, b.height));
        }
        args.push(path.display().to_string());

        self.run(&[Invocation::new("screencapture", args)])
            .await
            .map_err(|e| match e {
                AutomationError::CommandFailed { .. } => AutomationError::Unavailable(
                    "screencapture failed; grant Screen Recording permission to your terminal".to_string(),
                ),
                other => other,
            })?;

        // A denied capture can exit 0 without writing anything
        if !path.exists() {
            return Err(AutomationError::Unavailable(
                "screencapture produced no file; check Screen Recording permission".to_string(),
            ));
        }
        Ok(())
    }
}
