use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{check_scroll_amount, run_all, select_window};
use crate::probe::{first_available, Host};
use crate::runner::{Invocation, ProgramRunner};
use crate::{
    AutomationCapability, AutomationError, AutomationResult, CaptureTarget, ComputerController,
    ControllerSettings, KeyChord, MouseButton, Point, Rect, ScrollDirection, WindowInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySession {
    X11,
    Wayland,
    Headless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTool {
    Xdotool,
    Ydotool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTool {
    WlClipboard,
    Xclip,
    Xsel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotTool {
    Grim,
    Scrot,
    Import,
    GnomeScreenshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTool {
    Wmctrl,
    Xdotool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinuxBackends {
    pub session: DisplaySession,
    pub input: Option<InputTool>,
    pub clipboard: Option<ClipboardTool>,
    pub screenshot: Option<ScreenshotTool>,
    pub windows: Option<WindowTool>,
}

impl LinuxBackends {
    pub fn probe(host: &dyn Host) -> Self {
        let x11 = host.env_var("DISPLAY").is_some();
        let wayland = host.env_var("WAYLAND_DISPLAY").is_some();

        let session = if wayland {
            DisplaySession::Wayland
        } else if x11 {
            DisplaySession::X11
        } else {
            DisplaySession::Headless
        };

        // Wayland sessions usually also run XWayland, so X11 tools stay as fallbacks
        let mut input = Vec::new();
        let mut clipboard = Vec::new();
        let mut screenshot = Vec::new();
        let mut windows = Vec::new();
        if wayland {
            input.push((InputTool::Ydotool, "ydotool"));
            clipboard.push((ClipboardTool::WlClipboard, "wl-copy"));
            screenshot.push((ScreenshotTool::Grim, "grim"));
            screenshot.push((ScreenshotTool::GnomeScreenshot, "gnome-screenshot"));
        }
        if x11 {
            input.push((InputTool::Xdotool, "xdotool"));
            clipboard.push((ClipboardTool::Xclip, "xclip"));
            clipboard.push((ClipboardTool::Xsel, "xsel"));
            screenshot.push((ScreenshotTool::Scrot, "scrot"));
            screenshot.push((ScreenshotTool::Import, "import"));
            screenshot.push((ScreenshotTool::GnomeScreenshot, "gnome-screenshot"));
            windows.push((WindowTool::Wmctrl, "wmctrl"));
            windows.push((WindowTool::Xdotool, "xdotool"));
        }

        let clipboard = first_available(host, &clipboard).filter(|tool| {
            // wl-copy is useless without its reading half
            *tool != ClipboardTool::WlClipboard || host.has_program("wl-paste")
        });

        Self {
            session,
            input: first_available(host, &input),
            clipboard,
            screenshot: first_available(host, &screenshot),
            windows: first_available(host, &windows),
        }
    }

    pub fn capabilities(&self) -> AutomationCapability {
        AutomationCapability {
            screenshot: self.screenshot.is_some(),
            pointer: self.input.is_some(),
            keyboard: self.input.is_some(),
            clipboard: self.clipboard.is_some(),
            windowing: self.windows.is_some(),
        }
    }
}

pub struct LinuxController {
    backends: LinuxBackends,
    runner: Arc<dyn ProgramRunner>,
    settings: ControllerSettings,
}

impl LinuxController {
    pub fn probe(host: &dyn Host, runner: Arc<dyn ProgramRunner>, settings: ControllerSettings) -> Self {
        let backends = LinuxBackends::probe(host);
        debug!("Linux automation backends: {:?}", backends);
        Self {
            backends,
            runner,
            settings,
        }
    }

    pub fn backends(&self) -> LinuxBackends {
        self.backends
    }

    fn missing(&self, what: &str, install: &str) -> AutomationError {
        if self.backends.session == DisplaySession::Headless {
            AutomationError::Unavailable(format!(
                "{} needs a graphical session (neither DISPLAY nor WAYLAND_DISPLAY is set)",
                what
            ))
        } else {
            AutomationError::Unavailable(format!("{} needs {} installed", what, install))
        }
    }

    fn input(&self) -> AutomationResult<InputTool> {
        self.backends
            .input
            .ok_or_else(|| self.missing("pointer and keyboard control", "xdotool or ydotool"))
    }

    fn clipboard(&self) -> AutomationResult<ClipboardTool> {
        self.backends
            .clipboard
            .ok_or_else(|| self.missing("clipboard access", "wl-clipboard, xclip or xsel"))
    }

    fn window_tool(&self) -> AutomationResult<WindowTool> {
        self.backends
            .windows
            .ok_or_else(|| self.missing("window management", "wmctrl or xdotool"))
    }

    async fn run(&self, invocations: &[Invocation]) -> AutomationResult<String> {
        run_all(self.runner.as_ref(), invocations).await
    }
}

fn xdotool_button(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// ydotool click codes: low nibble is the button, 0xC0 is press and release.
fn ydotool_button(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 0x00,
        MouseButton::Right => 0x01,
        MouseButton::Middle => 0x02,
    }
}

fn ydotool_move(to: Point) -> Invocation {
    Invocation::new(
        "ydotool",
        [
            "mousemove".to_string(),
            "--absolute".to_string(),
            "-x".to_string(),
            to.x.to_string(),
            "-y".to_string(),
            to.y.to_string(),
        ],
    )
}

pub fn move_invocations(tool: InputTool, to: Point) -> Vec<Invocation> {
    match tool {
        InputTool::Xdotool => vec![Invocation::new(
            "xdotool",
            ["mousemove".to_string(), to.x.to_string(), to.y.to_string()],
        )],
        InputTool::Ydotool => vec![ydotool_move(to)],
    }
}

pub fn click_invocations(
    tool: InputTool,
    at: Option<Point>,
    button: MouseButton,
    double: bool,
) -> Vec<Invocation> {
    match tool {
        InputTool::Xdotool => {
            let mut args = Vec::new();
            if let Some(p) = at {
                args.extend(["mousemove".to_string(), p.x.to_string(), p.y.to_string()]);
            }
            args.push("click".to_string());
            if double {
                args.extend(["--repeat".to_string(), "2".to_string()]);
            }
            args.push(xdotool_button(button).to_string());
            vec![Invocation::new("xdotool", args)]
        }
        InputTool::Ydotool => {
            let mut out: Vec<Invocation> = at.map(ydotool_move).into_iter().collect();
            let code = format!("0x{:02X}", 0xC0 | ydotool_button(button));
            let mut args = vec!["click".to_string(), code.clone()];
            if double {
                args.push(code);
            }
            out.push(Invocation::new("ydotool", args));
            out
        }
    }
}

pub fn drag_invocations(tool: InputTool, from: Point, to: Point) -> Vec<Invocation> {
    match tool {
        InputTool::Xdotool => vec![Invocation::new(
            "xdotool",
            [
                "mousemove".to_string(),
                from.x.to_string(),
                from.y.to_string(),
                "mousedown".to_string(),
                "1".to_string(),
                "mousemove".to_string(),
                to.x.to_string(),
                to.y.to_string(),
                "mouseup".to_string(),
                "1".to_string(),
            ],
        )],
        InputTool::Ydotool => vec![
            ydotool_move(from),
            Invocation::new("ydotool", ["click", "0x40"]),
            ydotool_move(to),
            Invocation::new("ydotool", ["click", "0x80"]),
        ],
    }
}

pub fn scroll_invocations(tool: InputTool, direction: ScrollDirection, amount: u32) -> Vec<Invocation> {
    match tool {
        InputTool::Xdotool => {
            let button = match direction {
                ScrollDirection::Up => "4",
                ScrollDirection::Down => "5",
                ScrollDirection::Left => "6",
                ScrollDirection::Right => "7",
            };
            vec![Invocation::new(
                "xdotool",
                [
                    "click".to_string(),
                    "--repeat".to_string(),
                    amount.to_string(),
                    button.to_string(),
                ],
            )]
        }
        InputTool::Ydotool => {
            let n = amount as i64;
            let (x, y) = match direction {
                ScrollDirection::Up => (0, n),
                ScrollDirection::Down => (0, -n),
                ScrollDirection::Left => (-n, 0),
                ScrollDirection::Right => (n, 0),
            };
            vec![Invocation::new(
                "ydotool",
                [
                    "mousemove".to_string(),
                    "--wheel".to_string(),
                    "-x".to_string(),
                    x.to_string(),
                    "-y".to_string(),
                    y.to_string(),
                ],
            )]
        }
    }
}

pub fn type_invocation(tool: InputTool, text: &str) -> Invocation {
    match tool {
        InputTool::Xdotool => Invocation::new("xdotool", ["type", "--delay", "12", "--", text]),
        InputTool::Ydotool => Invocation::new("ydotool", ["type", "--", text]),
    }
}

pub fn clipboard_get_invocation(tool: ClipboardTool) -> Invocation {
    match tool {
        ClipboardTool::WlClipboard => Invocation::new("wl-paste", ["--no-newline"]),
        ClipboardTool::Xclip => Invocation::new("xclip", ["-selection", "clipboard", "-o"]),
        ClipboardTool::Xsel => Invocation::new("xsel", ["--clipboard", "--output"]),
    }
}

pub fn clipboard_set_invocation(tool: ClipboardTool, text: &str) -> Invocation {
    let invocation = match tool {
        ClipboardTool::WlClipboard => Invocation::new("wl-copy", Vec::<String>::new()),
        ClipboardTool::Xclip => Invocation::new("xclip", ["-selection", "clipboard", "-i"]),
        ClipboardTool::Xsel => Invocation::new("xsel", ["--clipboard", "--input"]),
    };
    invocation.with_stdin(text)
}

pub fn full_screen_invocation(tool: ScreenshotTool, path: &Path) -> Invocation {
    let path = path.display().to_string();
    match tool {
        ScreenshotTool::Grim => Invocation::new("grim", [path]),
        ScreenshotTool::Scrot => Invocation::new("scrot", ["--overwrite".to_string(), path]),
        ScreenshotTool::Import => Invocation::new("import", ["-window".to_string(), "root".to_string(), path]),
        ScreenshotTool::GnomeScreenshot => Invocation::new("gnome-screenshot", ["-f".to_string(), path]),
    }
}

/// Parse `wmctrl -lG`: id, desktop, x, y, width, height, host, title.
pub fn parse_wmctrl(output: &str) -> Vec<WindowInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 7 {
                return None;
            }
            let num = |i: usize| fields[i].parse::<i32>().ok();
            let bounds = match (num(2), num(3), num(4), num(5)) {
                (Some(x), Some(y), Some(width), Some(height)) => Some(Rect { x, y, width, height }),
                _ => None,
            };
            let title = fields.get(7..).map(|rest| rest.join(" ")).unwrap_or_default();
            if title.is_empty() {
                return None;
            }
            Some(WindowInfo {
                id: fields[0].to_string(),
                title,
                app_name: None,
                bounds,
            })
        })
        .collect()
}

#[async_trait]
impl ComputerController for LinuxController {
    fn backend_name(&self) -> String {
        let b = &self.backends;
        let mut tools = Vec::new();
        if let Some(t) = b.input {
            tools.push(format!("{:?}", t).to_lowercase());
        }
        if let Some(t) = b.clipboard {
            tools.push(format!("{:?}", t).to_lowercase());
        }
        if let Some(t) = b.screenshot {
            tools.push(format!("{:?}", t).to_lowercase());
        }
        if let Some(t) = b.windows {
            tools.push(format!("{:?}", t).to_lowercase());
        }
        tools.dedup();
        let session = match b.session {
            DisplaySession::X11 => "x11",
            DisplaySession::Wayland => "wayland",
            DisplaySession::Headless => "headless",
        };
        if tools.is_empty() {
            format!("linux/{}", session)
        } else {
            format!("linux/{} ({})", session, tools.join(", "))
        }
    }

    fn capabilities(&self) -> AutomationCapability {
        self.backends.capabilities()
    }

    fn settings(&self) -> ControllerSettings {
        self.settings
    }

    async fn move_pointer(&self, to: Point) -> AutomationResult<()> {
        let tool = self.input()?;
        self.run(&move_invocations(tool, to)).await.map(|_| ())
    }

    async fn click(&self, at: Option<Point>, button: MouseButton, double: bool) -> AutomationResult<()> {
        let tool = self.input()?;
        self.run(&click_invocations(tool, at, button, double))
            .await
            .map(|_| ())
    }

    async fn drag(&self, from: Point, to: Point) -> AutomationResult<()> {
        let tool = self.input()?;
        self.run(&drag_invocations(tool, from, to)).await.map(|_| ())
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> AutomationResult<()> {
        let tool = self.input()?;
        let amount = check_scroll_amount(amount)?;
        self.run(&scroll_invocations(tool, direction, amount))
            .await
            .map(|_| ())
    }

    async fn type_text(&self, text: &str) -> AutomationResult<()> {
        let tool = self.input()?;
        if text.is_empty() {
            return Ok(());
        }
        self.run(&[type_invocation(tool, text)]).await.map(|_| ())
    }

    async fn key_chord(&self, chord: &KeyChord) -> AutomationResult<()> {
        match self.input()? {
            InputTool::Xdotool => self
                .run(&[Invocation::new(
                    "xdotool",
                    ["key".to_string(), "--".to_string(), chord.to_xdotool()],
                )])
                .await
                .map(|_| ()),
            InputTool::Ydotool => Err(AutomationError::Unavailable(
                "key chords need xdotool; ydotool only supports raw key codes".to_string(),
            )),
        }
    }

    async fn clipboard_get(&self) -> AutomationResult<String> {
        let tool = self.clipboard()?;
        self.run(&[clipboard_get_invocation(tool)]).await
    }

    async fn clipboard_set(&self, text: &str) -> AutomationResult<()> {
        let tool = self.clipboard()?;
        self.run(&[clipboard_set_invocation(tool, text)])
            .await
            .map(|_| ())
    }

    async fn list_windows(&self) -> AutomationResult<Vec<WindowInfo>> {
        match self.window_tool()? {
            WindowTool::Wmctrl => {
                let out = self.run(&[Invocation::new("wmctrl", ["-lG"])]).await?;
                Ok(parse_wmctrl(&out))
            }
            WindowTool::Xdotool => {
                let ids = self
                    .run(&[Invocation::new("xdotool", ["search", "--onlyvisible", "--name", "."])])
                    .await?;
                let mut windows = Vec::new();
                for id in ids.lines().map(str::trim).filter(|l| !l.is_empty()).take(64) {
                    let title = self
                        .run(&[Invocation::new("xdotool", ["getwindowname", id])])
                        .await
                        .unwrap_or_default();
                    let title = title.trim();
                    if !title.is_empty() {
                        windows.push(WindowInfo {
                            id: id.to_string(),
                            title: title.to_string(),
                            app_name: None,
                            bounds: None,
                        });
                    }
                }
                Ok(windows)
            }
        }
    }

    async fn focus_window(&self, query: &str) -> AutomationResult<WindowInfo> {
        let tool = self.window_tool()?;
        let window = select_window(self.list_windows().await?, query)?;
        let invocation = match tool {
            WindowTool::Wmctrl => Invocation::new("wmctrl", ["-i", "-a", window.id.as_str()]),
            WindowTool::Xdotool => {
                Invocation::new("xdotool", ["windowactivate", "--sync", window.id.as_str()])
            }
        };
        self.run(&[invocation]).await?;
        Ok(window)
    }

    async fn capture_to(&self, path: &Path, target: &CaptureTarget) -> AutomationResult<()> {
        let tool = self
            .backends
            .screenshot
            .ok_or_else(|| self.missing("screen capture", "grim, scrot, ImageMagick or gnome-screenshot"))?;

        let query = match target {
            CaptureTarget::FullScreen => {
                return self.run(&[full_screen_invocation(tool, path)]).await.map(|_| ());
            }
            CaptureTarget::Window(query) => query,
        };

        let path_arg = path.display().to_string();
        let invocation = match tool {
            ScreenshotTool::Import => {
                let window = select_window(self.list_windows().await?, query)?;
                Invocation::new("import", ["-window".to_string(), window.id, path_arg])
            }
            ScreenshotTool::Grim => {
                let window = select_window(self.list_windows().await?, query)?;
                let b = window.bounds.ok_or_else(|| {
                    AutomationError::Unavailable(format!("geometry of '{}' is unknown", window.title))
                })?;
                Invocation::new(
                    "grim",
                    [
                        "-g".to_string(),
                        format!("{},{} {}x{}", b.x, b.y, b.width, b.height),
                        path_arg,
                    ],
                )
            }
            // These capture the active window, so raise the target first
            ScreenshotTool::Scrot => {
                self.focus_window(query).await?;
                Invocation::new("scrot", ["--focused".to_string(), "--overwrite".to_string(), path_arg])
            }
            ScreenshotTool::GnomeScreenshot => {
                self.focus_window(query).await?;
                Invocation::new("gnome-screenshot", ["-w".to_string(), "-f".to_string(), path_arg])
            }
        };
        self.run(&[invocation]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticHost;
    use crate::runner::testing::RecordingRunner;

    fn x11_host(programs: &[&str]) -> StaticHost {
        StaticHost::with_programs(programs).with_env("DISPLAY", ":0")
    }

    #[test]
    fn test_headless_host_has_no_backends() {
        let host = StaticHost::with_programs(&["xdotool", "xclip", "scrot", "wmctrl"]);
        let backends = LinuxBackends::probe(&host);
        assert_eq!(backends.session, DisplaySession::Headless);
        assert!(!backends.capabilities().any());
    }

    #[test]
    fn test_x11_probe_order() {
        let host = x11_host(&["xdotool", "xsel", "xclip", "import", "scrot"]);
        let backends = LinuxBackends::probe(&host);
        assert_eq!(backends.input, Some(InputTool::Xdotool));
        assert_eq!(backends.clipboard, Some(ClipboardTool::Xclip));
        assert_eq!(backends.screenshot, Some(ScreenshotTool::Scrot));
        // xdotool doubles as the window tool when wmctrl is missing
        assert_eq!(backends.windows, Some(WindowTool::Xdotool));
    }

    #[test]
    fn test_wayland_prefers_native_tools() {
        let host = StaticHost::with_programs(&["ydotool", "xdotool", "wl-copy", "wl-paste", "grim"])
            .with_env("WAYLAND_DISPLAY", "wayland-0")
            .with_env("DISPLAY", ":0");
        let backends = LinuxBackends::probe(&host);
        assert_eq!(backends.session, DisplaySession::Wayland);
        assert_eq!(backends.input, Some(InputTool::Ydotool));
        assert_eq!(backends.clipboard, Some(ClipboardTool::WlClipboard));
        assert_eq!(backends.screenshot, Some(ScreenshotTool::Grim));
    }

    #[test]
    fn test_wl_copy_without_wl_paste_is_skipped() {
        let host = StaticHost::with_programs(&["wl-copy"]).with_env("WAYLAND_DISPLAY", "wayland-0");
        assert_eq!(LinuxBackends::probe(&host).clipboard, None);
    }

    #[test]
    fn test_click_invocations() {
        let xdo = click_invocations(InputTool::Xdotool, Some(Point::new(10, 20)), MouseButton::Right, true);
        assert_eq!(
            xdo[0].args,
            vec!["mousemove", "10", "20", "click", "--repeat", "2", "3"]
        );

        let ydo = click_invocations(InputTool::Ydotool, None, MouseButton::Left, false);
        assert_eq!(ydo.len(), 1);
        assert_eq!(ydo[0].args, vec!["click", "0xC0"]);
    }

    #[test]
    fn test_scroll_invocations() {
        let xdo = scroll_invocations(InputTool::Xdotool, ScrollDirection::Down, 3);
        assert_eq!(xdo[0].args, vec!["click", "--repeat", "3", "5"]);
        let ydo = scroll_invocations(InputTool::Ydotool, ScrollDirection::Up, 2);
        assert_eq!(ydo[0].args, vec!["mousemove", "--wheel", "-x", "0", "-y", "2"]);
    }

    #[test]
    fn test_parse_wmctrl() {
        let out = "0x03a00003  0 10   52   1900 1000 host Editor - main.rs\n\
                   0x01e00006 -1 0    0    1920 32   host \n";
        let windows = parse_wmctrl(out);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, "0x03a00003");
        assert_eq!(windows[0].title, "Editor - main.rs");
        assert_eq!(
            windows[0].bounds,
            Some(Rect { x: 10, y: 52, width: 1900, height: 1000 })
        );
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let runner = Arc::new(RecordingRunner::default());
        let controller = LinuxController::probe(&x11_host(&[]), runner.clone(), ControllerSettings::default());
        let err = controller.clipboard_get().await.unwrap_err();
        assert!(matches!(err, AutomationError::Unavailable(_)));
        assert!(err.to_string().contains("xclip"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clipboard_set_pipes_stdin() {
        let runner = Arc::new(RecordingRunner::default());
        let controller = LinuxController::probe(&x11_host(&["xclip"]), runner.clone(), ControllerSettings::default());
        controller.clipboard_set("hello").await.unwrap();
        let calls = runner.calls();
        assert_eq!(calls[0].program, "xclip");
        assert_eq!(calls[0].stdin.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_focus_window_uses_listed_id() {
        let runner = Arc::new(
            RecordingRunner::default().reply("0x00c00007  0 0 0 800 600 host Firefox - Docs\n"),
        );
        let controller = LinuxController::probe(&x11_host(&["wmctrl"]), runner.clone(), ControllerSettings::default());
        let window = controller.focus_window("firefox").await.unwrap();
        assert_eq!(window.id, "0x00c00007");
        let calls = runner.calls();
        assert_eq!(calls[1].args, vec!["-i", "-a", "0x00c00007"]);
    }

    #[tokio::test]
    async fn test_ydotool_rejects_key_chords() {
        let host = StaticHost::with_programs(&["ydotool"]).with_env("WAYLAND_DISPLAY", "wayland-0");
        let controller = LinuxController::probe(&host, Arc::new(RecordingRunner::default()), ControllerSettings::default());
        let chord: KeyChord = "ctrl+c".parse().unwrap();
        assert!(matches!(
            controller.key_chord(&chord).await,
            Err(AutomationError::Unavailable(_))
        ));
    }
}
