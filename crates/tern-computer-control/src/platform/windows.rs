use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{check_scroll_amount, run_all, select_window};
use crate::keys::sendkeys_escape;
use crate::probe::{first_available, Host};
use crate::runner::{Invocation, ProgramRunner};
use crate::{
    AutomationCapability, AutomationError, AutomationResult, CaptureTarget, ComputerController,
    ControllerSettings, KeyChord, MouseButton, Point, Rect, ScrollDirection, WindowInfo,
};

const USER32_PRELUDE: &str = r#"Add-Type @"
using System;
using System.Runtime.InteropServices;
public static class TernInput {
    [StructLayout(LayoutKind.Sequential)]
    public struct RECT { public int Left; public int Top; public int Right; public int Bottom; }
    [DllImport("user32.dll")] public static extern bool SetCursorPos(int x, int y);
    [DllImport("user32.dll")] public static extern void mouse_event(uint flags, int dx, int dy, int data, UIntPtr extra);
    [DllImport("user32.dll")] public static extern bool SetForegroundWindow(IntPtr hwnd);
    [DllImport("user32.dll")] public static extern bool ShowWindow(IntPtr hwnd, int cmd);
    [DllImport("user32.dll")] public static extern bool GetWindowRect(IntPtr hwnd, out RECT rect);
}
"@
"#;

const LIST_WINDOWS_SCRIPT: &str = r#"Get-Process | Where-Object { $_.MainWindowTitle } | ForEach-Object {
    $r = New-Object TernInput+RECT
    [void][TernInput]::GetWindowRect($_.MainWindowHandle, [ref]$r)
    "{0}`t{1}`t{2}`t{3},{4},{5},{6}" -f $_.MainWindowHandle, $_.ProcessName, $_.MainWindowTitle, $r.Left, $r.Top, ($r.Right - $r.Left), ($r.Bottom - $r.Top)
}"#;

// mouse_event flags
const LEFTDOWN: u32 = 0x0002;
const LEFTUP: u32 = 0x0004;
const RIGHTDOWN: u32 = 0x0008;
const RIGHTUP: u32 = 0x0010;
const MIDDLEDOWN: u32 = 0x0020;
const MIDDLEUP: u32 = 0x0040;
const WHEEL: u32 = 0x0800;
const HWHEEL: u32 = 0x1000;
const WHEEL_DELTA: i64 = 120;

fn button_flags(button: MouseButton) -> (u32, u32) {
    match button {
        MouseButton::Left => (LEFTDOWN, LEFTUP),
        MouseButton::Right => (RIGHTDOWN, RIGHTUP),
        MouseButton::Middle => (MIDDLEDOWN, MIDDLEUP),
    }
}

/// Single-quoted PowerShell literal.
fn ps_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub fn click_script(at: Option<Point>, button: MouseButton, double: bool) -> String {
    let mut script = String::new();
    if let Some(p) = at {
        script.push_str(&format!("[void][TernInput]::SetCursorPos({}, {})\n", p.x, p.y));
    }
    let (down, up) = button_flags(button);
    let times = if double { 2 } else { 1 };
    for _ in 0..times {
        script.push_str(&format!(
            "[TernInput]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)\n[TernInput]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)\n",
            down, up
        ));
    }
    script
}

pub fn scroll_script(direction: ScrollDirection, amount: u32) -> String {
    let delta = WHEEL_DELTA * amount as i64;
    let (flag, data) = match direction {
        ScrollDirection::Up => (WHEEL, delta),
        ScrollDirection::Down => (WHEEL, -delta),
        ScrollDirection::Left => (HWHEEL, -delta),
        ScrollDirection::Right => (HWHEEL, delta),
    };
    format!("[TernInput]::mouse_event({}, 0, 0, {}, [UIntPtr]::Zero)\n", flag, data)
}

pub fn screenshot_script(path: &Path, region: Option<Rect>) -> String {
    let bounds = match region {
        Some(r) => format!(
            "$left = {}; $top = {}; $width = {}; $height = {}",
            r.x, r.y, r.width, r.height
        ),
        None => "$b = [System.Windows.Forms.SystemInformation]::VirtualScreen; $left = $b.Left; $top = $b.Top; $width = $b.Width; $height = $b.Height".to_string(),
    };
    format!(
        "Add-Type -AssemblyName System.Windows.Forms, System.Drawing\n\
         {bounds}\n\
         $bmp = New-Object System.Drawing.Bitmap $width, $height\n\
         $g = [System.Drawing.Graphics]::FromImage($bmp)\n\
         $g.CopyFromScreen($left, $top, 0, 0, $bmp.Size)\n\
         $bmp.Save({}, [System.Drawing.Imaging.ImageFormat]::Png)\n\
         $g.Dispose(); $bmp.Dispose()\n",
        ps_quote(&path.display().to_string())
    )
}

pub fn parse_window_list(output: &str) -> Vec<WindowInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim_end_matches('\r').split('\t');
            let handle = parts.next()?.trim();
            let process = parts.next()?.trim();
            let title = parts.next()?.trim();
            let bounds = parts.next().and_then(|g| {
                let n: Vec<i32> = g.split(',').filter_map(|v| v.trim().parse().ok()).collect();
                match n.as_slice() {
                    [x, y, width, height] if *width > 0 && *height > 0 => Some(Rect {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                    }),
                    _ => None,
                }
            });
            if handle.is_empty() || title.is_empty() {
                return None;
            }
            Some(WindowInfo {
                id: handle.to_string(),
                title: title.to_string(),
                app_name: Some(process.to_string()),
                bounds,
            })
        })
        .collect()
}

pub struct WindowsController {
    shell: Option<&'static str>,
    runner: Arc<dyn ProgramRunner>,
    settings: ControllerSettings,
}

impl WindowsController {
    pub fn probe(host: &dyn Host, runner: Arc<dyn ProgramRunner>, settings: ControllerSettings) -> Self {
        let shell = first_available(host, &[("powershell", "powershell"), ("pwsh", "pwsh")]);
        debug!("Windows automation shell: {:?}", shell);
        Self {
            shell,
            runner,
            settings,
        }
    }

    fn invocation(&self, script: &str, with_prelude: bool) -> AutomationResult<Invocation> {
        let shell = self.shell.ok_or_else(|| {
            AutomationError::Unavailable("Windows automation needs PowerShell on PATH".to_string())
        })?;
        let body = if with_prelude {
            format!("{}{}", USER32_PRELUDE, script)
        } else {
            script.to_string()
        };
        Ok(Invocation::new(
            shell,
            [
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                body.as_str(),
            ],
        ))
    }

    async fn powershell(&self, script: &str, with_prelude: bool) -> AutomationResult<String> {
        let invocation = self.invocation(script, with_prelude)?;
        run_all(self.runner.as_ref(), &[invocation]).await
    }
}

#[async_trait]
impl ComputerController for WindowsController {
    fn backend_name(&self) -> String {
        match self.shell {
            Some(shell) => format!("windows ({})", shell),
            None => "windows (no PowerShell)".to_string(),
        }
    }

    fn capabilities(&self) -> AutomationCapability {
        let ok = self.shell.is_some();
        AutomationCapability {
            screenshot: ok,
            pointer: ok,
            keyboard: ok,
            clipboard: ok,
            windowing: ok,
        }
    }

    fn settings(&self) -> ControllerSettings {
        self.settings
    }

    async fn move_pointer(&self, to: Point) -> AutomationResult<()> {
        let script = format!("[void][TernInput]::SetCursorPos({}, {})", to.x, to.y);
        self.powershell(&script, true).await.map(|_| ())
    }

    async fn click(&self, at: Option<Point>, button: MouseButton, double: bool) -> AutomationResult<()> {
        self.powershell(&click_script(at, button, double), true)
            .await
            .map(|_| ())
    }

    async fn drag(&self, from: Point, to: Point) -> AutomationResult<()> {
        let script = format!(
            "[void][TernInput]::SetCursorPos({}, {})\n\
             [TernInput]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)\n\
             Start-Sleep -Milliseconds 50\n\
             [void][TernInput]::SetCursorPos({}, {})\n\
             [TernInput]::mouse_event({}, 0, 0, 0, [UIntPtr]::Zero)\n",
            from.x, from.y, LEFTDOWN, to.x, to.y, LEFTUP
        );
        self.powershell(&script, true).await.map(|_| ())
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> AutomationResult<()> {
        let amount = check_scroll_amount(amount)?;
        self.powershell(&scroll_script(direction, amount), true)
            .await
            .map(|_| ())
    }

    async fn type_text(&self, text: &str) -> AutomationResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms\n[System.Windows.Forms.SendKeys]::SendWait({})",
            ps_quote(&sendkeys_escape(text))
        );
        self.powershell(&script, false).await.map(|_| ())
    }

    async fn key_chord(&self, chord: &KeyChord) -> AutomationResult<()> {
        let keys = chord.to_sendkeys()?;
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms\n[System.Windows.Forms.SendKeys]::SendWait({})",
            ps_quote(&keys)
        );
        self.powershell(&script, false).await.map(|_| ())
    }

    async fn clipboard_get(&self) -> AutomationResult<String> {
        let out = self.powershell("Get-Clipboard -Raw", false).await?;
        Ok(out.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn clipboard_set(&self, text: &str) -> AutomationResult<()> {
        let invocation = self
            .invocation("Set-Clipboard -Value ([Console]::In.ReadToEnd())", false)?
            .with_stdin(text);
        run_all(self.runner.as_ref(), &[invocation]).await.map(|_| ())
    }

    async fn list_windows(&self) -> AutomationResult<Vec<WindowInfo>> {
        let out = self.powershell(LIST_WINDOWS_SCRIPT, true).await?;
        Ok(parse_window_list(&out))
    }

    async fn focus_window(&self, query: &str) -> AutomationResult<WindowInfo> {
        let window = select_window(self.list_windows().await?, query)?;
        let handle: i64 = window.id.parse().map_err(|_| {
            AutomationError::InvalidArgument(format!("bad window handle '{}'", window.id))
        })?;
        // 9 = SW_RESTORE
        let script = format!(
            "[void][TernInput]::ShowWindow([IntPtr]{0}, 9)\n[void][TernInput]::SetForegroundWindow([IntPtr]{0})",
            handle
        );
        self.powershell(&script, true).await?;
        Ok(window)
    }

    async fn capture_to(&self, path: &Path, target: &CaptureTarget) -> AutomationResult<()> {
        let region = match target {
            CaptureTarget::FullScreen => None,
            CaptureTarget::Window(query) => {
                let window = self.focus_window(query).await?;
                Some(window.bounds.ok_or_else(|| {
                    AutomationError::Unavailable(format!("bounds of '{}' are unknown", window.title))
                })?)
            }
        };
        self.powershell(&screenshot_script(path, region), false)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticHost;
    use crate::runner::testing::RecordingRunner;

    #[test]
    fn test_click_script_double_right() {
        let script = click_script(Some(Point::new(3, 4)), MouseButton::Right, true);
        assert!(script.starts_with("[void][TernInput]::SetCursorPos(3, 4)"));
        assert_eq!(script.matches("mouse_event(8,").count(), 2);
        assert_eq!(script.matches("mouse_event(16,").count(), 2);
    }

    #[test]
    fn test_scroll_script_down_is_negative() {
        assert!(scroll_script(ScrollDirection::Down, 2).contains("mouse_event(2048, 0, 0, -240"));
    }

    #[test]
    fn test_ps_quote_doubles_quotes() {
        assert_eq!(ps_quote("it's"), "'it''s'");
    }

    #[test]
    fn test_parse_window_list() {
        let out = "1234\tnotepad\tnotes.txt - Notepad\t10,20,640,480\r\n0\tidle\t\t0,0,0,0\r\n";
        let windows = parse_window_list(out);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].app_name.as_deref(), Some("notepad"));
        assert_eq!(windows[0].bounds.map(|b| b.height), Some(480));
    }

    #[tokio::test]
    async fn test_no_powershell_is_unavailable() {
        let controller = WindowsController::probe(
            &StaticHost::default(),
            Arc::new(RecordingRunner::default()),
            ControllerSettings::default(),
        );
        assert!(!controller.capabilities().any());
        assert!(matches!(
            controller.move_pointer(Point::new(1, 1)).await,
            Err(AutomationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_clipboard_set_uses_stdin() {
        let runner = Arc::new(RecordingRunner::default());
        let controller = WindowsController::probe(
            &StaticHost::with_programs(&["pwsh"]),
            runner.clone(),
            ControllerSettings::default(),
        );
        controller.clipboard_set("copied").await.unwrap();
        let calls = runner.calls();
        assert_eq!(calls[0].program, "pwsh");
        assert_eq!(calls[0].stdin.as_deref(), Some("copied"));
    }
}
