//! Bounded subprocess execution.
//!
//! Every process spawned here runs under a wall-clock timeout, captures its
//! output up to a byte cap, and is force-killed (together with its process
//! group on Unix) on timeout or cancellation rather than abandoned. On Unix
//! anything the command left running in its group is killed once it exits.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to keep collecting output after the process has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Receives output lines as they are produced.
pub trait OutputReceiver: Send + Sync {
    fn on_output_line(&self, line: &str);
}

/// Discards streamed output.
pub struct NullReceiver;

impl OutputReceiver for NullReceiver {
    fn on_output_line(&self, _line: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    /// Cap on captured bytes per stream and for the combined output.
    pub output_limit: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            output_limit: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order.
    pub output: String,
    /// `None` when the process was killed by a signal or never reaped.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub cancelled: bool,
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn status_line(&self) -> String {
        if self.timed_out {
            "timed out (process killed)".to_string()
        } else if self.cancelled {
            "cancelled (process killed)".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

pub struct CodeExecutor {
    limits: ExecutionLimits,
}

impl CodeExecutor {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Run a shell snippet in `working_dir`, streaming lines to `receiver`.
    pub async fn execute_bash_in_dir<R: OutputReceiver + ?Sized>(
        &self,
        code: &str,
        working_dir: &Path,
        timeout: Option<Duration>,
        receiver: &R,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if !working_dir.is_dir() {
            anyhow::bail!("working directory {} does not exist", working_dir.display());
        }

        let mut cmd = shell_command(code);
        cmd.current_dir(working_dir);

        let limits = ExecutionLimits {
            timeout: timeout.unwrap_or(self.limits.timeout).min(self.limits.timeout),
            ..self.limits
        };
        debug!(
            "Executing shell command in {}: {} (timeout {:?})",
            working_dir.display(),
            code,
            limits.timeout
        );
        run_command(cmd, None, limits, receiver, cancel).await
    }

    /// Run a program directly (no shell), optionally feeding `stdin`.
    pub async fn run_program(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecutionResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        debug!("Running {} {:?}", program, args);
        run_command(
            cmd,
            stdin.map(|s| s.to_vec()),
            self.limits,
            &NullReceiver,
            &CancellationToken::new(),
        )
        .await
        .with_context(|| format!("failed to run {}", program))
    }
}

#[cfg(not(windows))]
fn shell_command(code: &str) -> Command {
    let shell = if find_executable("bash").is_some() { "bash" } else { "sh" };
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(code);
    cmd
}

#[cfg(windows)]
fn shell_command(code: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(code);
    cmd
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Stdout,
    Stderr,
}

/// Caps captured output and records how much was dropped.
struct OutputCollector {
    limit: usize,
    stdout: String,
    stderr: String,
    combined: String,
    omitted: usize,
}

impl OutputCollector {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: String::new(),
            stderr: String::new(),
            combined: String::new(),
            omitted: 0,
        }
    }

    fn push(&mut self, source: Source, chunk: &str) {
        let target = match source {
            Source::Stdout => &mut self.stdout,
            Source::Stderr => &mut self.stderr,
        };
        append_capped(target, chunk, self.limit);
        let kept = append_capped(&mut self.combined, chunk, self.limit);
        self.omitted += chunk.len() - kept;
    }

    fn finish(self, result: &mut ExecutionResult) {
        result.stdout = self.stdout;
        result.stderr = self.stderr;
        result.output = self.combined;
        if self.omitted > 0 {
            result.truncated = true;
            if !result.output.ends_with('\n') {
                result.output.push('\n');
            }
            result
                .output
                .push_str(&format!("[... output truncated: {} more bytes ...]", self.omitted));
        }
    }
}

/// Append as much of `chunk` as fits under `limit`, on a char boundary.
fn append_capped(target: &mut String, chunk: &str, limit: usize) -> usize {
    let room = limit.saturating_sub(target.len());
    if chunk.len() <= room {
        target.push_str(chunk);
        return chunk.len();
    }
    let mut cut = room;
    while cut > 0 && !chunk.is_char_boundary(cut) {
        cut -= 1;
    }
    target.push_str(&chunk[..cut]);
    cut
}

fn spawn_reader<T>(stream: T, source: Source, tx: mpsc::UnboundedSender<(Source, String)>)
where
    T: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((source, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Error reading {:?}: {}", source, e);
                    break;
                }
            }
        }
    });
}

enum Outcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

/// Spawn `cmd` and supervise it to completion, timeout or cancellation.
pub async fn run_command<R: OutputReceiver + ?Sized>(
    mut cmd: Command,
    stdin_data: Option<Vec<u8>>,
    limits: ExecutionLimits,
    receiver: &R,
    cancel: &CancellationToken,
) -> Result<ExecutionResult> {
    cmd.stdin(if stdin_data.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    // Own process group so the whole tree can be killed at once
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    // The id is gone once the child is reaped; the group outlives it
    let pid = child.id();

    if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&data).await {
                debug!("Failed to write stdin: {}", e);
            }
            // Dropping stdin closes the pipe
        });
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, Source::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, Source::Stderr, tx);
    } else {
        drop(tx);
    }

    let mut collector = OutputCollector::new(limits.output_limit);
    let deadline = tokio::time::sleep(limits.timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            Some((source, line)) = rx.recv() => {
                receiver.on_output_line(line.trim_end_matches(['\n', '\r']));
                collector.push(source, &line);
            }
            status = child.wait() => break Outcome::Exited(status?),
            _ = &mut deadline => break Outcome::TimedOut,
            _ = cancel.cancelled() => break Outcome::Cancelled,
        }
    };

    let mut result = ExecutionResult::default();
    match outcome {
        Outcome::Exited(status) => {
            result.exit_code = status.code();
            result.success = status.success();
        }
        Outcome::TimedOut => {
            warn!("Process exceeded {:?}, killing", limits.timeout);
            kill_process_tree(&mut child).await;
            result.timed_out = true;
        }
        Outcome::Cancelled => {
            debug!("Execution cancelled, killing process");
            kill_process_tree(&mut child).await;
            result.cancelled = true;
        }
    }

    // Collect lines still in flight; background grandchildren may hold the pipes open
    let drain = async {
        while let Some((source, line)) = rx.recv().await {
            receiver.on_output_line(line.trim_end_matches(['\n', '\r']));
            collector.push(source, &line);
        }
    };
    let _ = tokio::time::timeout(DRAIN_GRACE, drain).await;

    // Background jobs (`cmd &`) stay in the group after the shell exits
    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_group(pid);
    }

    collector.finish(&mut result);
    Ok(result)
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: killpg only sends a signal; the group id is the child's pid
    // because it was spawned with process_group(0).
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        // ESRCH: nothing left in the group
        debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
    }
}

async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_group(pid);
    }

    #[cfg(windows)]
    if let Some(pid) = child.id() {
        let _ = std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    if let Err(e) = child.kill().await {
        debug!("kill after timeout: {}", e);
    }
}

/// Locate an executable on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        #[cfg(windows)]
        for ext in ["exe", "cmd", "bat"] {
            let with_ext = candidate.with_extension(ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
