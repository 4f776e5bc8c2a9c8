use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::error::SessionError;
use crate::events::Event;
use crate::line_buffer::LineBuffer;

/// Lines of each stream kept for error reports.
pub const CAPTURE_LIMIT: usize = 500;

const READ_CHUNK: usize = 8 * 1024;

/// Return the platform-appropriate shell executable and flag for running commands.
///
/// On Windows, returns `("cmd", "/C")` to invoke `cmd.exe /C <command>`.
/// On Unix-like systems, returns `("sh", "-c")` to invoke `sh -c <command>`.
pub fn shell_command() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

/// A shell command to run inside one branch's clone.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line, e.g. `yarn install`.
    pub command: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Label used when forwarding output events (the branch name).
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One complete line of subprocess output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub line: String,
    pub stream: Stream,
}

/// Bounded tail of a subprocess's stdout and stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

impl CapturedOutput {
    pub fn push(&mut self, line: OutputLine) {
        match line.stream {
            Stream::Stdout => self.push_stdout(line.line),
            Stream::Stderr => self.push_stderr(line.line),
        }
    }

    pub fn push_stdout(&mut self, line: String) {
        push_bounded(&mut self.stdout, line);
    }

    pub fn push_stderr(&mut self, line: String) {
        push_bounded(&mut self.stderr, line);
    }

    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout.iter().map(String::as_str).collect()
    }

    pub fn stderr_lines(&self) -> Vec<&str> {
        self.stderr.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

fn push_bounded(lines: &mut VecDeque<String>, line: String) {
    if lines.len() == CAPTURE_LIMIT {
        lines.pop_front();
    }
    lines.push_back(line);
}

/// Result of a command that ran to a successful exit.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
    pub output: CapturedOutput,
}

/// A running child whose output arrives as ordered lines on `lines`.
///
/// The channel closes once both pipes reach end of stream.
pub struct StreamingChild {
    pub child: Child,
    pub lines: UnboundedReceiver<OutputLine>,
}

/// Spawn `spec` through the platform shell with piped output.
///
/// Each pipe gets a reader task with its own [`LineBuffer`]; both feed one
/// channel, so lines within a stream keep their order. On Unix the command
/// runs in its own process group so [`request_termination`] can reach the
/// processes the shell starts.
pub fn spawn_streaming(spec: &CommandSpec) -> io::Result<StreamingChild> {
    let (shell, shell_flag) = shell_command();
    let mut command = std::process::Command::new(shell);
    command
        .arg(shell_flag)
        .arg(&spec.command)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = tokio::process::Command::from(command)
        .kill_on_drop(true)
        .spawn()?;

    // safety: we set Stdio::piped() above so these are always Some
    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_lines(stdout, Stream::Stdout, tx.clone()));
    tokio::spawn(forward_lines(stderr, Stream::Stderr, tx));

    Ok(StreamingChild { child, lines: rx })
}

async fn forward_lines<R>(mut reader: R, stream: Stream, tx: UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for line in buffer.push_bytes(&chunk[..n]) {
                    if tx.send(OutputLine { line, stream }).is_err() {
                        return;
                    }
                }
            }
        }
    }
    if let Some(line) = buffer.finish() {
        let _ = tx.send(OutputLine { line, stream });
    }
}

/// Ask a running child to stop without waiting for it.
///
/// On Unix the whole process group is signalled first, then the shell itself
/// is killed. The exit is observed later through the usual `wait` path.
pub fn request_termination(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id()
        && let Err(e) = signal_process_group(pid)
    {
        warn!(pid, error = %e, "failed to signal process group");
    }
    child.start_kill()
}

/// Send SIGTERM to the process group led by `pid`.
#[cfg(unix)]
fn signal_process_group(pid: u32) -> io::Result<()> {
    let group = format!("-{}", pid);
    let status = std::process::Command::new("kill")
        .args(["-TERM", "--", &group])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(io::Error::other(format!(
            "kill -TERM -- {} exited with {}",
            group, status
        )));
    }
    Ok(())
}

/// Run `spec` to completion, forwarding output as [`Event::Output`] and
/// handing every stdout line to `on_stdout`.
///
/// A non-zero exit becomes [`SessionError::ToolFailed`] carrying the
/// captured output.
pub async fn run_to_completion<F>(
    spec: &CommandSpec,
    events: Option<&UnboundedSender<Event>>,
    mut on_stdout: F,
) -> Result<CommandOutput, SessionError>
where
    F: FnMut(&str),
{
    let start = Instant::now();
    let StreamingChild { mut child, mut lines } = spawn_streaming(spec)?;

    let mut output = CapturedOutput::default();
    while let Some(line) = lines.recv().await {
        forward_output(events, &spec.label, &line);
        if line.stream == Stream::Stdout {
            on_stdout(&line.line);
        }
        output.push(line);
    }

    let status = child.wait().await?;
    let elapsed = start.elapsed();

    if !status.success() {
        return Err(SessionError::ToolFailed {
            command: spec.command.clone(),
            code: status.into(),
            output,
        });
    }

    Ok(CommandOutput { elapsed, output })
}

/// Forward one output line to the presentation layer.
pub(crate) fn forward_output(
    events: Option<&UnboundedSender<Event>>,
    label: &str,
    line: &OutputLine,
) {
    emit(
        events,
        Event::Output {
            branch: label.to_string(),
            line: line.line.clone(),
            is_stderr: line.stream == Stream::Stderr,
        },
    );
}

/// Send an event if the transmitter is present, ignoring send errors
/// (the receiver may have been dropped).
pub(crate) fn emit(tx: Option<&UnboundedSender<Event>>, event: Event) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
