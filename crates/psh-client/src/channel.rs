//! The persistent shell channel.
//!
//! A [`ShellChannel`] owns one transport process and drives the remote shell
//! through its stdin and stdout. The stream has no framing, so every command
//! is followed by a `printf` of `$?` and a fresh sentinel; the response is
//! everything up to the line that equals that sentinel.
//!
//! State machine:
//!
//! ```text
//! Connecting ──► Ready ◄──► Executing
//!     │            │            │
//!     ▼            ▼            ▼
//!   Failed       Closed       Failed
//! ```
//!
//! `Failed` is absorbing: once the transport is lost no further writes are
//! attempted, and every later call reports the loss without touching the pipe.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use psh_core::classify::{classify, StderrText};
use psh_core::config::TransportConfig;
use psh_core::sentinel::{
    command_request, is_sentinel_line, new_sentinel, split_status, strip_blob, trim_line_ending,
};
use psh_core::{PshError, PshResult, TRANSPORT_FAILURE_CODE};
use tracing::{debug, info, warn};

use crate::drain::{StderrDrain, DEFAULT_TAIL_CAPACITY};
use crate::launcher::{spawn_piped, status_code, SshCommand, Transport};

/// Commands run once after the transport comes up. Running them through the
/// ordinary request path also swallows any login banner on stdout.
const SETUP_COMMANDS: &[&str] = &["export LC_TIME=POSIX"];

/// How long [`ShellChannel::close`] waits for `exit` before terminating.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const FAILED_CONNECT_CLOSE_TIMEOUT: Duration = Duration::from_millis(250);
const EXIT_POLL_GRACE: Duration = Duration::from_millis(250);
const TERM_GRACE: Duration = Duration::from_millis(500);
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Ready,
    Executing,
    Closed,
    Failed,
}

/// What a command call does when the transport dies underneath it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnFailure {
    /// Return a result whose status is [`CommandStatus::TransportLost`].
    #[default]
    Report,
    /// Return `Err(PshError::Transport)` with the classified message.
    Abort,
}

/// How a submitted command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The remote shell reported this `$?`.
    Exited(i32),
    /// The transport died before the sentinel arrived. `code` is the
    /// transport's exit code, 255 when the OS did not report one.
    TransportLost { code: i32, stderr: String },
}

impl CommandStatus {
    pub fn code(&self) -> i32 {
        match self {
            CommandStatus::Exited(code) => *code,
            CommandStatus::TransportLost { code, .. } => *code,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, CommandStatus::Exited(0))
    }

    pub fn is_transport_lost(&self) -> bool {
        matches!(self, CommandStatus::TransportLost { .. })
    }
}

/// Line-mode result. Lines are decoded lossily and carry no line endings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub lines: Vec<String>,
    pub status: CommandStatus,
}

impl CommandResult {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Raw-mode result: the command's stdout byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResult {
    pub bytes: Vec<u8>,
    pub status: CommandStatus,
}

/// Cloneable kill switch for a channel's transport.
///
/// There is no per-command timeout; a caller that wants one kills the
/// transport from another thread, and the blocked call returns a transport loss.
#[derive(Clone)]
pub struct TransportHandle {
    child: Arc<Mutex<Child>>,
}

impl TransportHandle {
    pub fn kill(&self) -> PshResult<()> {
        let mut child = lock(&self.child);
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill()?;
        debug!(pid = child.id(), "transport killed");
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        matches!(lock(&self.child).try_wait(), Ok(None))
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: ChannelState,
    exit_code: Option<i32>,
}

struct Io {
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// Held until connect succeeds and the drain takes it over.
    stderr: Option<ChildStderr>,
    drain: Option<StderrDrain>,
    closed: bool,
}

enum Liveness {
    Running,
    Exited(Option<i32>),
}

enum Response {
    Complete(Vec<Vec<u8>>),
    Lost {
        partial: Vec<Vec<u8>>,
        code: i32,
        stderr: String,
    },
}

enum Outcome {
    Complete(Vec<Vec<u8>>),
    Lost { partial: Vec<Vec<u8>>, cause: String },
}

/// A long-lived remote shell session.
///
/// Calls block the calling thread. The I/O state sits behind a mutex, so
/// concurrent callers sharing an `Arc<ShellChannel>` are served one at a time.
pub struct ShellChannel {
    label: String,
    child: Arc<Mutex<Child>>,
    status: Mutex<Status>,
    io: Mutex<Io>,
}

impl ShellChannel {
    /// Open a shell on `target` (`[user@]host`) through ssh.
    pub fn connect(target: &str, config: &TransportConfig) -> PshResult<Self> {
        Self::connect_command(SshCommand::new(target, config).command(), target)
    }

    /// Open a shell by running `command` as the transport.
    ///
    /// `command` must start a POSIX shell reading from stdin. `label` names
    /// the session in logs and error messages.
    pub fn connect_command(command: Command, label: impl Into<String>) -> PshResult<Self> {
        let label = label.into();
        info!(session = %label, "connecting");

        let Transport {
            child,
            stdin,
            stdout,
            stderr,
        } = spawn_piped(command).map_err(|e| PshError::Connect {
            target: label.clone(),
            message: classify(
                &format!("Failed to start the transport for {label}"),
                None,
                Some(&StderrText::Text(e.to_string())),
            ),
        })?;

        let channel = Self {
            label,
            child: Arc::new(Mutex::new(child)),
            status: Mutex::new(Status {
                state: ChannelState::Connecting,
                exit_code: None,
            }),
            io: Mutex::new(Io {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
                stderr: Some(stderr),
                drain: None,
                closed: false,
            }),
        };

        let setup = channel.run_cmd(&SETUP_COMMANDS.join("; "));
        let failed_code = match &setup {
            Err(_) => Some(TRANSPORT_FAILURE_CODE),
            Ok(result) if result.status.is_transport_lost() => Some(result.status.code()),
            Ok(result) if result.status.code() == TRANSPORT_FAILURE_CODE => {
                Some(TRANSPORT_FAILURE_CODE)
            }
            Ok(_) if !channel.is_alive() => Some(TRANSPORT_FAILURE_CODE),
            Ok(_) => None,
        };

        if let Some(code) = failed_code {
            return Err(channel.fail_connect(code));
        }

        {
            let mut io = lock(&channel.io);
            if let Some(stderr) = io.stderr.take() {
                io.drain = Some(StderrDrain::spawn_pipe(stderr, DEFAULT_TAIL_CAPACITY)?);
            }
        }
        channel.set_state(ChannelState::Ready);
        info!(session = %channel.label, "connected");
        Ok(channel)
    }

    fn fail_connect(&self, reported: i32) -> PshError {
        self.set_state(ChannelState::Failed);
        let mut io = lock(&self.io);
        let (code, stderr) = self.shutdown(&mut io, FAILED_CONNECT_CLOSE_TIMEOUT);
        let code = code.unwrap_or(reported);
        let message = classify(
            &format!("Failed to connect to {}", self.label),
            Some(code),
            Some(&StderrText::Bytes(stderr)),
        );
        warn!(session = %self.label, code, "connect failed");
        PshError::Connect {
            target: self.label.clone(),
            message,
        }
    }

    /// Run `command` in line mode, reporting transport loss in the result.
    pub fn run_cmd(&self, command: &str) -> PshResult<CommandResult> {
        self.run_cmd_with(command, OnFailure::Report)
    }

    /// Run `command` in line mode with an explicit failure policy.
    pub fn run_cmd_with(&self, command: &str, on_failure: OnFailure) -> PshResult<CommandResult> {
        match self.submit(command, on_failure)? {
            Response::Complete(raw) => {
                let (lines, code) = split_status(decode_lines(&raw))?;
                self.record_exit(code);
                Ok(CommandResult {
                    lines,
                    status: CommandStatus::Exited(code),
                })
            }
            Response::Lost {
                partial,
                code,
                stderr,
            } => Ok(CommandResult {
                lines: decode_lines(&partial),
                status: CommandStatus::TransportLost { code, stderr },
            }),
        }
    }

    /// Run `command` and return its stdout verbatim.
    pub fn run_cmd_raw(&self, command: &str, on_failure: OnFailure) -> PshResult<RawResult> {
        match self.submit(command, on_failure)? {
            Response::Complete(raw) => {
                let (bytes, code) = strip_blob(raw.concat())?;
                self.record_exit(code);
                Ok(RawResult {
                    bytes,
                    status: CommandStatus::Exited(code),
                })
            }
            Response::Lost {
                partial,
                code,
                stderr,
            } => Ok(RawResult {
                bytes: partial.concat(),
                status: CommandStatus::TransportLost { code, stderr },
            }),
        }
    }

    fn submit(&self, command: &str, on_failure: OnFailure) -> PshResult<Response> {
        let mut io = lock(&self.io);
        if io.closed {
            return Err(PshError::ChannelClosed);
        }

        let outcome = if self.state() == ChannelState::Failed {
            Outcome::Lost {
                partial: Vec::new(),
                cause: "transport already failed".into(),
            }
        } else if let Liveness::Exited(_) = self.poll() {
            Outcome::Lost {
                partial: Vec::new(),
                cause: "transport exited".into(),
            }
        } else {
            let sentinel = new_sentinel();
            let request = command_request(command, &sentinel);
            debug!(session = %self.label, command, "submit");

            let entered = self.begin();
            let outcome = match write_request(&mut io, &request) {
                Ok(()) => read_response(&mut io.stdout, &sentinel),
                Err(e) => Outcome::Lost {
                    partial: Vec::new(),
                    cause: format!("write failed: {e}"),
                },
            };
            if let Outcome::Complete(_) = outcome {
                self.finish(entered);
            }
            outcome
        };

        match outcome {
            Outcome::Complete(lines) => Ok(Response::Complete(lines)),
            Outcome::Lost { partial, cause } => {
                let (code, stderr) = self.lose(&mut io, &cause);
                match on_failure {
                    OnFailure::Report => Ok(Response::Lost {
                        partial,
                        code,
                        stderr,
                    }),
                    OnFailure::Abort => Err(PshError::Transport(classify(
                        &format!("Connection to {} lost", self.label),
                        Some(code),
                        Some(&StderrText::Text(stderr)),
                    ))),
                }
            }
        }
    }

    /// Mark the transport dead and collect what is known about why.
    fn lose(&self, io: &mut Io, cause: &str) -> (i32, String) {
        let first = self.state() != ChannelState::Failed;
        self.set_state(ChannelState::Failed);
        io.stdin = None;

        let code = self
            .wait_for_exit(EXIT_POLL_GRACE)
            .unwrap_or(TRANSPORT_FAILURE_CODE);
        self.record_exit(code);

        let tail = match &io.drain {
            Some(drain) => {
                drain.wait_finished(EXIT_POLL_GRACE);
                drain.tail()
            }
            None => Vec::new(),
        };
        let text = StderrText::Bytes(tail).normalized();
        let stderr = if text.is_empty() {
            format!("connection lost: {cause}")
        } else {
            text
        };

        if first {
            warn!(session = %self.label, code, cause, "transport lost");
        }
        (code, stderr)
    }

    /// Whether the transport process is still running, by fresh OS poll.
    pub fn is_alive(&self) -> bool {
        match self.state() {
            ChannelState::Closed | ChannelState::Failed => false,
            _ => matches!(self.poll(), Liveness::Running),
        }
    }

    /// The last exit code seen: a command's `$?`, or the transport's own.
    pub fn exit_code(&self) -> Option<i32> {
        lock(&self.status).exit_code
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.status).state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            child: Arc::clone(&self.child),
        }
    }

    /// Shut the session down. Returns the transport's exit code if known.
    ///
    /// Sends `exit`, waits up to `timeout` (default [`DEFAULT_CLOSE_TIMEOUT`]),
    /// then escalates to SIGTERM and finally SIGKILL. Calling it again is a no-op.
    pub fn close(&self, timeout: Option<Duration>) -> Option<i32> {
        let mut io = lock(&self.io);
        if io.closed {
            return self.exit_code();
        }
        let (code, _) = self.shutdown(&mut io, timeout.unwrap_or(DEFAULT_CLOSE_TIMEOUT));
        code
    }

    fn shutdown(&self, io: &mut Io, timeout: Duration) -> (Option<i32>, Vec<u8>) {
        io.closed = true;

        if let Some(mut stdin) = io.stdin.take() {
            if let Liveness::Running = self.poll() {
                if let Err(e) = stdin.write_all(b"exit\n").and_then(|()| stdin.flush()) {
                    debug!(session = %self.label, error = %e, "could not send exit");
                }
            }
        }

        let mut code = self.wait_for_exit(timeout);
        if code.is_none() {
            warn!(session = %self.label, "transport did not exit, terminating");
            if let Err(e) = terminate(&mut lock(&self.child)) {
                debug!(error = %e, "SIGTERM failed");
            }
            code = self.wait_for_exit(TERM_GRACE);
        }
        if code.is_none() {
            let mut child = lock(&self.child);
            if let Err(e) = child.kill() {
                debug!(error = %e, "kill failed");
            }
            code = match child.wait() {
                Ok(status) => status_code(status),
                Err(_) => None,
            };
        }

        let stderr = match (io.drain.take(), io.stderr.take()) {
            (Some(drain), _) => drain.join_timeout(DRAIN_JOIN_TIMEOUT),
            (None, Some(stderr)) => match StderrDrain::spawn_pipe(stderr, DEFAULT_TAIL_CAPACITY) {
                Ok(drain) => drain.join_timeout(DRAIN_JOIN_TIMEOUT),
                Err(_) => Vec::new(),
            },
            (None, None) => Vec::new(),
        };

        let mut status = lock(&self.status);
        if let Some(code) = code {
            status.exit_code = Some(code);
        }
        if status.state != ChannelState::Failed {
            status.state = ChannelState::Closed;
        }
        info!(session = %self.label, code = ?code, "closed");
        (code, stderr)
    }

    fn poll(&self) -> Liveness {
        match lock(&self.child).try_wait() {
            Ok(None) => Liveness::Running,
            Ok(Some(status)) => Liveness::Exited(status_code(status)),
            Err(e) => {
                debug!(error = %e, "try_wait failed");
                Liveness::Exited(None)
            }
        }
    }

    /// Poll until the process exits or `timeout` passes.
    fn wait_for_exit(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Liveness::Exited(code) = self.poll() {
                return code.or(Some(TRANSPORT_FAILURE_CODE));
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn set_state(&self, state: ChannelState) {
        lock(&self.status).state = state;
    }

    fn record_exit(&self, code: i32) {
        lock(&self.status).exit_code = Some(code);
    }

    fn begin(&self) -> bool {
        let mut status = lock(&self.status);
        if status.state == ChannelState::Ready {
            status.state = ChannelState::Executing;
            true
        } else {
            false
        }
    }

    fn finish(&self, entered: bool) {
        let mut status = lock(&self.status);
        if entered && status.state == ChannelState::Executing {
            status.state = ChannelState::Ready;
        }
    }
}

impl Drop for ShellChannel {
    fn drop(&mut self) {
        self.close(None);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_request(io: &mut Io, request: &[u8]) -> io::Result<()> {
    let stdin = io
        .stdin
        .as_mut()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))?;
    stdin.write_all(request)?;
    stdin.flush()
}

fn read_response(stdout: &mut BufReader<ChildStdout>, sentinel: &str) -> Outcome {
    let mut lines = Vec::new();
    loop {
        let mut line = Vec::new();
        match stdout.read_until(b'\n', &mut line) {
            Ok(0) => {
                return Outcome::Lost {
                    partial: lines,
                    cause: "end of stream before sentinel".into(),
                }
            }
            Ok(_) if is_sentinel_line(&line, sentinel) => return Outcome::Complete(lines),
            Ok(_) => lines.push(line),
            Err(e) => {
                return Outcome::Lost {
                    partial: lines,
                    cause: format!("read failed: {e}"),
                }
            }
        }
    }
}

fn decode_lines(raw: &[Vec<u8>]) -> Vec<String> {
    raw.iter()
        .map(|line| String::from_utf8_lossy(trim_line_ending(line)).into_owned())
        .collect()
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accessors() {
        assert!(CommandStatus::Exited(0).success());
        assert!(!CommandStatus::Exited(1).success());
        assert_eq!(CommandStatus::Exited(3).code(), 3);

        let lost = CommandStatus::TransportLost {
            code: 255,
            stderr: "connection lost".into(),
        };
        assert!(lost.is_transport_lost());
        assert!(!lost.success());
        assert_eq!(lost.code(), 255);
    }

    #[test]
    fn default_policy_reports() {
        assert_eq!(OnFailure::default(), OnFailure::Report);
    }

    #[test]
    fn decode_strips_line_endings() {
        let raw = vec![b"a\r\n".to_vec(), b"\xff\n".to_vec(), b"tail".to_vec()];
        assert_eq!(decode_lines(&raw), vec!["a", "\u{fffd}", "tail"]);
    }

    #[test]
    fn result_text_joins_lines() {
        let result = CommandResult {
            lines: vec!["x".into(), "y".into()],
            status: CommandStatus::Exited(0),
        };
        assert_eq!(result.text(), "x\ny");
    }
}
