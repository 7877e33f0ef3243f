//! Builds and spawns the `ssh` transport process.
//!
//! Owns no protocol logic: it turns a target and a [`TransportConfig`] into a
//! `std::process::Command` with the right non-interactive and connection-reuse
//! options, and spawns it with all three standard streams piped.

use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use psh_core::config::{ConnectionReuse, HostKeyChecking, TransportConfig};
use psh_core::{PshError, PshResult};
use tracing::debug;

/// Builder for an `ssh` invocation.
#[derive(Debug, Clone)]
pub struct SshCommand {
    program: String,
    target: String,
    options: Vec<String>,
    remote_command: Option<String>,
}

impl SshCommand {
    /// An interactive-shell invocation of `target` (`[user@]host`).
    pub fn new(target: impl Into<String>, config: &TransportConfig) -> Self {
        Self {
            program: config.program.clone(),
            target: target.into(),
            options: transport_args(config),
            remote_command: None,
        }
    }

    /// Run a single remote command instead of an interactive shell.
    pub fn remote_command(&mut self, command: impl Into<String>) -> &mut Self {
        self.remote_command = Some(command.into());
        self
    }

    /// Full argument list after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        args.push(self.target.clone());
        if let Some(command) = &self.remote_command {
            args.push(command.clone());
        }
        args
    }

    /// The `Command` to spawn. Standard streams are left for the caller to set.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args());
        hide_console_window(&mut command);
        debug!(program = %self.program, args = ?self.args(), "transport command");
        command
    }
}

/// ssh options derived from the configuration.
///
/// `-T` is always present: the remote shell is driven non-interactively and
/// without it ssh complains that it cannot allocate a tty.
pub fn transport_args(config: &TransportConfig) -> Vec<String> {
    let mut args = vec!["-T".to_string()];
    if !config.use_config_defaults {
        return args;
    }

    let mut option = |value: String| {
        args.push("-o".to_string());
        args.push(value);
    };

    // Batch mode means no password or passphrase prompts.
    option("BatchMode=yes".into());

    if let Some(mode) = config.host_key_checking {
        option(format!("StrictHostKeyChecking={}", mode.as_str()));
        if mode == HostKeyChecking::No {
            option("UserKnownHostsFile=/dev/null".into());
        }
    }

    if let Some(timeout) = config.connect_timeout {
        option(format!("ConnectTimeout={timeout}"));
    }

    if let ConnectionReuse::Persist(duration) = &config.reuse {
        option(format!("ControlPath={}", config.control_path));
        option("ControlMaster=auto".into());
        option(format!("ControlPersist={duration}"));
    }

    args
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}

/// A spawned transport with its three pipes split out of the child handle.
pub struct Transport {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn any command as a transport.
pub fn spawn_piped(mut command: Command) -> PshResult<Transport> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| {
        PshError::Other(format!(
            "failed to start {:?}: {e}",
            command.get_program()
        ))
    })?;

    let missing = |what: &str| PshError::Other(format!("transport did not expose {what}"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    debug!(pid = child.id(), "transport spawned");
    Ok(Transport {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Exit code of a finished process; a signal `n` is reported as `-n`.
pub fn status_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(-signal);
        }
    }
    None
}
