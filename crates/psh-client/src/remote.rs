//! Remote filesystem operations.
//!
//! Most operations run over an open [`ShellChannel`]. The one-shot
//! functions start a fresh ssh process per call instead; with connection
//! reuse enabled that costs little, and file contents never pass through the
//! sentinel framing.

use std::io::Write;
use std::process::Stdio;
use std::thread;

use psh_core::classify::{classify, FailureKind, StderrText};
use psh_core::config::TransportConfig;
use psh_core::listing::{long_listing_command, parse_long, parse_short, SHORT_LISTING_COMMAND};
use psh_core::path::is_glob_syntax_ok;
use psh_core::quote::{quote, remote_path};
use psh_core::sentinel::file_read_command;
use psh_core::{Entry, Listing, PshError, PshResult};

use crate::channel::{CommandResult, CommandStatus, OnFailure, ShellChannel};
use crate::launcher::{status_code, SshCommand};

/// Exit codes below this from `ls` mean some entries had problems but the
/// listing itself is usable.
const LS_SERIOUS_TROUBLE: i32 = 2;

/// Contents of a file read over the shared shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub bytes: Vec<u8>,
    /// False when the transport died mid-read; `bytes` holds what arrived.
    pub complete: bool,
    pub warning: Option<String>,
}

fn run(channel: &ShellChannel, command: &str) -> PshResult<CommandResult> {
    channel.run_cmd_with(command, OnFailure::Abort)
}

fn remote_failure(title: &str, result: &CommandResult) -> PshError {
    let code = result.status.code();
    PshError::RemoteCommand {
        code,
        message: classify(title, Some(code), Some(&StderrText::Text(result.text()))),
    }
}

/// Long listing of the shell's current directory.
pub fn list_dir(channel: &ShellChannel, show_hidden: bool) -> PshResult<Listing> {
    let result = run(channel, &long_listing_command(show_hidden))?;
    let code = result.status.code();
    if code >= LS_SERIOUS_TROUBLE {
        return Err(remote_failure("Failed to list folder", &result));
    }
    if code != 0 {
        tracing::warn!("ls exited {} in {}, listing may be partial", code, channel.label());
    }
    let listing = parse_long(&result.lines);
    for warning in &listing.warnings {
        tracing::warn!("{}", warning);
    }
    Ok(listing)
}

/// Names only: folders end in `/`, no sizes.
pub fn list_names(channel: &ShellChannel) -> PshResult<Vec<Entry>> {
    let result = run(channel, SHORT_LISTING_COMMAND)?;
    if result.status.code() >= LS_SERIOUS_TROUBLE {
        return Err(remote_failure("Failed to list folder", &result));
    }
    Ok(parse_short(&result.lines))
}

/// Files in the current directory matching space-separated `patterns`.
///
/// Patterns are passed to the shell unquoted so it expands them; each one
/// must contain a `*`. Folders are filtered out. No match is an empty list.
pub fn glob(channel: &ShellChannel, patterns: &str) -> PshResult<Vec<String>> {
    if !is_glob_syntax_ok(patterns) {
        return Err(PshError::InvalidGlob(format!(
            "every pattern in '{patterns}' must contain '*'"
        )));
    }
    let command = format!("/bin/ls -1Lpd -- {patterns} 2>/dev/null | grep -v '/$'");
    let result = run(channel, &command)?;
    match result.status.code() {
        // grep exits 1 when nothing matched
        0 | 1 => Ok(result.lines.into_iter().filter(|l| !l.is_empty()).collect()),
        _ => Err(remote_failure("Failed to expand glob", &result)),
    }
}

fn cd(channel: &ShellChannel, target: &str, shown: &str) -> PshResult<()> {
    let result = run(channel, &format!("cd -- {target} 2>&1"))?;
    if !result.status.success() {
        return Err(remote_failure(&format!("Failed to enter {shown}"), &result));
    }
    tracing::debug!("{}: cd {}", channel.label(), shown);
    Ok(())
}

/// Enter `name`, relative to the shell's current directory.
pub fn change_dir(channel: &ShellChannel, name: &str) -> PshResult<()> {
    cd(channel, &quote(name), name)
}

pub fn change_dir_up(channel: &ShellChannel) -> PshResult<()> {
    cd(channel, "..", "..")
}

/// Move the shell to `path`, relative to home unless absolute. Empty means home.
pub fn go_to(channel: &ShellChannel, path: &str) -> PshResult<()> {
    if path.is_empty() {
        return cd(channel, "~", "~");
    }
    cd(channel, &remote_path(path)?, path)
}

/// The shell's current directory.
pub fn working_dir(channel: &ShellChannel) -> PshResult<String> {
    let result = run(channel, "pwd")?;
    if !result.status.success() {
        return Err(remote_failure("Failed to get working directory", &result));
    }
    Ok(result.text())
}

/// Whether `path` exists on the remote host.
pub fn exists(channel: &ShellChannel, path: &str) -> PshResult<bool> {
    let command = format!("/bin/ls -d -- {} >/dev/null 2>&1", remote_path(path)?);
    Ok(run(channel, &command)?.status.success())
}

/// `mkdir -p` on the remote host.
pub fn make_dirs(channel: &ShellChannel, path: &str) -> PshResult<()> {
    let result = run(channel, &format!("mkdir -p -- {} 2>&1", remote_path(path)?))?;
    if !result.status.success() {
        return Err(remote_failure(&format!("Failed to create {path}"), &result));
    }
    tracing::info!("created folder {} on {}", path, channel.label());
    Ok(())
}

/// Create an empty file unless something already exists at `path`.
pub fn create_file(channel: &ShellChannel, path: &str) -> PshResult<()> {
    let quoted = remote_path(path)?;
    let result = run(channel, &format!("[ -e {quoted} ] || : > {quoted} 2>&1"))?;
    if !result.status.success() {
        return Err(remote_failure(&format!("Failed to create {path}"), &result));
    }
    Ok(())
}

/// Read a whole file through the shared shell.
///
/// A transport loss mid-read is not an error: whatever arrived is returned
/// with `complete: false` and a warning so the caller can keep it read-only.
pub fn read_file(channel: &ShellChannel, path: &str) -> PshResult<FileContents> {
    let command = file_read_command(&remote_path(path)?);
    let result = channel.run_cmd_raw(&command, OnFailure::Report)?;
    match result.status {
        CommandStatus::Exited(0) => {
            tracing::debug!("read {} bytes from {}", result.bytes.len(), path);
            Ok(FileContents {
                bytes: result.bytes,
                complete: true,
                warning: None,
            })
        }
        CommandStatus::Exited(code) => {
            // Raw output has no room for stderr; run the read again for the message alone.
            let detail = run(channel, &format!("{command} 2>&1 >/dev/null"))?;
            Err(PshError::RemoteCommand {
                code,
                message: classify(
                    &format!("Failed to read {path}"),
                    Some(code),
                    Some(&StderrText::Text(detail.text())),
                ),
            })
        }
        CommandStatus::TransportLost { code, stderr } => {
            let warning = classify(
                &format!("Connection lost while reading {path}"),
                Some(code),
                Some(&StderrText::Text(stderr)),
            );
            tracing::warn!("{}", warning);
            Ok(FileContents {
                bytes: result.bytes,
                complete: false,
                warning: Some(warning),
            })
        }
    }
}

fn oneshot_failure(title: &str, code: Option<i32>, stderr: Vec<u8>) -> PshError {
    let message = classify(title, code, Some(&StderrText::Bytes(stderr)));
    match (FailureKind::from_code(code), code) {
        (FailureKind::RemoteCommand, Some(code)) => PshError::RemoteCommand { code, message },
        _ => PshError::Transport(message),
    }
}

/// Read a file with its own ssh process (`ssh <target> cat <path>`).
///
/// A missing file reads as empty, so a new file can be opened for editing.
pub fn oneshot_read(target: &str, path: &str, config: &TransportConfig) -> PshResult<Vec<u8>> {
    let mut ssh = SshCommand::new(target, config);
    ssh.remote_command(file_read_command(&remote_path(path)?));
    let output = ssh.command().output()?;
    let code = status_code(output.status);

    if output.status.success() {
        return Ok(output.stdout);
    }
    if code == Some(1)
        && String::from_utf8_lossy(&output.stderr).contains("No such file or directory")
    {
        tracing::info!("{}:{} does not exist yet, starting empty", target, path);
        return Ok(Vec::new());
    }
    Err(oneshot_failure(
        &format!("Failed to read {target}:{path}"),
        code,
        output.stderr,
    ))
}

/// Check that `path` exists with its own ssh process.
pub fn oneshot_exists(target: &str, path: &str, config: &TransportConfig) -> PshResult<bool> {
    let mut ssh = SshCommand::new(target, config);
    ssh.remote_command(format!("/bin/ls -d -- {} >/dev/null", remote_path(path)?));
    let output = ssh.command().output()?;
    match status_code(output.status) {
        Some(0) => Ok(true),
        code if FailureKind::from_code(code) == FailureKind::RemoteCommand => Ok(false),
        code => Err(oneshot_failure(
            &format!("Failed to check {target}:{path}"),
            code,
            output.stderr,
        )),
    }
}

/// Write `content` to a remote file with its own ssh process.
pub fn oneshot_write(
    target: &str,
    path: &str,
    content: &[u8],
    config: &TransportConfig,
) -> PshResult<()> {
    let mut ssh = SshCommand::new(target, config);
    ssh.remote_command(format!("cat > {}", remote_path(path)?));
    let mut child = ssh
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = child.stdin.take();
    let output = thread::scope(|scope| {
        scope.spawn(move || {
            if let Some(mut stdin) = stdin {
                // An early exit shows up in the status below.
                let _ = stdin.write_all(content);
            }
        });
        child.wait_with_output()
    })?;

    if output.status.success() {
        tracing::info!("wrote {} bytes to {}:{}", content.len(), target, path);
        return Ok(());
    }
    Err(oneshot_failure(
        &format!("Failed to write {target}:{path}"),
        status_code(output.status),
        output.stderr,
    ))
}
