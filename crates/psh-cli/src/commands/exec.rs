//! `psh exec user@host command` — run one command in a persistent shell.
//!
//! Connects, runs the command through the sentinel protocol, prints its
//! output and returns the remote exit code. A timeout or Ctrl-C kills the
//! transport; the blocked call then comes back as a transport loss.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use psh_client::{CommandResult, CommandStatus, ShellChannel};
use psh_core::path::server_from_input;
use psh_core::{classify, StderrText};
use tracing::{info, warn};

use crate::commands::blocking;
use crate::config::Settings;

enum Stop {
    TimedOut(u64),
    Interrupted,
}

async fn deadline(timeout: Option<u64>) {
    match timeout {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

/// Execute a remote command and print its output. Returns the remote exit code.
pub async fn run(
    target: &str,
    command: &[String],
    timeout: Option<u64>,
    settings: &Settings,
) -> Result<i32> {
    let target = server_from_input(&format!("{target}:"))?;
    let command = command.join(" ");
    info!(host = %target, command = %command, "exec");

    let channel = {
        let target = target.clone();
        let config = settings.transport.clone();
        Arc::new(blocking(move || ShellChannel::connect(&target, &config)).await?)
    };
    let handle = channel.handle();

    let mut task = {
        let channel = Arc::clone(&channel);
        let command = command.clone();
        tokio::task::spawn_blocking(move || channel.run_cmd(&command))
    };

    let stop = tokio::select! {
        joined = &mut task => {
            let result = joined.context("worker thread panicked")??;
            print_lines(&result)?;
            close(channel).await;
            return finish(&target, result.status);
        }
        _ = deadline(timeout) => Stop::TimedOut(timeout.unwrap_or_default()),
        _ = tokio::signal::ctrl_c() => Stop::Interrupted,
    };

    warn!(host = %target, "stopping '{}'", command);
    handle.kill()?;
    let result = task.await.context("worker thread panicked")??;
    print_lines(&result)?;
    close(channel).await;

    match stop {
        Stop::TimedOut(secs) => bail!("'{command}' timed out after {secs}s on {target}"),
        Stop::Interrupted => bail!("'{command}' interrupted"),
    }
}

fn print_lines(result: &CommandResult) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for line in &result.lines {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()?;
    Ok(())
}

fn finish(target: &str, status: CommandStatus) -> Result<i32> {
    match status {
        CommandStatus::Exited(code) => Ok(code),
        CommandStatus::TransportLost { code, stderr } => bail!(classify(
            &format!("Connection to {target} lost"),
            Some(code),
            Some(&StderrText::Text(stderr)),
        )),
    }
}

async fn close(channel: Arc<ShellChannel>) {
    // A panic here would only lose the close code.
    let _ = tokio::task::spawn_blocking(move || channel.close(None)).await;
}
