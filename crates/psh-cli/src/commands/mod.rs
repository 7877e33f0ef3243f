//! CLI subcommand implementations.
//!
//! The client library blocks on the ssh process, so every remote operation
//! runs on tokio's blocking pool through [`blocking`].

pub mod browse;
pub mod cat;
pub mod exec;
pub mod glob;
pub mod ls;
pub mod new;
pub mod put;

use std::sync::Arc;

use anyhow::{Context, Result};
use psh_client::{Browser, ShellChannel};
use psh_core::{PathStack, PshError, PshResult, RemoteEndpoint, TransportConfig};

/// Run a blocking client call off the async runtime.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> PshResult<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .context("worker thread panicked")?;
    Ok(result?)
}

/// Parse a `[user@]host:path` argument.
pub fn endpoint(location: &str) -> Result<RemoteEndpoint> {
    RemoteEndpoint::parse(location).with_context(|| format!("bad location '{location}'"))
}

/// Connect and walk into `dir`, failing unless every folder on the way
/// could be entered.
pub fn open_browser(
    target: &str,
    dir: &str,
    config: &TransportConfig,
    show_hidden: bool,
) -> PshResult<Browser> {
    let channel = Arc::new(ShellChannel::connect(target, config)?);
    let wanted = PathStack::from_dir(dir);
    let browser = Browser::resume(channel, &wanted, show_hidden)?;
    if browser.current_path() != wanted.current_path() {
        return Err(PshError::InvalidPath(format!(
            "cannot enter {target}:{dir}"
        )));
    }
    Ok(browser)
}
