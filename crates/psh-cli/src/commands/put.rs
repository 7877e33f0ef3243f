//! `psh put local user@host:path` — upload a file with a one-shot `cat >`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use psh_client::remote;
use tracing::info;

use crate::commands::{blocking, endpoint};
use crate::config::Settings;

pub async fn run(local: &Path, location: &str, settings: &Settings) -> Result<()> {
    let endpoint = endpoint(location)?;
    if endpoint.path.is_empty() || endpoint.path.ends_with('/') {
        bail!("'{location}' names a folder; give the destination file name");
    }
    let content = tokio::fs::read(local)
        .await
        .with_context(|| format!("failed to read {}", local.display()))?;
    let size = content.len();
    let config = settings.transport.clone();

    blocking(move || remote::oneshot_write(&endpoint.target, &endpoint.path, &content, &config)).await?;
    info!("uploaded {} ({} bytes) to {}", local.display(), size, location);
    Ok(())
}
