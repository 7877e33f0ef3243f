//! `psh ls user@host:path` — long listing of a remote folder.

use anyhow::Result;
use psh_client::{remote, ShellChannel};
use psh_core::{Entry, EntrySize, Listing};
use tracing::warn;

use crate::commands::{blocking, endpoint};
use crate::config::Settings;

pub async fn run(location: &str, json: bool, all: bool, settings: &Settings) -> Result<()> {
    let endpoint = endpoint(location)?;
    let show_hidden = all || settings.browse.show_hidden;
    let config = settings.transport.clone();

    let listing = blocking(move || {
        let channel = ShellChannel::connect(&endpoint.target, &config)?;
        remote::go_to(&channel, &endpoint.path)?;
        remote::list_dir(&channel, show_hidden)
    })
    .await?;

    for warning in &listing.warnings {
        warn!("{}", warning);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print!("{}", render(&listing));
    }
    Ok(())
}

fn render(listing: &Listing) -> String {
    listing
        .entries
        .iter()
        .map(|entry| format!("{:>10}  {}\n", size_column(entry), entry.name))
        .collect()
}

fn size_column(entry: &Entry) -> String {
    match &entry.size {
        EntrySize::Bytes(n) => format_size(*n),
        EntrySize::Subfolders(1) => "1 dir".to_string(),
        EntrySize::Subfolders(n) => format!("{n} dirs"),
        EntrySize::Raw(text) => text.clone(),
        EntrySize::Unknown => "-".to_string(),
    }
}

/// Format a byte count as a human-readable string.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
