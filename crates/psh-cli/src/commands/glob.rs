//! `psh glob user@host:dir patterns` — list the files in a folder matching
//! space-separated glob patterns.
//!
//! Matching files are printed one per line, relative to the home directory
//! (absolute when `dir` is). The folder and patterns become the browse state.

use anyhow::Result;
use psh_client::ActionOutcome;
use psh_core::{BrowseAction, PshError};

use crate::commands::{blocking, endpoint, open_browser};
use crate::config::Settings;

pub async fn run(location: &str, patterns: &str, settings: &Settings) -> Result<()> {
    let endpoint = endpoint(location)?;
    let target = endpoint.target.clone();
    let config = settings.transport.clone();
    let show_hidden = settings.browse.show_hidden;
    let input = patterns.to_string();

    let (files, stack) = blocking(move || {
        let mut browser = open_browser(&endpoint.target, &endpoint.path, &config, show_hidden)?;
        browser.start_action(BrowseAction::Glob);
        match browser.run_action(&input)? {
            ActionOutcome::Files(files) => Ok((files, browser.stack().clone())),
            other => Err(PshError::Other(format!("unexpected glob outcome {other:?}"))),
        }
    })
    .await?;

    if files.is_empty() {
        eprintln!("psh: no files match '{patterns}'");
    }
    for file in &files {
        println!("{file}");
    }

    let mut state = settings.load_state();
    state.visit(&target, stack);
    state.glob = Some(patterns.to_string());
    settings.save_state(&state);
    Ok(())
}
