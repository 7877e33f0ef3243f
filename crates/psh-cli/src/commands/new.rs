//! `psh new user@host:dir path` — create folders and an optional empty file.

use anyhow::Result;
use psh_client::ActionOutcome;
use psh_core::{BrowseAction, NewPath};

use crate::commands::{blocking, endpoint, open_browser};
use crate::config::Settings;

pub async fn run(location: &str, path: &str, settings: &Settings) -> Result<()> {
    let new_path = NewPath::parse(path)?;
    let endpoint = endpoint(location)?;
    let target = endpoint.target.clone();
    let config = settings.transport.clone();
    let show_hidden = settings.browse.show_hidden;
    let input = path.to_string();

    let (outcome, stack) = blocking(move || {
        let mut browser = open_browser(&endpoint.target, &endpoint.path, &config, show_hidden)?;
        browser.start_action(BrowseAction::New);
        let outcome = browser.run_action(&input)?;
        Ok((outcome, browser.stack().clone()))
    })
    .await?;

    if let ActionOutcome::Created { folder, file } = outcome {
        println!("{}", file.unwrap_or(folder));
    }
    eprintln!("{}", new_path.describe());

    let mut state = settings.load_state();
    state.visit(&target, stack);
    settings.save_state(&state);
    Ok(())
}
