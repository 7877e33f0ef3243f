//! `psh browse [user@]host` — interactive folder browser.
//!
//! Each folder is shown as a selection list: `../`, the entries, then the
//! actions the folder offers. Picking a file prints it; actions prompt for
//! their input with the table's placeholder as a hint. The position is saved
//! on exit and restored by the next browse of the same host.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use psh_client::{remote, ActionOutcome, Browser, Selection, ShellChannel};
use psh_core::path::{is_server_syntax_ok, server_from_input};
use psh_core::{BrowseAction, PathStack, PshError};
use tracing::{info, warn};

use crate::config::{Settings, State};

/// One row of the folder menu.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Choice {
    Up,
    Entry(String),
    Action(BrowseAction),
    Quit,
}

fn menu(has_parent: bool, names: &[String], actions: &[BrowseAction]) -> Vec<Choice> {
    let mut choices = Vec::with_capacity(names.len() + actions.len() + 2);
    if has_parent {
        choices.push(Choice::Up);
    }
    choices.extend(names.iter().cloned().map(Choice::Entry));
    choices.extend(actions.iter().copied().map(Choice::Action));
    choices.push(Choice::Quit);
    choices
}

fn label(choice: &Choice) -> String {
    match choice {
        Choice::Up => "../".to_string(),
        Choice::Entry(name) => name.clone(),
        Choice::Action(action) => {
            let spec = psh_client::browser::action_spec(*action);
            format!("[{}] {}", spec.label, spec.preview)
        }
        Choice::Quit => "[Quit]".to_string(),
    }
}

pub async fn run(target: Option<&str>, settings: &Settings) -> Result<()> {
    let state = settings.load_state();
    let target = target.map(str::to_string);
    let settings = settings.clone();

    tokio::task::spawn_blocking(move || browse(target, state, &settings))
        .await
        .context("browser thread panicked")?
}

fn ask_server(theme: &ColorfulTheme, last: Option<&str>) -> Result<String> {
    let mut input = Input::<String>::with_theme(theme)
        .with_prompt("Server ([user@]host:)")
        .validate_with(|text: &String| {
            if is_server_syntax_ok(text) {
                Ok(())
            } else {
                Err("expected [user@]host:")
            }
        });
    if let Some(last) = last {
        input = input.default(format!("{last}:"));
    }
    let text = input.interact_text().context("failed to read user input")?;
    Ok(server_from_input(&text)?)
}

fn browse(target: Option<String>, mut state: State, settings: &Settings) -> Result<()> {
    let theme = ColorfulTheme::default();
    let target = match target {
        Some(target) => server_from_input(&format!("{target}:"))?,
        None => ask_server(&theme, state.server.as_deref())?,
    };

    let channel = Arc::new(ShellChannel::connect(&target, &settings.transport)?);
    let saved = state.path_on(&target).cloned().unwrap_or_default();
    let mut browser = Browser::resume(channel, &saved, settings.browse.show_hidden)?;
    info!("browsing {} from '{}'", target, browser.current_path());

    let result = browse_loop(&theme, &target, &mut browser, &mut state);
    state.visit(&target, folders_only(browser.stack()));
    settings.save_state(&state);
    browser.channel().close(None);
    result
}

/// The stack without a trailing file or pending action.
fn folders_only(stack: &PathStack) -> PathStack {
    PathStack::from_items(
        stack
            .items()
            .iter()
            .take_while(|item| item.is_folder())
            .cloned()
            .collect(),
    )
}

fn browse_loop(
    theme: &ColorfulTheme,
    target: &str,
    browser: &mut Browser,
    state: &mut State,
) -> Result<()> {
    loop {
        let view = browser.list()?;
        for warning in &view.warnings {
            warn!("{}", warning);
        }
        let names: Vec<String> = view.entries.iter().map(|e| e.name.clone()).collect();
        let choices = menu(browser.stack().can_go_back(), &names, &view.actions);
        let labels: Vec<String> = choices.iter().map(label).collect();

        let picked = Select::with_theme(theme)
            .with_prompt(format!("{target}:{}", view.path))
            .items(&labels)
            .default(0)
            .interact()
            .context("failed to read user input")?;

        match &choices[picked] {
            Choice::Quit => return Ok(()),
            Choice::Up => {
                browser.back()?;
            }
            Choice::Entry(name) => match browser.select(name) {
                Ok(Selection::Folder) => {}
                Ok(Selection::File(path)) => {
                    show_file(browser, &path)?;
                    browser.back()?;
                }
                Err(e) if e.is_transport() => return Err(e.into()),
                Err(e) => eprintln!("psh: {e}"),
            },
            Choice::Action(action) => run_action(theme, browser, *action, state)?,
        }
    }
}

fn run_action(
    theme: &ColorfulTheme,
    browser: &mut Browser,
    action: BrowseAction,
    state: &mut State,
) -> Result<()> {
    let spec = browser.start_action(action);
    let validate = spec.validate;
    let mut input = Input::<String>::with_theme(theme)
        .with_prompt(format!("{} (e.g. {}, empty to cancel)", spec.label, spec.placeholder))
        .allow_empty(true)
        .validate_with(move |text: &String| {
            if text.is_empty() || validate(text) {
                Ok(())
            } else {
                Err("invalid input")
            }
        });
    if let (BrowseAction::Glob, Some(last)) = (action, state.glob.as_deref()) {
        input = input.with_initial_text(last);
    }
    let text = input.interact_text().context("failed to read user input")?;
    if text.is_empty() {
        browser.back()?;
        return Ok(());
    }

    match browser.run_action(&text) {
        Ok(ActionOutcome::Files(files)) => {
            state.glob = Some(text);
            if files.is_empty() {
                eprintln!("psh: nothing matched");
            }
            for file in files {
                show_file(browser, &file)?;
            }
        }
        Ok(ActionOutcome::Created { folder, file }) => {
            eprintln!("created {}", file.unwrap_or(folder));
        }
        Err(e) if e.is_transport() => return Err(e.into()),
        Err(e) => {
            eprintln!("psh: {e}");
            browser.back()?;
        }
    }
    Ok(())
}

fn show_file(browser: &Browser, path: &str) -> Result<()> {
    let contents = match remote::read_file(browser.channel(), path) {
        Ok(contents) => contents,
        Err(e @ PshError::RemoteCommand { .. }) => {
            eprintln!("psh: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    eprintln!("==> {path} <==");
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&contents.bytes)?;
    stdout.flush()?;
    if let Some(warning) = contents.warning {
        anyhow::bail!(warning);
    }
    Ok(())
}
