//! Folder-by-folder navigation over a shared channel.
//!
//! The shell's working directory follows the browse stack: entering a folder
//! runs `cd`, going back out of one runs `cd ..`. Besides entries, each folder
//! offers actions, dispatched through [`ACTION_TABLE`].

use std::sync::Arc;

use psh_core::path::is_glob_syntax_ok;
use psh_core::{BrowseAction, Entry, ListingWarning, NewPath, PathItem, PathStack, PshError, PshResult};

use crate::channel::ShellChannel;
use crate::remote;

/// What a completed action produced. Paths are relative to the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Files to open.
    Files(Vec<String>),
    /// Folders created (`folder` may equal the current folder) and an
    /// optional empty file.
    Created { folder: String, file: Option<String> },
}

/// One row of the action dispatch table.
pub struct ActionSpec {
    pub action: BrowseAction,
    pub label: &'static str,
    pub preview: &'static str,
    pub placeholder: &'static str,
    pub validate: fn(&str) -> bool,
    pub run: fn(&mut Browser, &str) -> PshResult<ActionOutcome>,
}

pub static ACTION_TABLE: &[ActionSpec] = &[
    ActionSpec {
        action: BrowseAction::Glob,
        label: "Glob",
        preview: "Open every file in this folder matching space-separated patterns",
        placeholder: "*.c *.h",
        validate: is_glob_syntax_ok,
        run: run_glob,
    },
    ActionSpec {
        action: BrowseAction::New,
        label: "New",
        preview: "Create a file or folders here; end with / for folders only",
        placeholder: "notes/todo.txt",
        validate: validate_new,
        run: run_new,
    },
];

pub fn action_spec(action: BrowseAction) -> &'static ActionSpec {
    // Every BrowseAction has a row.
    ACTION_TABLE
        .iter()
        .find(|spec| spec.action == action)
        .unwrap_or(&ACTION_TABLE[0])
}

fn validate_new(input: &str) -> bool {
    NewPath::parse(input).is_ok()
}

fn run_glob(browser: &mut Browser, patterns: &str) -> PshResult<ActionOutcome> {
    let folder = browser.stack.parent_path();
    let names = remote::glob(&browser.channel, patterns)?;
    tracing::debug!("glob '{}' matched {} file(s)", patterns, names.len());
    Ok(ActionOutcome::Files(
        names.into_iter().map(|name| format!("{folder}{name}")).collect(),
    ))
}

fn run_new(browser: &mut Browser, input: &str) -> PshResult<ActionOutcome> {
    let new_path = NewPath::parse(input)?;
    let folder = format!("{}{}", browser.stack.parent_path(), new_path.folder_prefix());
    if !new_path.folders.is_empty() {
        remote::make_dirs(&browser.channel, &folder)?;
    }
    let file = match &new_path.file {
        Some(name) => {
            let path = format!("{folder}{name}");
            remote::create_file(&browser.channel, &path)?;
            Some(path)
        }
        None => None,
    };
    tracing::info!("{}", new_path.describe());
    Ok(ActionOutcome::Created { folder, file })
}

/// A listed folder with the actions it offers.
#[derive(Debug, Clone)]
pub struct FolderView {
    /// Current path relative to home, with a trailing `/` unless at home.
    pub path: String,
    pub entries: Vec<Entry>,
    pub actions: Vec<BrowseAction>,
    pub warnings: Vec<ListingWarning>,
}

/// Result of picking an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Entered a folder; list again.
    Folder,
    /// Picked a file at this path.
    File(String),
}

pub struct Browser {
    channel: Arc<ShellChannel>,
    stack: PathStack,
    show_hidden: bool,
}

impl Browser {
    /// Start browsing at the home directory.
    pub fn new(channel: Arc<ShellChannel>, show_hidden: bool) -> PshResult<Self> {
        remote::go_to(&channel, "")?;
        Ok(Self {
            channel,
            stack: PathStack::new(),
            show_hidden,
        })
    }

    /// Resume a saved stack, entering each saved folder in turn.
    ///
    /// Stops at the first folder that can no longer be entered, or at the
    /// first non-folder item.
    pub fn resume(channel: Arc<ShellChannel>, saved: &PathStack, show_hidden: bool) -> PshResult<Self> {
        let mut browser = Self::new(channel, show_hidden)?;
        for item in saved.items() {
            let Some(name) = item.as_entry().filter(|_| item.is_folder()) else {
                break;
            };
            if let Err(e) = remote::change_dir(&browser.channel, name) {
                tracing::warn!("cannot resume into {}: {}", name, e);
                break;
            }
            browser.stack.push(item.clone());
        }
        Ok(browser)
    }

    pub fn stack(&self) -> &PathStack {
        &self.stack
    }

    pub fn channel(&self) -> &Arc<ShellChannel> {
        &self.channel
    }

    pub fn current_path(&self) -> String {
        self.stack.current_path()
    }

    /// List the current folder.
    pub fn list(&self) -> PshResult<FolderView> {
        let listing = remote::list_dir(&self.channel, self.show_hidden)?;
        let mut actions = Vec::new();
        if listing.has_files() {
            actions.push(BrowseAction::Glob);
        }
        actions.push(BrowseAction::New);
        Ok(FolderView {
            path: self.stack.current_path(),
            entries: listing.entries,
            actions,
            warnings: listing.warnings,
        })
    }

    /// Pick an entry by its listed name (folders end in `/`).
    pub fn select(&mut self, name: &str) -> PshResult<Selection> {
        if name == "../" {
            self.back()?;
            return Ok(Selection::Folder);
        }
        if name.ends_with('/') {
            remote::change_dir(&self.channel, name)?;
            self.stack.push(PathItem::Entry(name.to_string()));
            return Ok(Selection::Folder);
        }
        self.stack.push(PathItem::Entry(name.to_string()));
        Ok(Selection::File(self.stack.current_path()))
    }

    /// Pop the last item, leaving the folder if it was one. At home or at
    /// the filesystem root there is nothing to pop.
    pub fn back(&mut self) -> PshResult<Option<PathItem>> {
        if !self.stack.can_go_back() {
            return Ok(None);
        }
        if self.stack.last().is_some_and(PathItem::is_folder) {
            remote::change_dir_up(&self.channel)?;
        }
        Ok(self.stack.pop())
    }

    /// Push an action onto the stack and return its table row.
    pub fn start_action(&mut self, action: BrowseAction) -> &'static ActionSpec {
        self.stack.push(PathItem::Action(action));
        action_spec(action)
    }

    /// Validate `input` and run the pending action. On success the action
    /// item is popped again; on failure it stays so the input can be retried.
    pub fn run_action(&mut self, input: &str) -> PshResult<ActionOutcome> {
        let Some(PathItem::Action(action)) = self.stack.last().cloned() else {
            return Err(PshError::Other("no action in progress".into()));
        };
        let spec = action_spec(action);
        if !(spec.validate)(input) {
            return Err(match action {
                BrowseAction::Glob => PshError::InvalidGlob(format!(
                    "every pattern in '{input}' must contain '*'"
                )),
                BrowseAction::New => PshError::InvalidPath(format!("'{input}' is not a valid new path")),
            });
        }
        let outcome = (spec.run)(self, input)?;
        self.stack.pop();
        Ok(outcome)
    }
}
