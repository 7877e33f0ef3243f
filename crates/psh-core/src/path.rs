//! Remote path model: the browse stack, target syntax, and new-path parsing.

use serde::{Deserialize, Serialize};

use crate::error::{PshError, PshResult};

/// A non-path choice offered while browsing a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowseAction {
    /// Open several files matching glob patterns.
    Glob,
    /// Create a new file or folder here.
    New,
}

/// One step of the browse stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathItem {
    /// A folder (`name/`) or file name as listed by `ls -p`.
    Entry(String),
    Action(BrowseAction),
}

impl PathItem {
    pub fn is_folder(&self) -> bool {
        matches!(self, PathItem::Entry(name) if name.ends_with('/'))
    }

    pub fn as_entry(&self) -> Option<&str> {
        match self {
            PathItem::Entry(name) => Some(name),
            PathItem::Action(_) => None,
        }
    }
}

/// The browsed path, one item per selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathStack {
    items: Vec<PathItem>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<PathItem>) -> Self {
        Self { items }
    }

    /// The stack for a folder path: `a/b` gives `a/`, `b/`; a leading `/`
    /// becomes its own item so absolute paths concatenate back unchanged.
    /// Paths under `~` are relative to home, like every other stack.
    pub fn from_dir(path: &str) -> Self {
        let path = if path == "~" {
            ""
        } else {
            path.strip_prefix("~/").unwrap_or(path)
        };
        let mut items = Vec::new();
        if path.starts_with('/') {
            items.push(PathItem::Entry("/".into()));
        }
        items.extend(
            path.split('/')
                .filter(|part| !part.is_empty())
                .map(|part| PathItem::Entry(format!("{part}/"))),
        );
        Self { items }
    }

    pub fn push(&mut self, item: PathItem) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<PathItem> {
        self.items.pop()
    }

    pub fn last(&self) -> Option<&PathItem> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&PathItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[PathItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether there is an item to pop. The leading `/` of an absolute
    /// stack stays put: there is nothing above the filesystem root.
    pub fn can_go_back(&self) -> bool {
        match self.items.as_slice() {
            [] => false,
            [PathItem::Entry(root)] => root != "/",
            _ => true,
        }
    }

    /// Concatenation of every entry: the current remote path relative to home.
    pub fn current_path(&self) -> String {
        self.items.iter().filter_map(PathItem::as_entry).collect()
    }

    /// Path of the folder holding the last item.
    pub fn parent_path(&self) -> String {
        let n = self.items.len().saturating_sub(1);
        self.items[..n].iter().filter_map(PathItem::as_entry).collect()
    }
}

/// Validate server input of the form `[user@]host:`.
pub fn is_server_syntax_ok(text: &str) -> bool {
    let Some(server) = text.strip_suffix(':') else {
        return false;
    };
    if text.len() <= 2 {
        return false;
    }
    match server.matches('@').count() {
        0 => true,
        1 => !server.starts_with('@') && !server.ends_with('@'),
        _ => false,
    }
}

/// Strip the trailing `:` from validated server input.
pub fn server_from_input(text: &str) -> PshResult<String> {
    if !is_server_syntax_ok(text) {
        return Err(PshError::InvalidTarget(format!(
            "'{text}' is not of the form [user@]host:"
        )));
    }
    Ok(text[..text.len() - 1].to_string())
}

/// Every space-separated pattern must contain a `*`.
pub fn is_glob_syntax_ok(text: &str) -> bool {
    !text.is_empty() && text.split(' ').all(|glob| glob.contains('*'))
}

/// A `[user@]host:path` endpoint. An empty path means the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub target: String,
    pub path: String,
}

impl RemoteEndpoint {
    pub fn parse(s: &str) -> PshResult<Self> {
        let colon = s
            .find(':')
            .ok_or_else(|| PshError::InvalidTarget(format!("'{s}' has no ':' after the host")))?;
        let target = &s[..colon];
        if target.contains('/') || target.contains('\\') {
            return Err(PshError::InvalidTarget(format!("'{s}' is a local path")));
        }
        server_from_input(&s[..=colon])?;
        Ok(Self {
            target: target.to_string(),
            path: s[colon + 1..].to_string(),
        })
    }
}

/// A path typed in to create: intermediate folders plus an optional file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPath {
    /// Folder components, each with a trailing `/`.
    pub folders: Vec<String>,
    /// File name, absent when the input ends with `/`.
    pub file: Option<String>,
}

impl NewPath {
    /// Parse `a/b/file.txt`. Leading or doubled slashes are rejected.
    pub fn parse(text: &str) -> PshResult<Self> {
        if text.is_empty() {
            return Err(PshError::InvalidPath("empty path".into()));
        }
        let mut parts: Vec<&str> = text.split('/').collect();
        let file = parts.pop().unwrap_or_default();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PshError::InvalidPath(format!(
                "'{text}' has an empty folder component"
            )));
        }
        Ok(Self {
            folders: parts.iter().map(|p| format!("{p}/")).collect(),
            file: (!file.is_empty()).then(|| file.to_string()),
        })
    }

    /// All folders joined, e.g. `a/b/`.
    pub fn folder_prefix(&self) -> String {
        self.folders.concat()
    }

    /// Human-readable description of what will be created.
    pub fn describe(&self) -> String {
        let mut text = String::new();
        if let Some(file) = &self.file {
            text.push_str(&format!("New File {{{file}}}"));
            if !self.folders.is_empty() {
                text.push_str(" in ");
            }
        }
        if !self.folders.is_empty() {
            let plural = if self.folders.len() > 1 { "s" } else { "" };
            text.push_str(&format!("New Folder{plural} {{{}}}", self.folder_prefix()));
        }
        text
    }
}
