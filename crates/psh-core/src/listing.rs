//! Parser for remote directory listings.
//!
//! The long form is `ls -1Lp -lgo` run under `LC_TIME=POSIX`, which gives
//! exactly seven whitespace-separated fields per entry: permissions, link
//! count, size, three date/time fields, and the name (which may itself
//! contain spaces). `-p` marks folders with a trailing `/`.

use std::fmt;

use serde::Serialize;

/// Short listing: one name per line, folders suffixed with `/`.
pub const SHORT_LISTING_COMMAND: &str = "/bin/ls -1Lp";

const LONG_FIELDS: usize = 7;

/// Long listing command, optionally including dotfiles.
pub fn long_listing_command(show_hidden: bool) -> String {
    if show_hidden {
        "/bin/ls -1Lp -lgo -A".to_string()
    } else {
        "/bin/ls -1Lp -lgo".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySize {
    /// File size in bytes.
    Bytes(u64),
    /// Number of sub-folders (link count minus `.` and the parent's entry).
    Subfolders(u64),
    /// The field could not be parsed; kept verbatim.
    Raw(String),
    /// The listing form carries no size.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Name as printed by `ls`, with the trailing `/` for folders.
    pub name: String,
    pub kind: EntryKind,
    pub size: EntrySize,
}

impl Entry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// A listing line that did not have the expected shape. The entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingWarning {
    pub line: String,
    pub fields: usize,
}

impl fmt::Display for ListingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized file info (skipping, {} fields): {}",
            self.fields, self.line
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub entries: Vec<Entry>,
    pub warnings: Vec<ListingWarning>,
}

impl Listing {
    pub fn has_files(&self) -> bool {
        self.entries.iter().any(|e| !e.is_folder())
    }
}

fn kind_of(name: &str) -> EntryKind {
    if name.ends_with('/') {
        EntryKind::Folder
    } else {
        EntryKind::File
    }
}

fn is_self_entry(name: &str) -> bool {
    name == "./"
}

/// Split on whitespace runs into at most `max` fields; the last keeps its inner spaces.
fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                fields.push(&rest[..i]);
                rest = rest[i..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

/// Parse the output of [`long_listing_command`].
pub fn parse_long(lines: &[String]) -> Listing {
    let mut listing = Listing::default();
    let body = match lines.first() {
        Some(first) if first.starts_with("total") => &lines[1..],
        _ => lines,
    };

    for line in body {
        let fields = split_fields(line, LONG_FIELDS);
        if fields.len() != LONG_FIELDS {
            listing.warnings.push(ListingWarning {
                line: line.clone(),
                fields: fields.len(),
            });
            continue;
        }

        let name = fields[6];
        if is_self_entry(name) {
            continue;
        }
        let kind = kind_of(name);
        let size = match kind {
            EntryKind::Folder => fields[1]
                .parse::<u64>()
                .map(|links| EntrySize::Subfolders(links.saturating_sub(2)))
                .unwrap_or_else(|_| EntrySize::Raw(fields[1].to_string())),
            EntryKind::File => fields[2]
                .parse::<u64>()
                .map(EntrySize::Bytes)
                .unwrap_or_else(|_| EntrySize::Raw(fields[2].to_string())),
        };
        listing.entries.push(Entry {
            name: name.to_string(),
            kind,
            size,
        });
    }
    listing
}

/// Parse the output of [`SHORT_LISTING_COMMAND`].
pub fn parse_short(lines: &[String]) -> Vec<Entry> {
    lines
        .iter()
        .filter(|name| !name.is_empty() && !is_self_entry(name))
        .map(|name| Entry {
            name: name.clone(),
            kind: kind_of(name),
            size: EntrySize::Unknown,
        })
        .collect()
}
