//! psh-core: Shared protocol library for the persistent remote shell.
//!
//! Provides sentinel generation and request framing, the error classifier,
//! the long-listing parser, shell quoting, target/path syntax and the
//! transport settings model. Nothing in this crate spawns processes.

pub mod classify;
pub mod config;
pub mod error;
pub mod listing;
pub mod path;
pub mod quote;
pub mod sentinel;

// Re-export commonly used items at crate root.
pub use classify::{classify, FailureKind, StderrText};
pub use config::{BrowseSettings, ConnectionReuse, HostKeyChecking, TransportConfig, TransportSettings};
pub use error::{PshError, PshResult};
pub use listing::{Entry, EntryKind, EntrySize, Listing, ListingWarning};
pub use path::{BrowseAction, NewPath, PathItem, PathStack, RemoteEndpoint};
pub use sentinel::{new_sentinel, SENTINEL_PREFIX};

/// Exit code reported when the transport itself failed rather than the remote command.
pub const TRANSPORT_FAILURE_CODE: i32 = 255;
