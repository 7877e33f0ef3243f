//! psh-client: Drives a persistent remote shell over the system `ssh` client.
//!
//! Spawns the transport, frames commands with sentinels, drains stderr in the
//! background, and builds remote file operations, the open strategy and the
//! folder browser on top of one [`ShellChannel`].

pub mod browser;
pub mod channel;
pub mod drain;
pub mod launcher;
pub mod registry;
pub mod remote;

pub use browser::{ActionOutcome, ActionSpec, Browser, FolderView, Selection, ACTION_TABLE};
pub use channel::{
    ChannelState, CommandResult, CommandStatus, OnFailure, RawResult, ShellChannel,
    TransportHandle, DEFAULT_CLOSE_TIMEOUT,
};
pub use launcher::SshCommand;
pub use registry::{open_files, open_strategy, OpenStrategy, OpenedFile, SessionRegistry};
pub use remote::FileContents;
