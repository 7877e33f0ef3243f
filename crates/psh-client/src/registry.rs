//! Buffer-to-channel registry and the open strategy.
//!
//! Opening several remote files at once registers each pending buffer against
//! one shared channel; each buffer's entry is removed the first time it loads.

use std::collections::HashMap;
use std::sync::Arc;

use psh_core::config::{BrowseSettings, TransportConfig};
use psh_core::{PshError, PshResult};
use tracing::{debug, info, warn};

use crate::channel::ShellChannel;
use crate::remote::{self, FileContents};

/// Identifies a local buffer waiting for remote content.
pub type BufferId = u64;

/// How a set of files gets opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStrategy {
    /// Read every file through one persistent shell.
    SharedShell,
    /// One `ssh <target> cat` per file. A file containing a line that looks
    /// like a sentinel can never truncate a one-shot read.
    OneShot,
}

/// Several files, or any file without connection reuse, go through the shared shell.
pub fn open_strategy(paths: usize, config: &TransportConfig) -> OpenStrategy {
    if paths > 1 || !config.reuse_enabled() {
        OpenStrategy::SharedShell
    } else {
        OpenStrategy::OneShot
    }
}

/// Pending buffers and the channel each will load from.
#[derive(Default)]
pub struct SessionRegistry {
    pending: HashMap<BufferId, (Arc<ShellChannel>, String)>,
    next_id: BufferId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer for `path` on `channel`, returning its id.
    pub fn register(&mut self, channel: Arc<ShellChannel>, path: impl Into<String>) -> BufferId {
        let id = self.next_id;
        self.next_id += 1;
        let path = path.into();
        debug!("buffer {} pending for {}:{}", id, channel.label(), path);
        self.pending.insert(id, (channel, path));
        id
    }

    /// Remove a buffer without loading it.
    pub fn take(&mut self, buffer: BufferId) -> Option<(Arc<ShellChannel>, String)> {
        self.pending.remove(&buffer)
    }

    pub fn is_pending(&self, buffer: BufferId) -> bool {
        self.pending.contains_key(&buffer)
    }

    /// No buffers left to load. A failed load should only be surfaced to the
    /// user when this is true, otherwise one dead channel reports once per file.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Load a pending buffer, removing it from the registry.
    ///
    /// The channel is dropped with the entry; the last buffer to load from a
    /// shared channel closes it.
    pub fn load(&mut self, buffer: BufferId) -> PshResult<FileContents> {
        let (channel, path) = self
            .take(buffer)
            .ok_or_else(|| PshError::Other(format!("buffer {buffer} is not pending")))?;
        remote::read_file(&channel, &path)
    }
}

/// A file opened by [`open_files`].
#[derive(Debug)]
pub struct OpenedFile {
    pub path: String,
    pub contents: PshResult<FileContents>,
}

/// Open `paths` on `target` with whichever strategy fits.
///
/// Connect failures are returned directly. Per-file failures are attached to
/// each [`OpenedFile`]; after a shared-shell batch only the last failure is
/// logged at warn level.
pub fn open_files(
    target: &str,
    paths: &[String],
    config: &TransportConfig,
    browse: &BrowseSettings,
) -> PshResult<Vec<OpenedFile>> {
    let strategy = open_strategy(paths.len(), config);
    info!("opening {} file(s) on {} via {:?}", paths.len(), target, strategy);

    match strategy {
        OpenStrategy::OneShot => Ok(paths
            .iter()
            .map(|path| OpenedFile {
                path: path.clone(),
                contents: oneshot_open(target, path, config, browse),
            })
            .collect()),
        OpenStrategy::SharedShell => {
            let channel = Arc::new(ShellChannel::connect(target, config)?);
            let mut registry = SessionRegistry::new();
            let ids: Vec<(BufferId, String)> = paths
                .iter()
                .map(|path| (registry.register(Arc::clone(&channel), path.clone()), path.clone()))
                .collect();
            drop(channel);

            Ok(ids
                .into_iter()
                .map(|(id, path)| {
                    let contents = shared_open(&mut registry, id, &path, browse);
                    if let Err(e) = &contents {
                        if registry.is_idle() {
                            warn!("{}", e);
                        } else {
                            debug!("load of {} failed: {}", path, e);
                        }
                    }
                    OpenedFile { path, contents }
                })
                .collect())
        }
    }
}

fn oneshot_open(
    target: &str,
    path: &str,
    config: &TransportConfig,
    browse: &BrowseSettings,
) -> PshResult<FileContents> {
    if browse.check_path_exists && !remote::oneshot_exists(target, path, config)? {
        return Err(missing(target, path));
    }
    Ok(FileContents {
        bytes: remote::oneshot_read(target, path, config)?,
        complete: true,
        warning: None,
    })
}

fn shared_open(
    registry: &mut SessionRegistry,
    buffer: BufferId,
    path: &str,
    browse: &BrowseSettings,
) -> PshResult<FileContents> {
    if browse.check_path_exists {
        let channel = registry.pending.get(&buffer).map(|(c, _)| Arc::clone(c));
        if let Some(channel) = channel {
            let found = remote::exists(&channel, path);
            if !matches!(found, Ok(true)) {
                registry.take(buffer);
                return Err(found.err().unwrap_or_else(|| missing(channel.label(), path)));
            }
        }
    }
    registry.load(buffer)
}

fn missing(target: &str, path: &str) -> PshError {
    PshError::InvalidPath(format!("{target}:{path} does not exist"))
}
