//! Mount-tree watcher
//!
//! Watching is an optimisation on top of the periodic scan: a burst of
//! writes under the mount path wakes the scheduler early once it has been
//! quiet for the debounce window. Every cycle is still a full scan, so a
//! missed or dropped event only delays a file until the next interval.
//!
//! ```text
//!  inotify ──→ FileWatcher ──→ mpsc ──→ DebouncedChangeQueue ──→ CycleScheduler
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// Capacity of the watcher channel; events beyond it are dropped
const CHANNEL_CAPACITY: usize = 1024;

/// A change under the mount path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Created or modified
    Written(PathBuf),
    Removed(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    /// The path the change leaves behind (the destination for moves)
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Written(p) | ChangeEvent::Removed(p) => p,
            ChangeEvent::Moved { to, .. } => to,
        }
    }

    /// Whether this change can produce an upload
    ///
    /// Removals are never propagated, so they do not warrant an early cycle.
    pub fn wants_sync(&self) -> bool {
        !matches!(self, ChangeEvent::Removed(_))
    }
}

/// Recursive watcher over the mount path
///
/// Dropping the watcher stops delivery and closes the channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// # Errors
    /// Fails when the OS watcher cannot be initialised
    pub fn new() -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        // Full channel means a cycle is already pending
                        if tx.try_send(change).is_err() {
                            trace!("Change channel full or closed, event dropped");
                        }
                    }
                }
                Err(err) => error!(error = %err, "File watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok((Self { watcher }, rx))
    }

    /// # Errors
    /// Fails when the path does not exist or the inotify limit is reached
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        info!(path = %path.display(), "Watching mount path");
        Ok(())
    }
}

fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let first = event.paths.first()?.clone();

    let change = match &event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) => {
            ChangeEvent::Written(first)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.get(1) {
            Some(to) => ChangeEvent::Moved {
                from: first,
                to: to.clone(),
            },
            None => ChangeEvent::Written(first),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeEvent::Removed(first),
        EventKind::Modify(_) => ChangeEvent::Written(first),
        EventKind::Remove(_) => ChangeEvent::Removed(first),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
    };

    trace!(?change, "Mapped notify event");
    Some(change)
}

/// Coalesces bursts of changes per path
///
/// A path settles once no event has touched it for the debounce window;
/// each new event on the path restarts its window.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (ChangeEvent, Instant)>,
    debounce: Duration,
}

impl DebouncedChangeQueue {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce,
        }
    }

    pub fn push(&mut self, event: ChangeEvent) {
        let path = event.path().to_path_buf();
        self.pending.insert(path, (event, Instant::now()));
    }

    /// Remove and return every settled change
    pub fn poll(&mut self) -> Vec<ChangeEvent> {
        let now = Instant::now();
        let debounce = self.debounce;
        let mut settled = Vec::new();

        self.pending.retain(|_, (event, at)| {
            if now.duration_since(*at) >= debounce {
                settled.push(event.clone());
                false
            } else {
                true
            }
        });

        if !settled.is_empty() {
            debug!(count = settled.len(), pending = self.pending.len(), "Changes settled");
        }
        settled
    }

    /// Drop everything pending; a full scan is about to cover it
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
