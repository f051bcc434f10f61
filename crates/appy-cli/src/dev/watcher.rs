//! Polling file watcher with filtering and a bounded per-interval buffer.
//!
//! notify's `PollWatcher` scans the watched paths recursively. Events that
//! pass the [`PathFilter`] are collected in an [`EventBuffer`]; once per poll
//! interval the buffer is flushed into the channel returned by
//! [`FileWatcher::new`]. The buffer keeps only the most recent `max_events`
//! entries, so a burst of changes collapses to its newest events.

use crate::dev::PathFilter;
use crate::error::Result;
use notify::event::{EventKind, MetadataKind, ModifyKind};
use notify::{Config, Event, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl Op {
    /// Map a notify event kind; access and unknown events have no counterpart.
    pub fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Op::Create),
            EventKind::Remove(_) => Some(Op::Remove),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Op::Rename),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => Some(Op::Write),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(Op::Chmod),
            EventKind::Modify(_) => Some(Op::Write),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Create => "CREATE",
            Op::Write => "WRITE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Chmod => "CHMOD",
        };
        f.write_str(name)
    }
}

/// A filtered filesystem change, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: Op,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Whether the path contains `needle`. Empty needles never match.
    pub fn path_contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.path.to_string_lossy().contains(needle)
    }
}

/// Bounded FIFO that drops its oldest entry when full.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<WatchEvent>,
    capacity: usize,
    dropped: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: WatchEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Take every buffered event, oldest first, and the number dropped since
    /// the previous drain.
    pub fn drain(&mut self) -> (Vec<WatchEvent>, usize) {
        let dropped = std::mem::take(&mut self.dropped);
        (self.events.drain(..).collect(), dropped)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Message delivered to the dispatcher: a change, or an observer failure.
pub type WatchMessage = std::result::Result<WatchEvent, notify::Error>;

/// Recursive polling watcher over a fixed set of paths.
pub struct FileWatcher {
    watcher: PollWatcher,
    roots: Vec<PathBuf>,
    flusher: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `paths`.
    ///
    /// Paths that do not exist are skipped. Must be called inside a tokio
    /// runtime; the flush task runs on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watcher cannot be created or an
    /// existing path cannot be registered.
    pub fn new(
        paths: &[PathBuf],
        filter: PathFilter,
        poll_interval: Duration,
        max_events: usize,
    ) -> Result<(Self, mpsc::Receiver<WatchMessage>)> {
        let (tx, rx) = mpsc::channel(100);
        let buffer = Arc::new(Mutex::new(EventBuffer::new(max_events)));

        let handler_buffer = Arc::clone(&buffer);
        let error_tx = tx.clone();
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(op) = Op::from_kind(&event.kind) else {
                        return;
                    };
                    let mut buffer = handler_buffer.lock();
                    for path in event.paths {
                        if filter.matches(&path) {
                            buffer.push(WatchEvent::new(path, op));
                        }
                    }
                }
                Err(err) => {
                    // May run on the registering thread, so never block here.
                    let _ = error_tx.try_send(Err(err));
                }
            },
            Config::default().with_poll_interval(poll_interval),
        )?;

        let mut roots = Vec::new();
        for path in paths {
            if !path.exists() {
                debug!("skipping missing watch path {}", path.display());
                continue;
            }
            watcher.watch(path, RecursiveMode::Recursive)?;
            roots.push(path.clone());
        }

        let flusher = tokio::spawn(flush_loop(buffer, tx, poll_interval));

        Ok((
            Self {
                watcher,
                roots,
                flusher,
            },
            rx,
        ))
    }

    /// Paths actually registered.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Unregister every path and stop delivering events.
    pub fn close(mut self) {
        self.flusher.abort();
        for root in std::mem::take(&mut self.roots) {
            if let Err(err) = self.watcher.unwatch(&root) {
                debug!("failed to unwatch {}: {}", root.display(), err);
            }
        }
        debug!("file watcher closed");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.flusher.abort();
    }
}

async fn flush_loop(
    buffer: Arc<Mutex<EventBuffer>>,
    tx: mpsc::Sender<WatchMessage>,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let (events, dropped) = buffer.lock().drain();
        if dropped > 0 {
            debug!("dropped {} older file events", dropped);
        }
        for event in events {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }
    }
}

/// Render a path relative to `root` for log lines.
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;

    fn event(path: &str) -> WatchEvent {
        WatchEvent::new(path, Op::Write)
    }

    #[test]
    fn test_op_from_kind() {
        assert_eq!(Op::from_kind(&EventKind::Create(CreateKind::File)), Some(Op::Create));
        assert_eq!(Op::from_kind(&EventKind::Remove(RemoveKind::File)), Some(Op::Remove));
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(Op::Write)
        );
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))),
            Some(Op::Write)
        );
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(Op::Chmod)
        );
        assert_eq!(
            Op::from_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(Op::Rename)
        );
        assert_eq!(Op::from_kind(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_buffer_drops_oldest_when_full() {
        let mut buffer = EventBuffer::new(2);
        buffer.push(event("a.go"));
        buffer.push(event("b.go"));
        buffer.push(event("c.go"));

        assert_eq!(buffer.len(), 2);
        let (events, dropped) = buffer.drain();
        assert_eq!(dropped, 1);
        assert_eq!(events, vec![event("b.go"), event("c.go")]);
        assert!(buffer.is_empty());

        let (_, dropped) = buffer.drain();
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_buffer_capacity_is_at_least_one() {
        let mut buffer = EventBuffer::new(0);
        buffer.push(event("a.go"));
        buffer.push(event("b.go"));
        assert_eq!(buffer.drain().0, vec![event("b.go")]);
    }

    #[test]
    fn test_path_contains_ignores_empty_needle() {
        let e = event("/app/pkg/graphql/generated.go");
        assert!(e.path_contains("pkg/graphql/generated.go"));
        assert!(!e.path_contains(""));
    }

    #[test]
    fn test_display_relative() {
        let root = Path::new("/app");
        assert_eq!(display_relative(Path::new("/app/pkg/a.go"), root), "pkg/a.go");
        assert_eq!(display_relative(Path::new("/elsewhere/a.go"), root), "/elsewhere/a.go");
    }

    #[tokio::test]
    async fn test_watcher_delivers_only_allowed_extensions() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("pkg");
        fs::create_dir(&pkg).unwrap();

        let (watcher, mut rx) = FileWatcher::new(
            &[pkg.clone(), temp.path().join("missing")],
            PathFilter::new(["go"]),
            Duration::from_millis(50),
            10,
        )
        .unwrap();
        assert_eq!(watcher.roots(), &[pkg.clone()]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        fs::write(pkg.join("notes.md"), "ignored").unwrap();
        fs::write(pkg.join("main.go"), "package main").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should deliver an event")
            .expect("channel open")
            .expect("no watcher error");
        assert!(received.path.ends_with("main.go"));

        watcher.close();
    }
}
