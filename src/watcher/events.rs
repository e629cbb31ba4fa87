//! File system event types and sources.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatcherError;
use crate::Result;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    /// Permissions, timestamps and other metadata.
    Metadata,
    /// Access and anything the backend cannot classify.
    Other,
}

impl ChangeKind {
    /// Whether this kind can change file contents or existence.
    #[must_use]
    pub fn is_content_change(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Write | Self::Remove | Self::Rename
        )
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Metadata,
            EventKind::Modify(_) => Self::Write,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

/// A change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FsEvent {
    /// Create an event.
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Item delivered by an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Change(FsEvent),
    /// Backend error; the source keeps running.
    Error(String),
}

/// Receiving end of an event source.
pub type EventReceiver = mpsc::UnboundedReceiver<SourceEvent>;

/// Sending end of an event source.
pub type EventSender = mpsc::UnboundedSender<SourceEvent>;

/// Registers directories with a change-notification backend.
///
/// Events flow through the [`EventReceiver`] handed out when the source is
/// created. Closing the source releases every registration and ends the
/// event stream once pending events are drained.
pub trait EventSource: Send + 'static {
    /// Watch the direct children of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the directory.
    fn watch(&mut self, dir: &Path) -> Result<()>;

    /// Release every registration. Idempotent.
    fn close(&mut self);
}

/// Event source backed by `notify`.
pub struct NotifySource {
    watcher: Option<RecommendedWatcher>,
    watched: Vec<PathBuf>,
}

impl NotifySource {
    /// Create the backend and its event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new() -> Result<(Self, EventReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            forward(&tx, result);
        })
        .map_err(|e| WatcherError::watch_failed(Path::new("init"), e))?;

        Ok((
            Self {
                watcher: Some(watcher),
                watched: Vec::new(),
            },
            rx,
        ))
    }
}

impl EventSource for NotifySource {
    fn watch(&mut self, dir: &Path) -> Result<()> {
        let watcher = self
            .watcher
            .as_mut()
            .ok_or_else(|| WatcherError::watch_failed(dir, "source is closed"))?;

        if !dir.is_dir() {
            return Err(WatcherError::watch_failed(dir, "directory does not exist").into());
        }

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::watch_failed(dir, e))?;

        self.watched.push(dir.to_path_buf());
        tracing::debug!(path = %dir.display(), "Watching directory");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for dir in self.watched.drain(..) {
                if let Err(e) = watcher.unwatch(&dir) {
                    tracing::debug!(path = %dir.display(), error = %e, "Unwatch failed");
                }
            }
        }
    }
}

impl Drop for NotifySource {
    fn drop(&mut self) {
        self.close();
    }
}

fn forward(tx: &EventSender, result: notify::Result<notify::Event>) {
    match result {
        Ok(event) => {
            let kind = ChangeKind::from(&event.kind);
            for path in event.paths {
                // The receiver is gone once the watcher shuts down.
                let _ = tx.send(SourceEvent::Change(FsEvent { path, kind }));
            }
        }
        Err(e) => {
            let _ = tx.send(SourceEvent::Error(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from(&EventKind::Create(CreateKind::File)),
            ChangeKind::Create
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            ChangeKind::Write
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            ChangeKind::Rename
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Modify(ModifyKind::Metadata(
                MetadataKind::Permissions
            ))),
            ChangeKind::Metadata
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Remove(RemoveKind::File)),
            ChangeKind::Remove
        );
        assert_eq!(
            ChangeKind::from(&EventKind::Access(AccessKind::Any)),
            ChangeKind::Other
        );
    }

    #[test]
    fn test_content_change_kinds() {
        assert!(ChangeKind::Create.is_content_change());
        assert!(ChangeKind::Write.is_content_change());
        assert!(ChangeKind::Remove.is_content_change());
        assert!(ChangeKind::Rename.is_content_change());
        assert!(!ChangeKind::Metadata.is_content_change());
        assert!(!ChangeKind::Other.is_content_change());
    }

    #[test]
    fn test_forward_splits_paths() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/w/old.go"))
            .add_path(PathBuf::from("/w/new.go"));

        forward(&tx, Ok(event));
        forward(&tx, Err(notify::Error::generic("queue overflow")));

        assert_eq!(
            rx.try_recv().unwrap(),
            SourceEvent::Change(FsEvent::new("/w/old.go", ChangeKind::Rename))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SourceEvent::Change(FsEvent::new("/w/new.go", ChangeKind::Rename))
        );
        assert!(matches!(rx.try_recv().unwrap(), SourceEvent::Error(_)));
    }

    #[test]
    fn test_notify_source_watch_and_close() {
        let tmp = TempDir::new().unwrap();
        let (mut source, _rx) = NotifySource::new().unwrap();

        source.watch(tmp.path()).unwrap();
        assert_eq!(source.watched, vec![tmp.path().to_path_buf()]);

        source.close();
        assert!(source.watched.is_empty());
        assert!(source.watch(tmp.path()).is_err());
    }

    #[test]
    fn test_notify_source_nonexistent_dir() {
        let (mut source, _rx) = NotifySource::new().unwrap();
        assert!(source.watch(Path::new("/nonexistent/directory")).is_err());
    }

    #[tokio::test]
    async fn test_close_ends_event_stream() {
        let (mut source, mut rx) = NotifySource::new().unwrap();
        source.close();
        assert!(rx.recv().await.is_none());
    }
}
