//! Debounced change watcher.
//!
//! A single intake task reads events and classifies them on the blocking
//! pool through the [`FileClassifier`], collecting workspace-relative file
//! paths. Each accepted event re-arms one quiet timer; when it fires the
//! pending set is taken under the lock and handed to the [`BatchHandler`]
//! after the lock is released, so intake never waits on a slow handler.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{ChangeKind, EventReceiver, EventSource, NotifySource, SourceEvent};
use super::filter::FileClassifier;
use super::handler::BatchHandler;
use super::metrics;
use super::scanner::{relevant_dirs, walk_source_tree};
use crate::config::{Config, DEFAULT_DEBOUNCE};
use crate::language::LanguageRegistry;
use crate::Result;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before pending changes are flushed.
    pub debounce: Duration,
    /// Register watches for directories created after startup.
    pub watch_new_dirs: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            watch_new_dirs: true,
        }
    }
}

/// Observable watcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    /// Nothing pending.
    Idle,
    /// Paths pending and the quiet timer armed.
    Accumulating,
    /// Shut down; no further batches.
    Closed,
}

/// Statistics for a watch session.
#[derive(Debug, Default)]
pub struct WatcherStats {
    /// Events read from the source.
    pub events_received: AtomicU64,
    /// Events dropped by kind, ignore status, location or because they
    /// name a directory.
    pub events_discarded: AtomicU64,
    /// Batches handed to the handler.
    pub batches_flushed: AtomicU64,
    /// Paths across all flushed batches.
    pub paths_flushed: AtomicU64,
    /// Errors reported by the source.
    pub source_errors: AtomicU64,
    /// Directories currently registered.
    pub dirs_watched: AtomicU64,
}

impl WatcherStats {
    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            paths_flushed: self.paths_flushed.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            dirs_watched: self.dirs_watched.load(Ordering::Relaxed),
        }
    }

    fn discard(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
        metrics::EVENTS_DISCARDED.inc();
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    /// Events read from the source.
    pub events_received: u64,
    /// Events dropped before reaching a batch.
    pub events_discarded: u64,
    /// Batches handed to the handler.
    pub batches_flushed: u64,
    /// Paths across all flushed batches.
    pub paths_flushed: u64,
    /// Errors reported by the source.
    pub source_errors: u64,
    /// Directories currently registered.
    pub dirs_watched: u64,
}

/// Largest number of queued events classified in one blocking call.
const CLASSIFY_CHUNK: usize = 256;

#[derive(Default)]
struct WatchState {
    pending: BTreeSet<PathBuf>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    closed: bool,
}

struct Shared {
    classifier: FileClassifier,
    handler: Arc<dyn BatchHandler>,
    config: WatcherConfig,
    cancel: CancellationToken,
    state: Mutex<WatchState>,
    // Serializes handler calls; never held together with `state`.
    dispatch: tokio::sync::Mutex<()>,
    registrations: Mutex<Registrations>,
    stats: WatcherStats,
}

/// The event source and the directories registered with it.
struct Registrations {
    source: Box<dyn EventSource>,
    dirs: BTreeSet<PathBuf>,
}

/// Debounced watcher over a workspace.
///
/// Dropping the watcher closes it.
pub struct ChangeWatcher {
    shared: Arc<Shared>,
    intake: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Scan the workspace, register watches and start the intake task.
    ///
    /// Must be called inside a Tokio runtime. The scan and registration
    /// block the caller. On failure every registered watch is released.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan or any registration fails.
    pub fn new<S>(
        config: WatcherConfig,
        classifier: FileClassifier,
        mut source: S,
        events: EventReceiver,
        handler: Arc<dyn BatchHandler>,
        cancel: &CancellationToken,
    ) -> Result<Self>
    where
        S: EventSource,
    {
        let root = classifier.workspace_root().to_path_buf();

        let dirs = match register_initial(&root, &classifier, &mut source) {
            Ok(dirs) => dirs,
            Err(e) => {
                source.close();
                tracing::error!(path = %root.display(), error = %e, "Failed to start watcher");
                return Err(e);
            }
        };

        let shared = Arc::new(Shared {
            classifier,
            handler,
            config,
            cancel: cancel.child_token(),
            state: Mutex::new(WatchState::default()),
            dispatch: tokio::sync::Mutex::new(()),
            registrations: Mutex::new(Registrations {
                source: Box::new(source),
                dirs,
            }),
            stats: WatcherStats::default(),
        });
        let registered = shared.registrations.lock().dirs.len() as u64;
        shared.track_watched(registered);

        tracing::info!(
            path = %root.display(),
            dirs = registered,
            debounce_secs = shared.config.debounce.as_secs_f64(),
            "Watching workspace"
        );

        let intake = tokio::spawn(Arc::clone(&shared).intake(events));

        Ok(Self {
            shared,
            intake: Some(intake),
        })
    }

    /// Build a `notify`-backed watcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the watcher
    /// cannot start.
    pub fn start(
        config: &Config,
        registry: &LanguageRegistry,
        handler: Arc<dyn BatchHandler>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = FileClassifier::from_config(config, registry)?;
        let (source, events) = NotifySource::new()?;

        Self::new(
            WatcherConfig {
                debounce: config.debounce,
                ..WatcherConfig::default()
            },
            classifier,
            source,
            events,
            handler,
            cancel,
        )
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> WatchStatus {
        let state = self.shared.state.lock();
        if state.closed {
            WatchStatus::Closed
        } else if state.pending.is_empty() && state.timer.is_none() {
            WatchStatus::Idle
        } else {
            WatchStatus::Accumulating
        }
    }

    /// Paths waiting for the next flush, sorted.
    #[must_use]
    pub fn pending(&self) -> Vec<PathBuf> {
        self.shared.state.lock().pending.iter().cloned().collect()
    }

    /// Session statistics.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// The classifier used to filter events.
    #[must_use]
    pub fn classifier(&self) -> &FileClassifier {
        &self.shared.classifier
    }

    /// Stop intake, disarm the timer and release the event source.
    ///
    /// A batch already being handled runs to completion; no batch starts
    /// afterwards.
    pub fn close(&self) {
        self.shared.cancel.cancel();
        self.shared.shutdown();
    }

    /// Close and wait for the intake task to exit.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(intake) = self.intake.take() {
            if let Err(e) = intake.await {
                tracing::warn!(error = %e, "Watcher intake task failed");
            }
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn register_initial<S: EventSource>(
    root: &Path,
    classifier: &FileClassifier,
    source: &mut S,
) -> Result<BTreeSet<PathBuf>> {
    let mut dirs = relevant_dirs(root, classifier)?;
    // New files at the top level are seen even in an empty workspace.
    dirs.insert(root.to_path_buf());

    for dir in &dirs {
        source.watch(dir)?;
    }
    Ok(dirs)
}

impl Shared {
    async fn intake(self: Arc<Self>, mut events: EventReceiver) {
        loop {
            let first = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = events.recv() => event,
            };

            let Some(first) = first else {
                // Already accepted paths still flush on their timer.
                tracing::debug!("Event source closed, intake stopping");
                return;
            };

            let mut queued = vec![first];
            while queued.len() < CLASSIFY_CHUNK {
                match events.try_recv() {
                    Ok(event) => queued.push(event),
                    Err(_) => break,
                }
            }

            // Classification stats paths, may run `git` and scans new
            // directories.
            let shared = Arc::clone(&self);
            let admitted = tokio::task::spawn_blocking(move || {
                queued
                    .iter()
                    .flat_map(|event| shared.classify(event))
                    .collect::<Vec<_>>()
            })
            .await;

            match admitted {
                Ok(paths) => self.admit(paths),
                Err(e) => tracing::warn!(error = %e, "Event classification failed"),
            }
        }

        self.shutdown();
    }

    /// Turn one source event into the file paths it contributes.
    ///
    /// Blocking.
    fn classify(&self, event: &SourceEvent) -> Vec<PathBuf> {
        let event = match event {
            SourceEvent::Change(event) => event,
            SourceEvent::Error(reason) => {
                self.stats.source_errors.fetch_add(1, Ordering::Relaxed);
                metrics::WATCH_ERRORS.inc();
                tracing::warn!(%reason, "Event source error");
                return Vec::new();
            }
        };

        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        metrics::EVENTS_RECEIVED.inc();

        if !event.kind.is_content_change() {
            tracing::trace!(path = %event.path.display(), kind = ?event.kind, "Ignoring event kind");
            self.stats.discard();
            return Vec::new();
        }

        let relative = match self.classifier.relative_path(&event.path) {
            Some(relative) if !relative.as_os_str().is_empty() => relative,
            _ => {
                tracing::debug!(path = %event.path.display(), "Event outside workspace");
                self.stats.discard();
                return Vec::new();
            }
        };

        let absolute = self.classifier.workspace_root().join(&relative);

        // A registered directory that is gone was removed or moved away.
        if !absolute.exists() && self.forget_dir(&absolute) {
            tracing::debug!(path = %relative.display(), "Watched directory gone");
            self.stats.discard();
            return Vec::new();
        }

        let is_dir = absolute.is_dir();
        if self.classifier.should_ignore_entry(&absolute, is_dir) {
            tracing::trace!(path = %relative.display(), "Ignoring filtered path");
            self.stats.discard();
            return Vec::new();
        }

        if is_dir {
            let arrived = matches!(event.kind, ChangeKind::Create | ChangeKind::Rename);
            if arrived && self.config.watch_new_dirs {
                return self.watch_new_dir(&relative);
            }
            self.stats.discard();
            return Vec::new();
        }

        vec![relative]
    }

    fn admit(self: &Arc<Self>, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.pending.extend(paths);
        self.arm(&mut state);
    }

    /// Register a directory created or moved in after startup.
    ///
    /// Returns the relevant files already inside it, which may have been
    /// written before the watch was in place.
    fn watch_new_dir(&self, relative: &Path) -> Vec<PathBuf> {
        let absolute = self.classifier.workspace_root().join(relative);

        let mut dirs = vec![absolute.clone()];
        let mut files = Vec::new();
        let walked = walk_source_tree(&absolute, &self.classifier, |entry| {
            if entry.is_dir {
                dirs.push(absolute.join(&entry.path));
            } else {
                files.push(relative.join(&entry.path));
            }
            Ok(())
        });
        if let Err(e) = walked {
            tracing::warn!(path = %absolute.display(), error = %e, "Failed to scan new directory");
        }

        let mut registrations = self.registrations.lock();
        if self.cancel.is_cancelled() {
            return Vec::new();
        }
        let mut registered = 0;
        for dir in dirs {
            if registrations.dirs.contains(&dir) {
                continue;
            }
            match registrations.source.watch(&dir) {
                Ok(()) => {
                    registrations.dirs.insert(dir);
                    registered += 1;
                }
                Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Failed to watch new directory"),
            }
        }
        drop(registrations);
        self.track_watched(registered);

        tracing::debug!(path = %relative.display(), dirs = registered, files = files.len(), "Watching new directory");
        files
    }

    /// Drop a registered directory and everything registered below it.
    /// Returns whether `dir` was registered.
    fn forget_dir(&self, dir: &Path) -> bool {
        let mut registrations = self.registrations.lock();
        if !registrations.dirs.contains(dir) {
            return false;
        }

        let before = registrations.dirs.len();
        registrations.dirs.retain(|d| !d.starts_with(dir));
        let removed = (before - registrations.dirs.len()) as u64;
        drop(registrations);

        self.stats.dirs_watched.fetch_sub(removed, Ordering::Relaxed);
        metrics::WATCHED_DIRS.sub(i64::try_from(removed).unwrap_or(i64::MAX));
        true
    }

    fn arm(self: &Arc<Self>, state: &mut WatchState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let shared = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.config.debounce).await;
            shared.flush(generation).await;
        }));
    }

    async fn flush(self: Arc<Self>, generation: u64) {
        let batch: Vec<PathBuf> = {
            let mut state = self.state.lock();
            if state.closed || state.generation != generation {
                return;
            }
            // Detach rather than abort: this task is the timer.
            state.timer = None;
            std::mem::take(&mut state.pending).into_iter().collect()
        };

        if batch.is_empty() {
            return;
        }

        let _dispatch = self.dispatch.lock().await;
        if self.cancel.is_cancelled() {
            tracing::debug!(paths = batch.len(), "Dropping batch after close");
            return;
        }

        self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .paths_flushed
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        metrics::BATCHES_FLUSHED.inc();
        tracing::info!(paths = batch.len(), "Flushing changed files");

        self.handler.handle(&self.cancel, batch).await;
    }

    fn shutdown(&self) {
        let timer = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        {
            let mut registrations = self.registrations.lock();
            registrations.source.close();
            registrations.dirs.clear();
        }
        let watched = self.stats.dirs_watched.swap(0, Ordering::Relaxed);
        metrics::WATCHED_DIRS.sub(i64::try_from(watched).unwrap_or(i64::MAX));

        tracing::info!(
            path = %self.classifier.workspace_root().display(),
            "Watcher closed"
        );
    }

    fn track_watched(&self, count: u64) {
        self.stats.dirs_watched.fetch_add(count, Ordering::Relaxed);
        metrics::WATCHED_DIRS.add(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
