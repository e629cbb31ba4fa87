//! Workspace change watching.
//!
//! This module provides:
//! - Gitignore-aware path classification
//! - Source tree walking with pruning of ignored directories
//! - Change notification through `notify`
//! - Debounced batching of changed paths

mod events;
mod filter;
mod handler;
mod metrics;
mod scanner;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{
    ChangeKind, EventReceiver, EventSender, EventSource, FsEvent, NotifySource, SourceEvent,
};
pub use filter::{
    FileClassifier, GitCheckIgnore, GitignoreOracle, IgnoreBackend, IgnoreOracle, OracleFailure,
};
pub use handler::{BatchHandler, FnHandler};
pub use metrics::init_metrics;
pub use scanner::{relevant_dirs, walk_source_tree, SourceEntry, WalkStats, WalkStatsSnapshot};
pub use watcher::{
    ChangeWatcher, WatchStatus, WatcherConfig, WatcherStats, WatcherStatsSnapshot,
};
