//! Sourcewatch Library
//!
//! Watches a source workspace for relevant changes, batching them behind a
//! quiet period, and turns source files into named chunks using declarative
//! tree-sitter language specs.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extract;
pub mod language;
pub mod observability;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use extract::{Chunk, CompiledLanguage, SourceParser, Span};
pub use language::{FileRole, LanguageRegistry, LanguageSpec};
pub use watcher::{BatchHandler, ChangeWatcher, FileClassifier};
