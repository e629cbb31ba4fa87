//! Sourcewatch - workspace change watcher
//!
//! Entry point for the `sourcewatch` command.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sourcewatch::observability::{init_tracing, spans};
use sourcewatch::watcher::{init_metrics, FnHandler, IgnoreBackend, OracleFailure};
use sourcewatch::{ChangeWatcher, Config, Error, LanguageRegistry, Result, SourceParser};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Sourcewatch - workspace change watcher and chunk extractor
#[derive(Parser, Debug)]
#[command(name = "sourcewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace root
    #[arg(short, long, env = "SOURCEWATCH_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SOURCEWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "SOURCEWATCH_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the workspace and report batches of changed files
    Watch {
        /// Quiet period in seconds before a batch is flushed
        #[arg(long, env = "SOURCEWATCH_DEBOUNCE_SECS", default_value = "60")]
        debounce_secs: u64,

        /// File extensions to watch (defaults to all registered languages)
        #[arg(short, long, env = "SOURCEWATCH_EXTENSIONS", value_delimiter = ',')]
        extensions: Vec<String>,

        /// Ignore backend (gitignore, git)
        #[arg(long, env = "SOURCEWATCH_IGNORE_BACKEND", default_value = "gitignore")]
        ignore_backend: IgnoreBackend,

        /// Result of a failed ignore check (ignore, include)
        #[arg(long, env = "SOURCEWATCH_ORACLE_FAILURE", default_value = "ignore")]
        oracle_failure: OracleFailure,

        /// Only list changed paths, without extracting chunks
        #[arg(long)]
        paths_only: bool,
    },

    /// Print the chunks of one file as JSON
    Chunks {
        /// File to extract
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("Sourcewatch v{} starting...", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(LanguageRegistry::with_defaults()?);

    match cli.command {
        Command::Watch {
            debounce_secs,
            extensions,
            ignore_backend,
            oracle_failure,
            paths_only,
        } => {
            let config = Config {
                workspace: cli.workspace,
                extensions,
                debounce: Duration::from_secs(debounce_secs),
                ignore_backend,
                oracle_failure,
                log_level: cli.log_level,
                log_json: cli.log_json,
            };
            tracing::debug!(?config, "Configuration loaded");
            config.validate()?;

            watch(config, registry, paths_only).await
        }
        Command::Chunks { file } => {
            let config = Config {
                workspace: cli.workspace,
                log_level: cli.log_level,
                log_json: cli.log_json,
                ..Config::default()
            };
            config.validate()?;

            chunks(&config, &registry, &file)
        }
    }
}

async fn watch(config: Config, registry: Arc<LanguageRegistry>, paths_only: bool) -> Result<()> {
    init_metrics();

    let root = config.workspace_root()?;
    let cancel = CancellationToken::new();

    let handler = {
        let root = root.clone();
        let registry = Arc::clone(&registry);
        FnHandler(move |_cancel: CancellationToken, paths: Vec<PathBuf>| {
            let span = spans::batch_span(paths.len());
            let root = root.clone();
            let registry = Arc::clone(&registry);
            async move {
                for path in &paths {
                    if paths_only {
                        tracing::info!(path = %path.display(), "Changed");
                    } else {
                        report_file(&root, &registry, path);
                    }
                }
            }
            .instrument(span)
        })
    };

    let session = spans::session_span(&root);
    async move {
        let watcher = ChangeWatcher::start(&config, &registry, Arc::new(handler), &cancel)?;

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::internal(format!("failed to listen for ctrl-c: {e}")))?;

        tracing::info!("Shutting down");
        cancel.cancel();
        watcher.shutdown().await;

        Ok(())
    }
    .instrument(session)
    .await
}

fn report_file(root: &Path, registry: &LanguageRegistry, relative: &Path) {
    let Some(language) = registry.for_path(relative) else {
        tracing::info!(path = %relative.display(), "Changed (no language)");
        return;
    };

    if !root.join(relative).is_file() {
        tracing::info!(path = %relative.display(), "Removed");
        return;
    }

    let _span = spans::extract_span(relative, language.name()).entered();
    let result = SourceParser::new(root, Arc::clone(language))
        .and_then(|mut parser| parser.parse_file(relative));

    match result {
        Ok(parsed) => tracing::info!(
            path = %relative.display(),
            role = %parsed.role,
            chunks = parsed.chunks.len(),
            "Changed"
        ),
        Err(e) => tracing::warn!(path = %relative.display(), error = %e, "Failed to extract"),
    }
}

fn chunks(config: &Config, registry: &LanguageRegistry, file: &Path) -> Result<()> {
    let root = config.workspace_root()?;
    let absolute = file.canonicalize()?;

    // Files outside the workspace are read relative to their own directory.
    let (base, relative) = match absolute.strip_prefix(&root) {
        Ok(relative) => (root.clone(), relative.to_path_buf()),
        Err(_) => {
            let parent = absolute
                .parent()
                .ok_or_else(|| Error::config(format!("'{}' is not a file", file.display())))?;
            let name = absolute
                .file_name()
                .ok_or_else(|| Error::config(format!("'{}' is not a file", file.display())))?;
            (parent.to_path_buf(), PathBuf::from(name))
        }
    };

    let language = registry.for_path(&relative).ok_or_else(|| {
        sourcewatch::error::ExtractError::UnknownLanguage(relative.display().to_string())
    })?;

    let mut parser = SourceParser::new(base, Arc::clone(language))?;
    let parsed = parser.parse_file(&relative)?;

    let json = serde_json::to_string_pretty(&parsed)
        .map_err(|e| Error::internal(format!("failed to encode chunks: {e}")))?;
    println!("{json}");

    Ok(())
}
