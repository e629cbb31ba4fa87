//! Structured logging configuration.
//!
//! Plain text or JSON output, filtered by `RUST_LOG` when set and by the
//! configured level otherwise.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing.
///
/// Logs go to stderr so command output on stdout stays machine readable.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!(level, json, "Tracing initialized");
}

/// Spans for watch sessions.
pub mod spans {
    use std::path::Path;
    use tracing::{info_span, Span};

    /// Span covering a whole watch session.
    #[must_use]
    pub fn session_span(workspace: &Path) -> Span {
        info_span!("watch_session", workspace = %workspace.display())
    }

    /// Span for handling one flushed batch.
    #[must_use]
    pub fn batch_span(paths: usize) -> Span {
        info_span!("batch", paths)
    }

    /// Span for extracting chunks from one file.
    #[must_use]
    pub fn extract_span(path: &Path, language: &str) -> Span {
        info_span!("extract", path = %path.display(), language = %language)
    }
}
