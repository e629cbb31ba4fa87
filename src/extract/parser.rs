//! Per-file parsing and extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tree_sitter::{Parser, Tree};

use super::{Chunk, CompiledLanguage};
use crate::error::ExtractError;
use crate::language::FileRole;
use crate::Result;

/// Chunks and role of one file.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedFile {
    /// Workspace-relative path.
    pub path: PathBuf,
    /// Role under the language's rules.
    pub role: FileRole,
    /// Extracted chunks, empty for ignored files.
    pub chunks: Vec<Chunk>,
}

/// Parser bound to one workspace and one language.
///
/// Not `Sync`: give each worker its own parser and share the
/// [`CompiledLanguage`].
pub struct SourceParser {
    workspace_root: PathBuf,
    parser: Parser,
    language: Arc<CompiledLanguage>,
}

impl SourceParser {
    /// Create a parser for a language.
    ///
    /// # Errors
    ///
    /// Returns an error if the grammar is incompatible with the linked
    /// tree-sitter runtime.
    pub fn new(workspace_root: impl Into<PathBuf>, language: Arc<CompiledLanguage>) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.spec().grammar)
            .map_err(|e| ExtractError::Parse {
                language: language.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            workspace_root: workspace_root.into(),
            parser,
            language,
        })
    }

    /// The language this parser extracts.
    #[must_use]
    pub fn language(&self) -> &Arc<CompiledLanguage> {
        &self.language
    }

    /// Parse source text.
    ///
    /// # Errors
    ///
    /// Returns an error if tree-sitter produces no tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree> {
        self.parser.parse(source, None).ok_or_else(|| {
            ExtractError::Parse {
                language: self.language.name().to_string(),
                reason: "parser returned no tree".to_string(),
            }
            .into()
        })
    }

    /// Parse source text and extract its chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn extract_source(&mut self, source: &str) -> Result<Vec<Chunk>> {
        let tree = self.parse(source)?;
        Ok(self.language.extract(&tree, source.as_bytes()))
    }

    /// Read, classify and extract a workspace-relative file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn parse_file(&mut self, relative: &Path) -> Result<ParsedFile> {
        let role = self.language.classify_role(relative);
        if role == FileRole::Ignore {
            tracing::debug!(path = %relative.display(), "Skipping ignored file");
            return Ok(ParsedFile {
                path: relative.to_path_buf(),
                role,
                chunks: Vec::new(),
            });
        }

        let source = std::fs::read_to_string(self.workspace_root.join(relative))?;
        let chunks = self.extract_source(&source)?;

        tracing::debug!(
            path = %relative.display(),
            language = %self.language.name(),
            %role,
            chunks = chunks.len(),
            "Extracted chunks"
        );

        Ok(ParsedFile {
            path: relative.to_path_buf(),
            role,
            chunks,
        })
    }
}
