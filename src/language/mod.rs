//! Declarative per-language chunking tables.
//!
//! A [`LanguageSpec`] is plain data: which node types become chunks and how
//! their names are found, which nodes fold into the next chunk, which are
//! skipped, and how file paths map to roles. Specs are compiled and held by
//! an explicit [`LanguageRegistry`] built once at startup.

mod go;
mod javascript;
mod python;
mod registry;
mod roles;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub use registry::LanguageRegistry;
pub use roles::RoleMatcher;

/// What a file is for, from the indexer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    /// Regular source code.
    #[default]
    Source,
    /// Test code.
    Tests,
    /// Vendored or generated code that should not be indexed.
    Ignore,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Tests => "tests",
            Self::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Glob pattern mapped to a role. Rules are evaluated in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRoleRule {
    /// Glob matched against the workspace-relative path.
    pub pattern: String,
    /// Role assigned on match.
    pub role: FileRole,
}

/// How to turn a node of one type into a chunk.
///
/// Queries capture `@name` (for the name and parent name) and `@summary`
/// (for the summary node). They are anchored at the chunk node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRule {
    /// Captures the chunk's display name.
    pub name_query: String,
    /// Captures the owning type's name, e.g. a method receiver.
    pub parent_name_query: Option<String>,
    /// Captures a condensed sub-node used instead of the whole body.
    pub summary_query: Option<String>,
}

impl ChunkRule {
    /// Rule with only a name query.
    pub fn named(name_query: impl Into<String>) -> Self {
        Self {
            name_query: name_query.into(),
            parent_name_query: None,
            summary_query: None,
        }
    }

    /// Add a parent name query.
    #[must_use]
    pub fn with_parent(mut self, query: impl Into<String>) -> Self {
        self.parent_name_query = Some(query.into());
        self
    }

    /// Add a summary node query.
    #[must_use]
    pub fn with_summary(mut self, query: impl Into<String>) -> Self {
        self.summary_query = Some(query.into());
        self
    }
}

/// Chunking rules for one language.
#[derive(Clone)]
pub struct LanguageSpec {
    /// Registry key, e.g. `go`.
    pub name: String,
    /// Dot-prefixed, lower-cased file extensions.
    pub extensions: Vec<String>,
    /// Grammar the queries are written against.
    pub grammar: tree_sitter::Language,
    /// Node type to chunk rule.
    pub chunk_rules: BTreeMap<String, ChunkRule>,
    /// Node types attached to the following chunk as annotations.
    pub fold_into_next_node: Vec<String>,
    /// Node types never emitted and never descended into.
    pub skip_types: Vec<String>,
    /// Ordered role rules; first match wins, default is [`FileRole::Source`].
    pub file_role_rules: Vec<FileRoleRule>,
}

impl fmt::Debug for LanguageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageSpec")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("chunk_rules", &self.chunk_rules.keys().collect::<Vec<_>>())
            .field("fold_into_next_node", &self.fold_into_next_node)
            .field("skip_types", &self.skip_types)
            .field("file_role_rules", &self.file_role_rules)
            .finish_non_exhaustive()
    }
}

impl LanguageSpec {
    /// Create an empty spec for a grammar.
    pub fn new(name: impl Into<String>, grammar: tree_sitter::Language) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            grammar,
            chunk_rules: BTreeMap::new(),
            fold_into_next_node: Vec::new(),
            skip_types: Vec::new(),
            file_role_rules: Vec::new(),
        }
    }

    /// Add file extensions.
    #[must_use]
    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions
            .extend(extensions.iter().map(|e| normalize_extension(e)));
        self
    }

    /// Add a chunk rule for a node type.
    #[must_use]
    pub fn chunk(mut self, node_type: impl Into<String>, rule: ChunkRule) -> Self {
        self.chunk_rules.insert(node_type.into(), rule);
        self
    }

    /// Add node types that fold into the next chunk.
    #[must_use]
    pub fn fold(mut self, node_types: &[&str]) -> Self {
        self.fold_into_next_node
            .extend(node_types.iter().map(ToString::to_string));
        self
    }

    /// Add node types to skip.
    #[must_use]
    pub fn skip(mut self, node_types: &[&str]) -> Self {
        self.skip_types
            .extend(node_types.iter().map(ToString::to_string));
        self
    }

    /// Append a role rule.
    #[must_use]
    pub fn role(mut self, pattern: impl Into<String>, role: FileRole) -> Self {
        self.file_role_rules.push(FileRoleRule {
            pattern: pattern.into(),
            role,
        });
        self
    }
}

/// Built-in language specs.
#[must_use]
pub fn builtin_specs() -> Vec<LanguageSpec> {
    vec![go::spec(), python::spec(), javascript::spec()]
}

/// Lower-case an extension and make sure it starts with a dot.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("go"), ".go");
        assert_eq!(normalize_extension(".PY"), ".py");
        assert_eq!(normalize_extension(" .Js "), ".js");
    }

    #[test]
    fn test_spec_builder() {
        let spec = LanguageSpec::new("go", tree_sitter_go::LANGUAGE.into())
            .extensions(&["GO"])
            .chunk(
                "function_declaration",
                ChunkRule::named("(function_declaration name: (identifier) @name)"),
            )
            .fold(&["comment"])
            .skip(&["import_declaration"])
            .role("**/*_test.go", FileRole::Tests);

        assert_eq!(spec.extensions, vec![".go"]);
        assert!(spec.chunk_rules.contains_key("function_declaration"));
        assert_eq!(spec.fold_into_next_node, vec!["comment"]);
        assert_eq!(spec.skip_types, vec!["import_declaration"]);
        assert_eq!(spec.file_role_rules[0].role, FileRole::Tests);
    }

    #[test]
    fn test_chunk_rule_builder() {
        let rule = ChunkRule::named("(a) @name")
            .with_parent("(b) @name")
            .with_summary("(c) @summary");
        assert_eq!(rule.parent_name_query.as_deref(), Some("(b) @name"));
        assert_eq!(rule.summary_query.as_deref(), Some("(c) @summary"));
    }

    #[test]
    fn test_builtin_specs() {
        let names: Vec<_> = builtin_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["go", "python", "javascript"]);
    }

    #[test]
    fn test_file_role_display() {
        assert_eq!(FileRole::Source.to_string(), "source");
        assert_eq!(FileRole::Tests.to_string(), "tests");
        assert_eq!(FileRole::Ignore.to_string(), "ignore");
        assert_eq!(FileRole::default(), FileRole::Source);
    }
}
