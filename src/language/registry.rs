//! Registry of compiled language specs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{builtin_specs, normalize_extension, LanguageSpec};
use crate::error::ExtractError;
use crate::extract::CompiledLanguage;
use crate::Result;

/// Compiled languages keyed by name and extension.
///
/// Built once at startup and shared by reference; there is no global
/// instance.
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    languages: Vec<Arc<CompiledLanguage>>,
    by_extension: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in languages.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in spec fails to compile.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for spec in builtin_specs() {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Compile and register a language spec.
    ///
    /// A later registration claiming an already registered extension takes
    /// it over.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or a query or role pattern is
    /// invalid.
    pub fn register(&mut self, spec: LanguageSpec) -> Result<()> {
        if self.get(&spec.name).is_some() {
            return Err(ExtractError::DuplicateLanguage(spec.name).into());
        }

        let compiled = CompiledLanguage::compile(spec)?;
        let index = self.languages.len();
        for ext in &compiled.spec().extensions {
            if let Some(previous) = self.by_extension.insert(ext.clone(), index) {
                tracing::warn!(
                    extension = %ext,
                    previous = %self.languages[previous].name(),
                    language = %compiled.name(),
                    "Extension claimed by a second language"
                );
            }
        }

        tracing::debug!(
            language = %compiled.name(),
            rules = compiled.spec().chunk_rules.len(),
            "Registered language"
        );
        self.languages.push(Arc::new(compiled));
        Ok(())
    }

    /// Look up a language by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<CompiledLanguage>> {
        self.languages.iter().find(|l| l.name() == name)
    }

    /// Look up the language for a file by its extension.
    #[must_use]
    pub fn for_path(&self, path: &Path) -> Option<&Arc<CompiledLanguage>> {
        let ext = path.extension()?.to_str()?;
        self.by_extension
            .get(&normalize_extension(ext))
            .map(|&i| &self.languages[i])
    }

    /// Every registered extension, sorted.
    #[must_use]
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<_> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Registered languages in registration order.
    pub fn languages(&self) -> impl Iterator<Item = &Arc<CompiledLanguage>> {
        self.languages.iter()
    }

    /// Number of registered languages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.languages.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{ChunkRule, FileRole};
    use crate::Error;

    fn fake_go(name: &str) -> LanguageSpec {
        LanguageSpec::new(name, tree_sitter_go::LANGUAGE.into())
            .extensions(&[".go"])
            .chunk(
                "function_declaration",
                ChunkRule::named("(function_declaration name: (identifier) @name)"),
            )
    }

    #[test]
    fn test_with_defaults() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("go").is_some());
        assert!(registry.get("python").is_some());
        assert!(registry.get("javascript").is_some());
        assert!(registry.get("cobol").is_none());
    }

    #[test]
    fn test_for_path_case_insensitive() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        assert_eq!(registry.for_path(Path::new("main.go")).unwrap().name(), "go");
        assert_eq!(registry.for_path(Path::new("APP.PY")).unwrap().name(), "python");
        assert_eq!(
            registry.for_path(Path::new("web/index.jsx")).unwrap().name(),
            "javascript"
        );
        assert!(registry.for_path(Path::new("README")).is_none());
        assert!(registry.for_path(Path::new("notes.txt")).is_none());
    }

    #[test]
    fn test_supported_extensions_sorted() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let extensions = registry.supported_extensions();
        assert!(extensions.contains(&".go".to_string()));
        assert!(extensions.contains(&".py".to_string()));
        let mut sorted = extensions.clone();
        sorted.sort();
        assert_eq!(extensions, sorted);
    }

    #[test]
    fn test_isolated_registry_with_fabricated_spec() {
        let mut registry = LanguageRegistry::new();
        registry.register(fake_go("fake-go")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.for_path(Path::new("x.go")).unwrap().name(),
            "fake-go"
        );
    }

    #[test]
    fn test_duplicate_language_rejected() {
        let mut registry = LanguageRegistry::new();
        registry.register(fake_go("go")).unwrap();
        let err = registry.register(fake_go("go")).unwrap_err();
        assert!(matches!(
            err,
            Error::Extract(ExtractError::DuplicateLanguage(_))
        ));
    }

    #[test]
    fn test_invalid_query_rejected() {
        let mut registry = LanguageRegistry::new();
        let spec = fake_go("broken").chunk(
            "method_declaration",
            ChunkRule::named("(no_such_node name: (identifier) @name)"),
        );
        let err = registry.register(spec).unwrap_err();
        assert!(matches!(err, Error::Extract(ExtractError::Query { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_role_pattern_rejected() {
        let mut registry = LanguageRegistry::new();
        let spec = fake_go("broken").role("a/[", FileRole::Tests);
        assert!(registry.register(spec).is_err());
    }
}
