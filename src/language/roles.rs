//! Ordered glob rules mapping paths to file roles.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use super::{FileRole, FileRoleRule};
use crate::error::ExtractError;

/// Compiled, ordered role rules. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct RoleMatcher {
    set: GlobSet,
    roles: Vec<FileRole>,
}

impl RoleMatcher {
    /// Compile role rules.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid glob.
    pub fn new(language: &str, rules: &[FileRoleRule]) -> Result<Self, ExtractError> {
        let mut builder = GlobSetBuilder::new();
        for rule in rules {
            let glob = GlobBuilder::new(&rule.pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| ExtractError::Glob {
                    language: language.to_string(),
                    pattern: rule.pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|e| ExtractError::Glob {
            language: language.to_string(),
            pattern: String::new(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            set,
            roles: rules.iter().map(|r| r.role).collect(),
        })
    }

    /// Role of a workspace-relative path.
    #[must_use]
    pub fn classify(&self, relative: &Path) -> FileRole {
        self.set
            .matches(relative)
            .into_iter()
            .min()
            .map_or(FileRole::Source, |i| self.roles[i])
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
