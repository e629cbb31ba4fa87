//! File filtering with gitignore support.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use parking_lot::RwLock;

use crate::config::Config;
use crate::language::{normalize_extension, FileRole, LanguageRegistry, RoleMatcher};
use crate::{Error, Result};

/// Decides whether version control ignores a path.
pub trait IgnoreOracle: Send + Sync {
    /// Whether `path` (absolute, inside the workspace) is ignored.
    fn is_ignored(&self, path: &Path) -> bool;
}

impl<F> IgnoreOracle for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_ignored(&self, path: &Path) -> bool {
        self(path)
    }
}

/// What a failed ignore check resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OracleFailure {
    /// Treat the path as ignored (fail-closed).
    #[default]
    Ignore,
    /// Treat the path as relevant (fail-open).
    Include,
}

impl FromStr for OracleFailure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ignore" | "closed" => Ok(Self::Ignore),
            "include" | "open" => Ok(Self::Include),
            other => Err(Error::config(format!(
                "invalid oracle failure policy '{other}', must be 'ignore' or 'include'"
            ))),
        }
    }
}

/// Which ignore oracle to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgnoreBackend {
    /// In-process `.gitignore` matching.
    #[default]
    Gitignore,
    /// `git check-ignore` subprocess per path.
    Git,
}

impl FromStr for IgnoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gitignore" => Ok(Self::Gitignore),
            "git" => Ok(Self::Git),
            other => Err(Error::config(format!(
                "invalid ignore backend '{other}', must be 'gitignore' or 'git'"
            ))),
        }
    }
}

/// In-process matcher for `.gitignore` files and `.git/info/exclude`.
///
/// The root ignore files are loaded up front. A `.gitignore` in a
/// subdirectory is loaded the first time a path below it is checked and
/// takes precedence over its ancestors, as in git. Checking a
/// `.gitignore` path itself drops the cached matcher for its directory.
#[derive(Debug)]
pub struct GitignoreOracle {
    root: PathBuf,
    root_matcher: Arc<Gitignore>,
    nested: RwLock<HashMap<PathBuf, Option<Arc<Gitignore>>>>,
}

impl GitignoreOracle {
    /// Load ignore files from the workspace root.
    ///
    /// Missing ignore files are fine; an empty matcher ignores nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a root ignore file cannot be parsed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut builder = GitignoreBuilder::new(root);

        for file in [root.join(".gitignore"), root.join(".git/info/exclude")] {
            if file.is_file() {
                if let Some(e) = builder.add(&file) {
                    return Err(Error::config(format!(
                        "invalid ignore file {}: {e}",
                        file.display()
                    )));
                }
            }
        }

        Self::build(root, &builder)
    }

    /// Create an oracle from explicit root patterns.
    ///
    /// Ignore files in subdirectories still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(root: impl AsRef<Path>, patterns: &[&str]) -> Result<Self> {
        let root = root.as_ref();
        let mut builder = GitignoreBuilder::new(root);

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| Error::config(format!("invalid pattern: {e}")))?;
        }

        Self::build(root, &builder)
    }

    fn build(root: &Path, builder: &GitignoreBuilder) -> Result<Self> {
        let root_matcher = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build gitignore: {e}")))?;

        Ok(Self {
            root: root.to_path_buf(),
            root_matcher: Arc::new(root_matcher),
            nested: RwLock::new(HashMap::new()),
        })
    }

    /// Matcher for the `.gitignore` in `dir`, below the root.
    fn nested_matcher(&self, dir: &Path) -> Option<Arc<Gitignore>> {
        if let Some(cached) = self.nested.read().get(dir) {
            return cached.clone();
        }

        let loaded = load_nested(dir);
        self.nested.write().insert(dir.to_path_buf(), loaded.clone());
        loaded
    }
}

fn load_nested(dir: &Path) -> Option<Arc<Gitignore>> {
    let file = dir.join(".gitignore");
    if !file.is_file() {
        return None;
    }

    let mut builder = GitignoreBuilder::new(dir);
    if let Some(e) = builder.add(&file) {
        // Valid lines still apply.
        tracing::warn!(path = %file.display(), error = %e, "Invalid lines in ignore file");
    }

    match builder.build() {
        Ok(gitignore) if gitignore.is_empty() => None,
        Ok(gitignore) => Some(Arc::new(gitignore)),
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "Failed to load ignore file");
            None
        }
    }
}

/// Verdict of the deepest matcher with an opinion: `Some(true)` ignored,
/// `Some(false)` re-included.
fn layered_match(matchers: &[Arc<Gitignore>], path: &Path, is_dir: bool) -> Option<bool> {
    matchers.iter().rev().find_map(|matcher| {
        match matcher.matched(path, is_dir) {
            Match::Ignore(_) => Some(true),
            Match::Whitelist(_) => Some(false),
            Match::None => None,
        }
    })
}

impl IgnoreOracle for GitignoreOracle {
    fn is_ignored(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(relative) => relative,
            // Outside the workspace; nothing here applies.
            Err(_) if path.has_root() => return false,
            Err(_) => path,
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        if relative.file_name().is_some_and(|name| name == ".gitignore") {
            if let Some(parent) = relative.parent() {
                self.nested.write().remove(&self.root.join(parent));
            }
        }

        let components: Vec<_> = relative.components().collect();
        let mut matchers = vec![Arc::clone(&self.root_matcher)];
        let mut current = self.root.clone();

        for (i, component) in components.iter().enumerate() {
            current.push(component);
            let last = i + 1 == components.len();
            let is_dir = !last || current.is_dir();

            // Nothing below an ignored directory can be re-included.
            if layered_match(&matchers, &current, is_dir) == Some(true) {
                return true;
            }
            if !last {
                if let Some(matcher) = self.nested_matcher(&current) {
                    matchers.push(matcher);
                }
            }
        }

        false
    }
}

/// Asks `git check-ignore` about each path.
#[derive(Debug, Clone)]
pub struct GitCheckIgnore {
    workspace_root: PathBuf,
    on_failure: OracleFailure,
}

impl GitCheckIgnore {
    /// Create an oracle running git in `workspace_root`.
    pub fn new(workspace_root: impl Into<PathBuf>, on_failure: OracleFailure) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            on_failure,
        }
    }

    fn failed(&self, path: &Path, reason: &str) -> bool {
        tracing::debug!(path = %path.display(), reason, "git check-ignore failed");
        self.on_failure == OracleFailure::Ignore
    }
}

impl IgnoreOracle for GitCheckIgnore {
    fn is_ignored(&self, path: &Path) -> bool {
        let status = Command::new("git")
            .args(["check-ignore", "-q", "--"])
            .arg(path)
            .current_dir(&self.workspace_root)
            .status();

        // 0: ignored, 1: not ignored, anything else: git could not answer.
        match status.map(|s| s.code()) {
            Ok(Some(0)) => true,
            Ok(Some(1)) => false,
            Ok(Some(code)) => self.failed(path, &format!("exit code {code}")),
            Ok(None) => self.failed(path, "terminated by signal"),
            Err(e) => self.failed(path, &e.to_string()),
        }
    }
}

/// Decides which workspace paths matter.
#[derive(Clone)]
pub struct FileClassifier {
    workspace_root: PathBuf,
    supported_extensions: HashSet<String>,
    oracle: Arc<dyn IgnoreOracle>,
}

impl fmt::Debug for FileClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileClassifier")
            .field("workspace_root", &self.workspace_root)
            .field("supported_extensions", &self.supported_extensions)
            .finish_non_exhaustive()
    }
}

impl FileClassifier {
    /// Create a classifier. Extensions are normalized to `.ext` lower case.
    pub fn new<I, S>(
        workspace_root: impl Into<PathBuf>,
        extensions: I,
        oracle: Arc<dyn IgnoreOracle>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            workspace_root: workspace_root.into(),
            supported_extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
            oracle,
        }
    }

    /// Build a classifier for a configured workspace.
    ///
    /// With no configured extensions, every extension of the registered
    /// languages is supported.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be resolved or the ignore
    /// files cannot be loaded.
    pub fn from_config(config: &Config, registry: &LanguageRegistry) -> Result<Self> {
        let root = config.workspace_root()?;

        let oracle: Arc<dyn IgnoreOracle> = match config.ignore_backend {
            IgnoreBackend::Gitignore => Arc::new(GitignoreOracle::new(&root)?),
            IgnoreBackend::Git => Arc::new(GitCheckIgnore::new(&root, config.oracle_failure)),
        };

        let extensions = if config.extensions.is_empty() {
            registry.supported_extensions()
        } else {
            config.extensions.clone()
        };

        Ok(Self::new(root, extensions, oracle))
    }

    /// Workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Supported extensions, sorted.
    #[must_use]
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<_> = self.supported_extensions.iter().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Check if a path should be left out of indexing and watching.
    ///
    /// Relative paths are resolved against the workspace root.
    #[must_use]
    pub fn should_ignore(&self, path: &Path) -> bool {
        let absolute = self.absolute(path);
        let is_dir = absolute.is_dir();
        self.should_ignore_entry(&absolute, is_dir)
    }

    /// Like [`Self::should_ignore`], with the entry kind already known.
    ///
    /// The extension rule only applies to files.
    #[must_use]
    pub fn should_ignore_entry(&self, path: &Path, is_dir: bool) -> bool {
        let absolute = self.absolute(path);

        let relative = self.relative_path(&absolute);
        if is_git_dir(relative.as_deref().unwrap_or(absolute.as_path())) {
            return true;
        }

        if self.oracle.is_ignored(&absolute) {
            return true;
        }

        !is_dir && !self.is_supported(&absolute)
    }

    /// Whether the extension rule accepts a path.
    ///
    /// A path without an extension is accepted.
    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(true, |ext| {
                self.supported_extensions.contains(&normalize_extension(ext))
            })
    }

    /// Role of a path under the given rules.
    #[must_use]
    pub fn classify_role(&self, path: &Path, rules: &RoleMatcher) -> FileRole {
        let relative = self
            .relative_path(path)
            .unwrap_or_else(|| path.to_path_buf());
        rules.classify(&relative)
    }

    /// Path relative to the workspace root, if it is inside it.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        path.strip_prefix(&self.workspace_root)
            .ok()
            .map(Path::to_path_buf)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.workspace_root.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

fn is_git_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == ".git"))
}
