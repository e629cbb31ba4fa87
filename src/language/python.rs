//! Python chunking rules.

use super::{ChunkRule, FileRole, LanguageSpec};

const DECORATED_NAME: &str = r"
(decorated_definition definition: [
  (function_definition name: (identifier) @name)
  (class_definition name: (identifier) @name)])";

const DECORATED_SUMMARY: &str = r"
(decorated_definition definition: [
  (function_definition) @summary
  (class_definition) @summary])";

pub(super) fn spec() -> LanguageSpec {
    LanguageSpec::new("python", tree_sitter_python::LANGUAGE.into())
        .extensions(&[".py", ".pyi"])
        .chunk(
            "function_definition",
            ChunkRule::named("(function_definition name: (identifier) @name)"),
        )
        .chunk(
            "class_definition",
            ChunkRule::named("(class_definition name: (identifier) @name)"),
        )
        .chunk(
            "decorated_definition",
            ChunkRule::named(DECORATED_NAME).with_summary(DECORATED_SUMMARY),
        )
        .fold(&["comment"])
        .skip(&["import_statement", "import_from_statement"])
        .role("**/test*.py", FileRole::Tests)
        .role("**/*_test.py", FileRole::Tests)
        .role("**/__pycache__/**", FileRole::Ignore)
        .role("**/venv/**", FileRole::Ignore)
        .role("**/.venv/**", FileRole::Ignore)
        .role("**/env/**", FileRole::Ignore)
        .role("**/.env/**", FileRole::Ignore)
        .role("**/site-packages/**", FileRole::Ignore)
}
