//! JavaScript chunking rules.

use super::{ChunkRule, FileRole, LanguageSpec};

const EXPORTED_NAME: &str = r"
(export_statement declaration: [
  (function_declaration name: (identifier) @name)
  (generator_function_declaration name: (identifier) @name)
  (class_declaration name: (identifier) @name)
  (lexical_declaration (variable_declarator name: (identifier) @name))
  (variable_declaration (variable_declarator name: (identifier) @name))])";

pub(super) fn spec() -> LanguageSpec {
    LanguageSpec::new("javascript", tree_sitter_javascript::LANGUAGE.into())
        .extensions(&[".js", ".jsx", ".mjs", ".cjs"])
        .chunk(
            "function_declaration",
            ChunkRule::named("(function_declaration name: (identifier) @name)"),
        )
        .chunk(
            "generator_function_declaration",
            ChunkRule::named("(generator_function_declaration name: (identifier) @name)"),
        )
        .chunk(
            "class_declaration",
            ChunkRule::named("(class_declaration name: (identifier) @name)"),
        )
        .chunk(
            "lexical_declaration",
            ChunkRule::named("(lexical_declaration (variable_declarator name: (identifier) @name))"),
        )
        .chunk(
            "variable_declaration",
            ChunkRule::named("(variable_declaration (variable_declarator name: (identifier) @name))"),
        )
        .chunk("export_statement", ChunkRule::named(EXPORTED_NAME))
        .fold(&["comment"])
        .skip(&["import_statement"])
        .role("**/*.test.js", FileRole::Tests)
        .role("**/*.test.jsx", FileRole::Tests)
        .role("**/*.spec.js", FileRole::Tests)
        .role("**/*.spec.jsx", FileRole::Tests)
        .role("**/node_modules/**", FileRole::Ignore)
        .role("**/dist/**", FileRole::Ignore)
        .role("**/build/**", FileRole::Ignore)
}
