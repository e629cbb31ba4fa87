//! Go chunking rules.

use super::{ChunkRule, FileRole, LanguageSpec};

const METHOD_RECEIVER: &str = r"
(method_declaration
  receiver: (parameter_list
    (parameter_declaration
      type: [
        (type_identifier) @name
        (pointer_type (type_identifier) @name)
        (generic_type (type_identifier) @name)
        (pointer_type (generic_type (type_identifier) @name))])))";

const TYPE_NAME: &str = r"
(type_declaration [
  (type_spec name: (type_identifier) @name)
  (type_alias name: (type_identifier) @name)])";

pub(super) fn spec() -> LanguageSpec {
    LanguageSpec::new("go", tree_sitter_go::LANGUAGE.into())
        .extensions(&[".go"])
        .chunk(
            "function_declaration",
            ChunkRule::named("(function_declaration name: (identifier) @name)"),
        )
        .chunk(
            "method_declaration",
            ChunkRule::named("(method_declaration name: (field_identifier) @name)")
                .with_parent(METHOD_RECEIVER),
        )
        .chunk("type_declaration", ChunkRule::named(TYPE_NAME))
        .chunk(
            "var_declaration",
            ChunkRule::named("(var_declaration (var_spec name: (identifier) @name))"),
        )
        .chunk(
            "const_declaration",
            ChunkRule::named("(const_declaration (const_spec name: (identifier) @name))"),
        )
        .fold(&["comment"])
        // these pollute search results
        .skip(&["package_clause", "import_declaration"])
        .role("**/*_test.go", FileRole::Tests)
        .role("vendor/**", FileRole::Ignore)
        .role("third_party/**", FileRole::Ignore)
}
