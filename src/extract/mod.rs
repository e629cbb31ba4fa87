//! Chunk extraction driven by declarative language specs.
//!
//! [`CompiledLanguage`] holds a [`LanguageSpec`] with its queries compiled
//! against the grammar. Extraction walks a parsed tree and turns every node
//! with a chunk rule into a [`Chunk`]. It takes `&self` and keeps no state
//! between calls, so one compiled language can serve many threads.

mod parser;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tree_sitter::{Node, Query, QueryCursor, StreamingIterator, Tree};

use crate::error::ExtractError;
use crate::language::{FileRole, LanguageSpec, RoleMatcher};

pub use parser::{ParsedFile, SourceParser};

const NAME_CAPTURE: &str = "name";
const SUMMARY_CAPTURE: &str = "summary";

/// Byte and line range of a node. Lines are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    fn of(node: Node<'_>) -> Self {
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
        }
    }

    /// Slice of `source` covered by this span.
    #[must_use]
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start_byte..self.end_byte).unwrap_or_default()
    }
}

/// A folded node, such as a doc comment, attached to the chunk after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub node_type: String,
    pub span: Span,
    pub text: String,
}

/// A named, typed slice of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Grammar node type, e.g. `function_declaration`.
    pub node_type: String,
    /// Display name.
    pub name: String,
    /// Owning type, e.g. a method's receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    /// Full node span.
    pub span: Span,
    /// Condensed sub-node preferred over the full span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Span>,
    /// Folded nodes immediately preceding the chunk.
    pub annotations: Vec<Annotation>,
}

impl Chunk {
    /// Span that represents this chunk: the summary if any, else the node.
    #[must_use]
    pub fn represented_span(&self) -> Span {
        self.summary.unwrap_or(self.span)
    }

    /// Text that represents this chunk.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.represented_span().slice(source)
    }
}

#[derive(Debug)]
struct CompiledQuery {
    query: Query,
    capture: u32,
}

#[derive(Debug)]
struct CompiledRule {
    name: CompiledQuery,
    parent_name: Option<CompiledQuery>,
    summary: Option<CompiledQuery>,
}

/// A language spec with its queries and role patterns compiled.
#[derive(Debug)]
pub struct CompiledLanguage {
    spec: LanguageSpec,
    rules: HashMap<String, CompiledRule>,
    fold: HashSet<String>,
    skip: HashSet<String>,
    roles: RoleMatcher,
}

impl CompiledLanguage {
    /// Compile every query and role pattern of a spec.
    ///
    /// # Errors
    ///
    /// Returns an error if a query does not compile against the grammar or
    /// lacks its capture, or a role pattern is invalid.
    pub fn compile(spec: LanguageSpec) -> Result<Self, ExtractError> {
        let mut rules = HashMap::with_capacity(spec.chunk_rules.len());
        for (node_type, rule) in &spec.chunk_rules {
            let compile = |kind: &'static str, source: &str, capture: &str| {
                compile_query(&spec, node_type, kind, source, capture)
            };
            let compiled = CompiledRule {
                name: compile("name", &rule.name_query, NAME_CAPTURE)?,
                parent_name: rule
                    .parent_name_query
                    .as_deref()
                    .map(|q| compile("parent name", q, NAME_CAPTURE))
                    .transpose()?,
                summary: rule
                    .summary_query
                    .as_deref()
                    .map(|q| compile("summary", q, SUMMARY_CAPTURE))
                    .transpose()?,
            };
            rules.insert(node_type.clone(), compiled);
        }

        let roles = RoleMatcher::new(&spec.name, &spec.file_role_rules)?;

        Ok(Self {
            fold: spec.fold_into_next_node.iter().cloned().collect(),
            skip: spec.skip_types.iter().cloned().collect(),
            rules,
            roles,
            spec,
        })
    }

    /// Language name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The underlying spec.
    #[must_use]
    pub fn spec(&self) -> &LanguageSpec {
        &self.spec
    }

    /// Compiled role rules.
    #[must_use]
    pub fn roles(&self) -> &RoleMatcher {
        &self.roles
    }

    /// Role of a workspace-relative path under this language's rules.
    #[must_use]
    pub fn classify_role(&self, relative: &Path) -> FileRole {
        self.roles.classify(relative)
    }

    /// Extract chunks from a parsed tree, in document order.
    ///
    /// Chunks nested in other chunks, such as methods in a class, are
    /// emitted after their container. A node already represented by an
    /// enclosing chunk's name or summary is not emitted again. The walk is
    /// iterative, so deeply nested sources do not grow the call stack.
    ///
    /// `source` must be the text the tree was parsed from.
    #[must_use]
    pub fn extract(&self, tree: &Tree, source: &[u8]) -> Vec<Chunk> {
        let mut query_cursor = QueryCursor::new();
        query_cursor.set_max_start_depth(Some(0));

        let mut chunks = Vec::new();
        let mut represented = HashSet::new();
        // One annotation buffer per level below the root.
        let mut buffers: Vec<Vec<Annotation>> = vec![Vec::new()];

        let mut walk = tree.walk();
        if !walk.goto_first_child() {
            return chunks;
        }

        loop {
            let node = walk.node();
            let descend = match buffers.last_mut() {
                Some(buffer) if node.is_named() => self.visit(
                    node,
                    source,
                    buffer,
                    &mut query_cursor,
                    &mut represented,
                    &mut chunks,
                ),
                _ => false,
            };

            if descend && walk.goto_first_child() {
                buffers.push(Vec::new());
                continue;
            }

            while !walk.goto_next_sibling() {
                buffers.pop();
                if buffers.is_empty() || !walk.goto_parent() {
                    return chunks;
                }
            }
        }
    }

    /// Apply the rules to one named node. Returns whether to descend.
    fn visit(
        &self,
        node: Node<'_>,
        source: &[u8],
        buffer: &mut Vec<Annotation>,
        cursor: &mut QueryCursor,
        represented: &mut HashSet<usize>,
        out: &mut Vec<Chunk>,
    ) -> bool {
        let kind = node.kind();

        if self.skip.contains(kind) {
            buffer.clear();
            return false;
        }

        if self.fold.contains(kind) {
            buffer.push(Annotation {
                node_type: kind.to_string(),
                span: Span::of(node),
                text: node_text(node, source),
            });
            return false;
        }

        let annotations = std::mem::take(buffer);
        if let Some(rule) = self.rules.get(kind) {
            if let Some(chunk) = build_chunk(node, rule, source, cursor, annotations, represented) {
                out.push(chunk);
            }
        }
        true
    }
}

fn compile_query(
    spec: &LanguageSpec,
    node_type: &str,
    kind: &'static str,
    source: &str,
    capture: &str,
) -> Result<CompiledQuery, ExtractError> {
    let err = |reason: String| ExtractError::Query {
        language: spec.name.clone(),
        node_type: node_type.to_string(),
        kind,
        reason,
    };

    let query = Query::new(&spec.grammar, source).map_err(|e| err(e.to_string()))?;
    let capture = query
        .capture_index_for_name(capture)
        .ok_or_else(|| err(format!("missing @{capture} capture")))?;

    Ok(CompiledQuery { query, capture })
}

fn build_chunk(
    node: Node<'_>,
    rule: &CompiledRule,
    source: &[u8],
    cursor: &mut QueryCursor,
    annotations: Vec<Annotation>,
    represented: &mut HashSet<usize>,
) -> Option<Chunk> {
    // No name means no chunk for this node.
    let name = first_capture(&rule.name, node, source, cursor)?;

    // The inner declaration of an export or a decorated definition shares
    // its name node with the enclosing chunk.
    if represented.contains(&node.id()) || represented.contains(&name.id()) {
        return None;
    }
    represented.insert(name.id());

    let parent_name = rule
        .parent_name
        .as_ref()
        .and_then(|q| first_capture(q, node, source, cursor))
        .map(|n| node_text(n, source));
    let summary_node = rule
        .summary
        .as_ref()
        .and_then(|q| first_capture(q, node, source, cursor));
    if let Some(summary_node) = summary_node {
        represented.insert(summary_node.id());
    }
    let summary = summary_node.map(Span::of);

    Some(Chunk {
        node_type: node.kind().to_string(),
        name: node_text(name, source),
        parent_name,
        span: Span::of(node),
        summary,
        annotations,
    })
}

/// First node captured by a query anchored at `node`.
fn first_capture<'tree>(
    compiled: &CompiledQuery,
    node: Node<'tree>,
    source: &[u8],
    cursor: &mut QueryCursor,
) -> Option<Node<'tree>> {
    let mut matches = cursor.matches(&compiled.query, node, source);
    while let Some(m) = matches.next() {
        if let Some(capture) = m.captures.iter().find(|c| c.index == compiled.capture) {
            return Some(capture.node);
        }
    }
    None
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    source
        .get(node.byte_range())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{ChunkRule, LanguageRegistry};

    fn parse(language: &CompiledLanguage, source: &str) -> Tree {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&language.spec().grammar).unwrap();
        parser.parse(source, None).unwrap()
    }

    fn extract(registry: &LanguageRegistry, language: &str, source: &str) -> Vec<Chunk> {
        let language = registry.get(language).unwrap();
        let tree = parse(language, source);
        language.extract(&tree, source.as_bytes())
    }

    const GO_SOURCE: &str = r#"package store

import (
	"fmt"
)

// Version of the store.
const Version = "1"

var registry = map[string]int{}

// Store keeps things.
// It is safe for concurrent use.
type Store struct {
	items []string
}

// Add appends an item.
func (s *Store) Add(item string) {
	s.items = append(s.items, item)
}

func (s Store) Len() int { return len(s.items) }

func (s *Stack[T]) Push(v T) {}

// New builds a store.
func New() *Store {
	fmt.Println("new")
	return &Store{}
}
"#;

    #[test]
    fn test_go_chunks_in_document_order() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let chunks = extract(&registry, "go", GO_SOURCE);

        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Version", "registry", "Store", "Add", "Len", "Push", "New"]
        );
        assert_eq!(chunks[0].node_type, "const_declaration");
        assert_eq!(chunks[2].node_type, "type_declaration");
        assert_eq!(chunks[3].node_type, "method_declaration");
    }

    #[test]
    fn test_go_skips_package_and_imports() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let chunks = extract(&registry, "go", GO_SOURCE);
        assert!(chunks
            .iter()
            .all(|c| c.node_type != "import_declaration" && c.node_type != "package_clause"));
    }

    #[test]
    fn test_go_method_receiver_as_parent() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let chunks = extract(&registry, "go", GO_SOURCE);

        let parent = |name: &str| {
            chunks
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.parent_name.clone())
        };
        assert_eq!(parent("Add").as_deref(), Some("Store"));
        assert_eq!(parent("Len").as_deref(), Some("Store"));
        assert_eq!(parent("Push").as_deref(), Some("Stack"));
        assert_eq!(parent("New"), None);
    }

    #[test]
    fn test_go_comments_fold_into_next_chunk() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let chunks = extract(&registry, "go", GO_SOURCE);

        let store = chunks.iter().find(|c| c.name == "Store").unwrap();
        assert_eq!(store.annotations.len(), 2);
        assert_eq!(store.annotations[0].text, "// Store keeps things.");
        assert_eq!(store.annotations[0].node_type, "comment");

        let add = chunks.iter().find(|c| c.name == "Add").unwrap();
        assert_eq!(add.annotations.len(), 1);
        assert_eq!(add.annotations[0].text, "// Add appends an item.");

        let len = chunks.iter().find(|c| c.name == "Len").unwrap();
        assert!(len.annotations.is_empty());

        assert!(chunks.iter().all(|c| c.node_type != "comment"));
    }

    #[test]
    fn test_chunk_span_and_text() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "package main\n\nfunc main() {\n}\n";
        let chunks = extract(&registry, "go", source);

        assert_eq!(chunks.len(), 1);
        let main = &chunks[0];
        assert_eq!(main.span.start_line, 3);
        assert_eq!(main.span.end_line, 4);
        assert_eq!(main.text(source), "func main() {\n}");
        assert_eq!(main.represented_span(), main.span);
    }

    #[test]
    fn test_python_decorated_summary() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "import os\nfrom sys import path\n\n# cached\n@cache\ndef load(x):\n    return x\n\nclass Repo:\n    def get(self):\n        pass\n";
        let chunks = extract(&registry, "python", source);

        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["load", "Repo", "get"]);

        let load = &chunks[0];
        assert_eq!(load.node_type, "decorated_definition");
        assert_eq!(load.annotations.len(), 1);
        assert_eq!(load.annotations[0].text, "# cached");
        let summary = load.summary.unwrap();
        assert!(load.text(source).starts_with("def load"));
        assert!(summary.start_byte > load.span.start_byte);
        assert_eq!(summary.end_byte, load.span.end_byte);
    }

    #[test]
    fn test_python_methods_are_chunks() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "class Repo:\n    def get(self):\n        pass\n\n    def put(self, v):\n        pass\n";
        let chunks = extract(&registry, "python", source);

        let found: Vec<_> = chunks
            .iter()
            .map(|c| (c.node_type.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("class_definition", "Repo"),
                ("function_definition", "get"),
                ("function_definition", "put"),
            ]
        );
        assert!(chunks[0].span.end_byte >= chunks[2].span.end_byte);
    }

    #[test]
    fn test_decorated_inner_definition_not_repeated() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "@dataclass\nclass Point:\n    @property\n    def norm(self):\n        return 0\n";
        let chunks = extract(&registry, "python", source);

        let found: Vec<_> = chunks
            .iter()
            .map(|c| (c.node_type.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("decorated_definition", "Point"),
                ("decorated_definition", "norm"),
            ]
        );
    }

    #[test]
    fn test_javascript_class_members_and_nested_functions() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "export class Box {\n  open() {\n    function helper() {}\n  }\n}\n";
        let chunks = extract(&registry, "javascript", source);

        let found: Vec<_> = chunks
            .iter()
            .map(|c| (c.node_type.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("export_statement", "Box"),
                ("function_declaration", "helper"),
            ]
        );
    }

    #[test]
    fn test_deeply_nested_source_on_small_stack() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let js = std::sync::Arc::clone(registry.get("javascript").unwrap());

        let terms = vec!["\"a\""; 3000].join(" + ");
        let concat = format!("const s = {terms};\n");
        let parens = format!("x = {}1{};\n", "(".repeat(5000), ")".repeat(5000));

        for source in [concat, parens] {
            let tree = parse(&js, &source);
            let js = std::sync::Arc::clone(&js);
            // Tokio worker threads get 2 MiB by default.
            let chunks = std::thread::Builder::new()
                .stack_size(2 * 1024 * 1024)
                .spawn(move || js.extract(&tree, source.as_bytes()))
                .unwrap()
                .join()
                .unwrap();
            assert!(chunks.len() <= 1);
        }
    }

    #[test]
    fn test_deep_concatenation_yields_its_declaration() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let terms = vec!["\"a\""; 3000].join(" + ");
        let source = format!("const s = {terms};\n");
        let chunks = extract(&registry, "javascript", &source);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "s");
    }

    #[test]
    fn test_javascript_exports_and_declarations() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "import x from 'y';\n\n/** Adds. */\nexport function add(a, b) { return a + b; }\n\nconst limit = 3;\n\nfunction* ids() { yield 1; }\n\nclass Box {}\n\nlet { a, b } = pair;\n";
        let chunks = extract(&registry, "javascript", source);

        let found: Vec<_> = chunks
            .iter()
            .map(|c| (c.node_type.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("export_statement", "add"),
                ("lexical_declaration", "limit"),
                ("generator_function_declaration", "ids"),
                ("class_declaration", "Box"),
            ]
        );
        assert_eq!(chunks[0].annotations[0].text, "/** Adds. */");
    }

    #[test]
    fn test_chunks_inside_unruled_nodes_are_found() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "if True:\n    def inner():\n        pass\n";
        let chunks = extract(&registry, "python", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "inner");
    }

    #[test]
    fn test_skip_breaks_folding() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let source = "package main\n\n// about imports\nimport \"fmt\"\n\nfunc main() { fmt.Println() }\n";
        let chunks = extract(&registry, "go", source);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].annotations.is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let go = registry.get("go").unwrap();
        let tree = parse(go, GO_SOURCE);

        let first = go.extract(&tree, GO_SOURCE.as_bytes());
        let second = go.extract(&tree, GO_SOURCE.as_bytes());
        assert_eq!(first, second);
    }

    #[test]
    fn test_unmatched_name_yields_no_chunk() {
        let mut registry = LanguageRegistry::new();
        // Only functions with a named result type get a name.
        let spec = LanguageSpec::new("strict-go", tree_sitter_go::LANGUAGE.into())
            .extensions(&[".go"])
            .chunk(
                "function_declaration",
                ChunkRule::named("(function_declaration result: (type_identifier) @name)"),
            )
            .chunk(
                "type_declaration",
                ChunkRule::named("(type_declaration (type_spec name: (type_identifier) @name))"),
            );
        registry.register(spec).unwrap();

        let source = "package p\n\nfunc f() {}\n\ntype T int\n";
        let chunks = extract(&registry, "strict-go", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "T");
    }

    #[test]
    fn test_missing_capture_rejected() {
        let spec = LanguageSpec::new("go", tree_sitter_go::LANGUAGE.into()).chunk(
            "function_declaration",
            ChunkRule::named("(function_declaration name: (identifier) @ident)"),
        );
        let err = CompiledLanguage::compile(spec).unwrap_err();
        assert!(err.to_string().contains("missing @name capture"));
    }

    #[test]
    fn test_parallel_extraction_shares_language() {
        let registry = LanguageRegistry::with_defaults().unwrap();
        let go = std::sync::Arc::clone(registry.get("go").unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let go = std::sync::Arc::clone(&go);
                std::thread::spawn(move || {
                    let source = format!("package p\n\nfunc F{i}() {{}}\n");
                    let tree = parse(&go, &source);
                    go.extract(&tree, source.as_bytes())
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let chunks = handle.join().unwrap();
            assert_eq!(chunks[0].name, format!("F{i}"));
        }
    }
}
