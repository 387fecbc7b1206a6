//! Grammar-based extraction over tree-sitter.
//!
//! Each language's `.scm` query binds `@class.name` and `@function.name`
//! to identifier nodes and `@import` to whole import statements. A name
//! node captured by more than one pattern is reported once. The reported
//! line range comes from the enclosing declaration node, found by walking
//! up from the name (see [`definition_node`]).

use std::collections::HashSet;

use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Node, Query, QueryCursor};

use crate::indexer::extractor::{
    compact_signature, Declaration, ExtractOptions, Extractor, ScanOutput,
};
use crate::indexer::imports::{normalize_import, push_unique};
use crate::indexer::parser::CodeParser;
use crate::types::{ItemKind, Language, LineSpan};

pub struct TreeSitterExtractor {
    language: Language,
    options: ExtractOptions,
    /// Compiled once per extractor; `None` when the query failed to compile.
    query: Option<Query>,
}

impl TreeSitterExtractor {
    pub fn new(language: Language, options: ExtractOptions) -> Self {
        let query = match CodeParser::load_query(language) {
            Ok(q) => Some(q),
            Err(e) => {
                debug!(%language, error = %e, "grammar query unavailable");
                None
            }
        };
        Self {
            language,
            options,
            query,
        }
    }
}

impl Extractor for TreeSitterExtractor {
    fn language(&self) -> Language {
        self.language
    }

    fn options(&self) -> &ExtractOptions {
        &self.options
    }

    fn scan(&self, source: &str) -> Option<ScanOutput> {
        let query = self.query.as_ref()?;
        let tree = match CodeParser::new().parse(source, self.language) {
            Ok(t) => t,
            Err(e) => {
                debug!(language = %self.language, error = %e, "parse failed");
                return None;
            }
        };

        let bytes = source.as_bytes();
        let capture_names = query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), bytes);

        let mut out = ScanOutput::default();
        let mut seen_nodes: HashSet<usize> = HashSet::new();

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let capture_name = capture_names[capture.index as usize];
                let node = capture.node;
                let kind = match capture_name {
                    "class.name" => ItemKind::Class,
                    "function.name" => ItemKind::Function,
                    "import" => {
                        if seen_nodes.insert(node.id()) {
                            let text = node_text(&node, bytes);
                            push_unique(&mut out.imports, normalize_import(self.language, &text));
                        }
                        continue;
                    }
                    _ => continue,
                };
                if !seen_nodes.insert(node.id()) {
                    continue;
                }

                let def = definition_node(node);
                out.declarations.push(Declaration {
                    kind,
                    name: node_text(&node, bytes),
                    span: LineSpan::new(
                        def.start_position().row as u32 + 1,
                        def.end_position().row as u32 + 1,
                    ),
                    signature: signature(&def, bytes),
                    doc: extract_documentation(&def, bytes),
                });
            }
        }

        out.declarations.sort_by_key(|d| d.span.start);
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

/// The declaration node that owns the name node `name`.
///
/// Usually the direct parent. Names bound inside an assignment
/// (`const f = () => ..`) or a Go `type_spec` sit two levels below the
/// full declaration.
fn definition_node(name: Node<'_>) -> Node<'_> {
    let Some(parent) = name.parent() else {
        return name;
    };
    match parent.kind() {
        "variable_declarator" | "type_spec" => parent.parent().unwrap_or(parent),
        _ => parent,
    }
}

/// Header text of `def`: everything before its body, or its first line.
fn signature(def: &Node, bytes: &[u8]) -> String {
    let start = def.start_byte();
    let end = match def.child_by_field_name("body") {
        Some(body) if body.start_byte() > start => body.start_byte(),
        _ => {
            let text = &bytes[start..def.end_byte()];
            start + text.iter().position(|&b| b == b'\n').unwrap_or(text.len())
        }
    };
    compact_signature(&String::from_utf8_lossy(&bytes[start..end]))
}

/// Comment directly above `def` (or above its `export` wrapper), or the
/// Python docstring that opens its body.
fn extract_documentation(def: &Node, bytes: &[u8]) -> Option<String> {
    let anchor = match def.parent() {
        Some(p) if p.kind() == "export_statement" => p,
        _ => *def,
    };
    if let Some(prev) = anchor.prev_named_sibling() {
        if prev.kind() == "comment" && prev.end_position().row + 1 >= anchor.start_position().row {
            return Some(clean_comment(&node_text(&prev, bytes)));
        }
    }

    if matches!(def.kind(), "function_definition" | "class_definition") {
        let first = def.child_by_field_name("body")?.named_child(0)?;
        if first.kind() == "expression_statement" {
            let string = first.named_child(0)?;
            if string.kind() == "string" {
                return Some(strip_quotes(&node_text(&string, bytes)));
            }
        }
    }
    None
}

fn node_text(node: &Node, bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[node.start_byte()..node.end_byte()]).into_owned()
}

fn strip_quotes(s: &str) -> String {
    for q in ["\"\"\"", "'''"] {
        if s.len() >= 6 && s.starts_with(q) && s.ends_with(q) {
            return s[3..s.len() - 3].trim().to_string();
        }
    }
    s.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

/// Strip `//`, `#`, `/* */` and leading `*` decoration from a comment.
fn clean_comment(text: &str) -> String {
    let body = text
        .trim()
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/");
    body.lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line
                .strip_prefix("//")
                .or_else(|| line.strip_prefix('#'))
                .or_else(|| line.strip_prefix('*'))
                .unwrap_or(line);
            line.trim()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn scan(language: Language, source: &str) -> ScanOutput {
        TreeSitterExtractor::new(language, ExtractOptions::default())
            .scan(source)
            .unwrap()
    }

    fn names(out: &ScanOutput) -> Vec<(ItemKind, &str)> {
        out.declarations.iter().map(|d| (d.kind, d.name.as_str())).collect()
    }

    #[test]
    fn python_classes_methods_and_imports() {
        let src = r#"from products.inventory import InventoryService
import os

class OrderProcessor:
    """Processes orders."""

    def process(self, order):
        return InventoryService().reserve(order)


def helper():
    pass
"#;
        let out = scan(Language::Python, src);
        assert_eq!(
            names(&out),
            vec![
                (ItemKind::Class, "OrderProcessor"),
                (ItemKind::Function, "process"),
                (ItemKind::Function, "helper"),
            ]
        );
        assert_eq!(out.imports, vec!["products.inventory.InventoryService", "os"]);

        let class = &out.declarations[0];
        assert_eq!(class.span, LineSpan::new(4, 8));
        assert_eq!(class.signature, "class OrderProcessor");
        assert_eq!(class.doc.as_deref(), Some("Processes orders."));
        assert_eq!(out.declarations[1].signature, "def process(self, order)");
    }

    #[test]
    fn arrow_function_spans_full_declaration() {
        let src = "// Adds two numbers.\nconst add = (a, b) => {\n  return a + b;\n};\n";
        let out = scan(Language::JavaScript, src);
        assert_eq!(names(&out), vec![(ItemKind::Function, "add")]);
        let add = &out.declarations[0];
        assert_eq!(add.span, LineSpan::new(2, 4));
        assert_eq!(add.doc.as_deref(), Some("Adds two numbers."));
    }

    #[test]
    fn function_expression_variables_are_functions() {
        let src = "const handler = function (req) {\n  return req.body;\n};\n";
        for language in [Language::JavaScript, Language::TypeScript] {
            let out = scan(language, src);
            assert_eq!(names(&out), vec![(ItemKind::Function, "handler")]);
            assert_eq!(out.declarations[0].span, LineSpan::new(1, 3));
        }
    }

    #[test]
    fn javascript_imports_and_require() {
        let src = "import { Cart } from './cart.js';\nconst db = require('./db');\nexport { Order } from './order';\n\nclass Shop {\n  checkout() { return new Cart(); }\n}\n";
        let out = scan(Language::JavaScript, src);
        assert_eq!(out.imports, vec![".cart.Cart", ".db", ".order.Order"]);
        assert_eq!(
            names(&out),
            vec![(ItemKind::Class, "Shop"), (ItemKind::Function, "checkout")]
        );
    }

    #[test]
    fn typescript_interfaces_are_classes() {
        let src = "export interface User {\n  id: number;\n}\n\nexport abstract class Repo {\n  abstract find(id: number): User;\n}\n\nexport function load(): User {\n  return { id: 1 };\n}\n";
        let out = scan(Language::TypeScript, src);
        assert_eq!(
            names(&out),
            vec![
                (ItemKind::Class, "User"),
                (ItemKind::Class, "Repo"),
                (ItemKind::Function, "load"),
            ]
        );
        assert_eq!(out.declarations[0].span, LineSpan::new(1, 3));
    }

    #[test]
    fn go_types_functions_and_methods() {
        let src = "package shop\n\nimport (\n\t\"fmt\"\n\t\"github.com/acme/shop/stock\"\n)\n\n// Cart holds items.\ntype Cart struct {\n\tItems []string\n}\n\nfunc (c *Cart) Add(s string) {\n\tfmt.Println(stock.Level(s))\n}\n\nfunc New() *Cart {\n\treturn &Cart{}\n}\n";
        let out = scan(Language::Go, src);
        assert_eq!(
            names(&out),
            vec![
                (ItemKind::Class, "Cart"),
                (ItemKind::Function, "Add"),
                (ItemKind::Function, "New"),
            ]
        );
        assert_eq!(out.imports, vec!["fmt", "github.com.acme.shop.stock"]);
        let cart = &out.declarations[0];
        assert_eq!(cart.span, LineSpan::new(9, 11));
        assert_eq!(cart.doc.as_deref(), Some("Cart holds items."));
        assert_eq!(out.declarations[1].signature, "func (c *Cart) Add(s string)");
    }

    #[test]
    fn analyze_builds_items_and_extract_source_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.py");
        std::fs::write(
            &path,
            "from products.inventory import InventoryService\n\nclass OrderProcessor:\n    def run(self):\n        return InventoryService()\n",
        )
        .unwrap();

        let extractor = TreeSitterExtractor::new(Language::Python, ExtractOptions::default());
        let items = extractor.analyze(&path);
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["file:orders.py", "class:orders.py:OrderProcessor", "function:orders.py:run"]
        );
        assert_eq!(items[1].dependencies(), vec!["products.inventory.InventoryService"]);

        std::fs::write(&path, "class OrderProcessor:\n    pass\n").unwrap();
        assert_eq!(
            extractor.extract_source(&path, "OrderProcessor").as_deref(),
            Some("class OrderProcessor:\n    pass")
        );
        assert!(extractor.extract_source(&path, "run").is_none());
        assert!(extractor.extract_source(Path::new("/nonexistent/x.py"), "A").is_none());
    }

    #[test]
    fn comment_cleaning() {
        assert_eq!(clean_comment("/**\n * Loads a user.\n */"), "Loads a user.");
        assert_eq!(clean_comment("# one\n# two"), "one\ntwo");
        assert_eq!(strip_quotes("\"\"\"  Doc.  \"\"\""), "Doc.");
    }
}
