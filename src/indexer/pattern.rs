//! Pattern-based extraction for brace-delimited languages.
//!
//! Top-level declarations are found by a keyword at the start of a line.
//! A declaration's block runs from its line until the `{`/`}` balance
//! returns to zero, scanning at most `max_block_lines` lines. Braces inside
//! strings or comments can throw the count off; such blocks come out too
//! long or too short rather than failing extraction.

use std::sync::OnceLock;

use regex::Regex;

use crate::indexer::extractor::{
    compact_signature, Declaration, ExtractOptions, Extractor, ScanOutput,
};
use crate::indexer::imports::{cached_regex, normalize_import, push_unique};
use crate::types::{ItemKind, Language, LineSpan};

/// Lines after a declaration line in which its opening brace may appear.
const OPENER_LOOKAHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Go,
    Script,
}

pub struct PatternExtractor {
    language: Language,
    family: Family,
    options: ExtractOptions,
}

impl PatternExtractor {
    /// `None` for languages without a pattern family.
    pub fn new(language: Language, options: ExtractOptions) -> Option<Self> {
        if !language.is_brace_delimited() {
            return None;
        }
        let family = if language == Language::Go {
            Family::Go
        } else {
            Family::Script
        };
        Some(Self {
            language,
            family,
            options,
        })
    }
}

impl Extractor for PatternExtractor {
    fn language(&self) -> Language {
        self.language
    }

    fn options(&self) -> &ExtractOptions {
        &self.options
    }

    fn scan(&self, source: &str) -> Option<ScanOutput> {
        let rules = declaration_rules(self.family);
        let lines: Vec<&str> = source.lines().collect();
        let mut out = ScanOutput::default();

        for (idx, line) in lines.iter().enumerate() {
            let Some((kind, name)) = rules
                .iter()
                .find_map(|(kind, re)| re.captures(line).map(|c| (*kind, c[1].to_string())))
            else {
                continue;
            };
            let end = block_end(&lines, idx, self.options.max_block_lines);
            out.declarations.push(Declaration {
                kind,
                name,
                span: LineSpan::new(idx as u32 + 1, end as u32 + 1),
                signature: compact_signature(line),
                doc: leading_comment(&lines, idx),
            });
        }

        for statement in import_statements(self.family, source) {
            push_unique(&mut out.imports, normalize_import(self.language, statement));
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Declaration rules
// ---------------------------------------------------------------------------

fn declaration_rules(family: Family) -> Vec<(ItemKind, &'static Regex)> {
    static GO_FUNC: OnceLock<Option<Regex>> = OnceLock::new();
    static GO_TYPE: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_CLASS: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_INTERFACE: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_FUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_ARROW: OnceLock<Option<Regex>> = OnceLock::new();

    let rules = match family {
        Family::Go => vec![
            (
                ItemKind::Function,
                cached_regex(&GO_FUNC, r"^func\s+(?:\([^)]*\)\s*)?(\w+)\s*[\[(]"),
            ),
            (
                ItemKind::Class,
                cached_regex(&GO_TYPE, r"^type\s+(\w+)\s+(?:\[[^\]]*\]\s*)?(?:struct|interface)\b"),
            ),
        ],
        Family::Script => vec![
            (
                ItemKind::Class,
                cached_regex(
                    &JS_CLASS,
                    r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
                ),
            ),
            (
                ItemKind::Class,
                cached_regex(&JS_INTERFACE, r"^(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)"),
            ),
            (
                ItemKind::Function,
                cached_regex(
                    &JS_FUNCTION,
                    r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)",
                ),
            ),
            (
                ItemKind::Function,
                cached_regex(
                    &JS_ARROW,
                    r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)",
                ),
            ),
        ],
    };
    rules
        .into_iter()
        .filter_map(|(kind, re)| re.map(|re| (kind, re)))
        .collect()
}

/// 0-based index of the last line of the block opened at `start`.
///
/// A declaration whose line ends in `;` before any `{`, or whose opener
/// does not show up within [`OPENER_LOOKAHEAD`] lines, is one line long.
/// An unbalanced block stops at the scan cap.
fn block_end(lines: &[&str], start: usize, max_lines: usize) -> usize {
    let limit = (start + max_lines.max(1)).min(lines.len());
    let mut depth: i64 = 0;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().take(limit).skip(start) {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return idx;
        }
        if !opened {
            if line.trim_end().ends_with(';') {
                return idx;
            }
            if idx - start >= OPENER_LOOKAHEAD {
                return start;
            }
        }
    }

    if opened {
        limit.saturating_sub(1).max(start)
    } else {
        start
    }
}

/// Contiguous `//` comment lines directly above `idx`.
fn leading_comment(lines: &[&str], idx: usize) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    for line in lines[..idx].iter().rev() {
        let Some(text) = line.trim_start().strip_prefix("//") else {
            break;
        };
        collected.push(text.trim());
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join("\n"))
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn import_statements(family: Family, source: &str) -> Vec<&str> {
    static GO_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    static GO_SINGLE: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_FROM: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_BARE: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_REQUIRE: OnceLock<Option<Regex>> = OnceLock::new();

    let patterns = match family {
        Family::Go => vec![
            cached_regex(&GO_BLOCK, r"(?ms)^import\s*\(.*?\)"),
            cached_regex(&GO_SINGLE, r#"(?m)^import\s+(?:[\w.]+\s+)?"[^"]+""#),
        ],
        Family::Script => vec![
            cached_regex(
                &JS_FROM,
                r#"(?m)^[ \t]*(?:import\s|export\s*[*{])[^;'"]*?\bfrom\s*['"][^'"]+['"]"#,
            ),
            cached_regex(&JS_BARE, r#"(?m)^[ \t]*import\s*['"][^'"]+['"]"#),
            cached_regex(&JS_REQUIRE, r#"require\s*\(\s*['"][^'"]+['"]\s*\)"#),
        ],
    };

    let mut found: Vec<(usize, &str)> = patterns
        .into_iter()
        .flatten()
        .flat_map(|re| re.find_iter(source).map(|m| (m.start(), m.as_str())))
        .collect();
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, text)| text).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(language: Language, source: &str) -> ScanOutput {
        PatternExtractor::new(language, ExtractOptions::default())
            .unwrap()
            .scan(source)
            .unwrap()
    }

    fn spans(out: &ScanOutput) -> Vec<(&str, u32, u32)> {
        out.declarations
            .iter()
            .map(|d| (d.name.as_str(), d.span.start, d.span.end))
            .collect()
    }

    #[test]
    fn python_has_no_pattern_family() {
        assert!(PatternExtractor::new(Language::Python, ExtractOptions::default()).is_none());
    }

    #[test]
    fn go_declarations_and_blocks() {
        let src = "package shop\n\nimport (\n\t\"fmt\"\n\tst \"github.com/acme/shop/stock\"\n)\n\n// Cart holds items.\ntype Cart struct {\n\tItems []string\n}\n\nfunc (c *Cart) Add(s string) {\n\tif s != \"\" {\n\t\tfmt.Println(st.Level(s))\n\t}\n}\n\nfunc Map[T any](xs []T) []T { return xs }\n";
        let out = scan(Language::Go, src);
        assert_eq!(spans(&out), vec![("Cart", 9, 11), ("Add", 13, 17), ("Map", 19, 19)]);
        assert_eq!(out.declarations[0].kind, ItemKind::Class);
        assert_eq!(out.declarations[0].doc.as_deref(), Some("Cart holds items."));
        assert_eq!(out.declarations[1].signature, "func (c *Cart) Add(s string)");
        assert_eq!(out.imports, vec!["fmt", "github.com.acme.shop.stock"]);
    }

    #[test]
    fn go_single_import() {
        let out = scan(Language::Go, "package main\n\nimport \"net/http\"\n\nfunc main() {}\n");
        assert_eq!(out.imports, vec!["net.http"]);
        assert_eq!(spans(&out), vec![("main", 5, 5)]);
    }

    #[test]
    fn script_declarations() {
        let src = "import { Cart } from './cart';\nimport './polyfill';\nconst db = require('./db');\n\nexport class Shop {\n  run() {\n    return new Cart();\n  }\n}\n\nexport const total = (items) => {\n  return items.length;\n};\n\nexport async function load(id) {\n  return db.get(id);\n}\n\nexport interface User {\n  id: number;\n}\n";
        let out = scan(Language::TypeScript, src);
        assert_eq!(
            spans(&out),
            vec![("Shop", 5, 9), ("total", 11, 13), ("load", 15, 17), ("User", 19, 21)]
        );
        assert_eq!(out.imports, vec![".cart.Cart", ".polyfill", ".db"]);
    }

    #[test]
    fn indented_members_are_not_top_level() {
        let out = scan(Language::JavaScript, "class A {\n  function inner() {}\n}\n");
        assert_eq!(spans(&out), vec![("A", 1, 3)]);
    }

    #[test]
    fn unbalanced_block_stops_at_cap() {
        let mut src = String::from("function broken() {\n");
        src.push_str(&"  x();\n".repeat(50));
        let opts = ExtractOptions {
            max_block_lines: 10,
            ..ExtractOptions::default()
        };
        let out = PatternExtractor::new(Language::JavaScript, opts)
            .unwrap()
            .scan(&src)
            .unwrap();
        assert_eq!(spans(&out), vec![("broken", 1, 10)]);
    }

    #[test]
    fn one_line_declarations() {
        let lines = ["const f = x => x * 2;", "", "next"];
        assert_eq!(block_end(&lines, 0, 100), 0);
        let lines = ["function g()", "", "", "", "", "", "{", "}"];
        assert_eq!(block_end(&lines, 0, 100), 0);
    }

    #[test]
    fn multiline_named_import() {
        let out = scan(
            Language::JavaScript,
            "import {\n  A,\n  B as C,\n} from '../lib/x';\n",
        );
        assert_eq!(out.imports, vec!["..lib.x.A", "..lib.x.B"]);
    }
}
