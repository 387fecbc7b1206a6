//! Native tree-sitter parser wrapper.
//!
//! Grammars are statically linked and queries are embedded at compile time
//! via `include_str!` (see [`Language::query_source`]).
//!
//! `CodeParser` carries no state. Tree-sitter's `Parser` is `!Sync`, so a
//! fresh one is created per call; that is a single allocation plus a
//! pointer swap in `set_language`.

use crate::error::{CtxGraphError, Result};
use crate::types::Language;

pub struct CodeParser;

impl CodeParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse `content` with the grammar for `language`.
    pub fn parse(&self, content: &str, language: Language) -> Result<tree_sitter::Tree> {
        let ts_lang = Self::get_ts_language(language);

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&ts_lang)
            .map_err(|e| CtxGraphError::Parse(format!("language version mismatch: {e}")))?;

        parser
            .parse(content, None)
            .ok_or_else(|| CtxGraphError::Parse("tree-sitter returned no tree".into()))
    }

    #[must_use]
    pub fn get_ts_language(language: Language) -> tree_sitter::Language {
        match language {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Compile the embedded `.scm` query for `language`.
    pub fn load_query(language: Language) -> Result<tree_sitter::Query> {
        let ts_lang = Self::get_ts_language(language);
        tree_sitter::Query::new(&ts_lang, language.query_source()).map_err(|e| {
            CtxGraphError::Parse(format!("query compilation error for {language}: {e}"))
        })
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_query_compiles() {
        for lang in Language::ALL {
            let query = CodeParser::load_query(lang)
                .unwrap_or_else(|e| panic!("{lang} query failed: {e}"));
            let names = query.capture_names();
            assert!(names.contains(&"class.name"), "{lang} lacks class.name");
            assert!(names.contains(&"function.name"), "{lang} lacks function.name");
            assert!(names.contains(&"import"), "{lang} lacks import");
        }
    }

    #[test]
    fn parse_python_returns_module() {
        let tree = CodeParser::new()
            .parse("class A:\n    def f(self):\n        return 1\n", Language::Python)
            .unwrap();
        assert_eq!(tree.root_node().kind(), "module");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn parse_go_returns_source_file() {
        let tree = CodeParser::new()
            .parse("package main\n\nfunc main() {}\n", Language::Go)
            .unwrap();
        assert_eq!(tree.root_node().kind(), "source_file");
    }

    #[test]
    fn parse_typescript_and_tsx() {
        let parser = CodeParser::new();
        let ts = parser
            .parse("interface User { id: number }\n", Language::TypeScript)
            .unwrap();
        assert_eq!(ts.root_node().kind(), "program");
        let tsx = parser
            .parse("const App = () => <div />;\n", Language::Tsx)
            .unwrap();
        assert!(!tsx.root_node().has_error());
    }
}
