//! Core domain types for ctxgraph.
//!
//! Items are the nodes of the graph (whole files and extracted symbols),
//! edges are the possibly-unresolved dependency references between them,
//! and tracked files drive incremental re-indexing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Source languages with a registered extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Self::Python,
        Self::JavaScript,
        Self::TypeScript,
        Self::Tsx,
        Self::Go,
    ];

    /// Map a file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Detect the language of `path` from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Declarative tree-sitter query describing classes, functions and
    /// imports for this language.
    pub fn query_source(&self) -> &'static str {
        match self {
            Self::Python => include_str!("../queries/python.scm"),
            Self::JavaScript => include_str!("../queries/javascript.scm"),
            Self::TypeScript | Self::Tsx => include_str!("../queries/typescript.scm"),
            Self::Go => include_str!("../queries/go.scm"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
        }
    }

    /// True for languages whose blocks are delimited by `{` / `}`.
    pub fn is_brace_delimited(&self) -> bool {
        !matches!(self, Self::Python)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Layer / ItemKind
// ---------------------------------------------------------------------------

/// Which layer of the graph an item belongs to.
///
/// `Project` marks whole-file summaries, `Semantic` marks extracted symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Layer {
    Project,
    Semantic,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "PROJECT",
            Self::Semantic => "SEMANTIC",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PROJECT" => Some(Self::Project),
            "SEMANTIC" => Some(Self::Semantic),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of items. Structs, interfaces and Go types are all `Class`;
/// methods and function-valued variables are all `Function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Class,
    Function,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Function => "function",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "file" | "module" => Some(Self::File),
            "class" | "struct" | "interface" | "type" => Some(Self::Class),
            "function" | "func" | "method" => Some(Self::Function),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A persisted file summary or extracted symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub layer: Layer,
    pub content: String,
    /// Open key/value map. Always carries `type` and `name`; symbols also
    /// carry `lineno` and `dependencies`.
    pub metadata: Map<String, Value>,
    pub source_file: String,
    pub line_number: u32,
    /// Log-scaled resolved in-degree. Written only by the linker.
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Item {
    /// Build the item summarising a whole file.
    pub fn file(
        path: &Path,
        relative: &str,
        content_len: usize,
        language: Language,
        dependencies: Vec<String>,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".into(), ItemKind::File.as_str().into());
        metadata.insert("name".into(), file_stem(path).into());
        metadata.insert("path".into(), relative.into());
        metadata.insert("language".into(), language.as_str().into());
        metadata.insert("dependencies".into(), string_array(dependencies));

        Self {
            id: make_file_id(path),
            layer: Layer::Project,
            content: format!("File: {relative}\nLength: {content_len} chars"),
            metadata,
            source_file: path.to_string_lossy().into_owned(),
            line_number: 1,
            score: 0.0,
            embedding: None,
        }
    }

    /// Build an extracted symbol item.
    pub fn symbol(path: &Path, kind: ItemKind, name: &str, span: LineSpan, language: Language) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".into(), kind.as_str().into());
        metadata.insert("name".into(), name.into());
        metadata.insert("file".into(), file_base_name(path).into());
        metadata.insert("lineno".into(), span.start.into());
        metadata.insert("end_lineno".into(), span.end.into());
        metadata.insert("language".into(), language.as_str().into());
        metadata.insert("dependencies".into(), Value::Array(Vec::new()));

        Self {
            id: make_item_id(kind, path, name),
            layer: Layer::Semantic,
            content: format!("{kind} {name}"),
            metadata,
            source_file: path.to_string_lossy().into_owned(),
            line_number: span.start,
            score: 0.0,
            embedding: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.metadata.insert("dependencies".into(), string_array(deps));
        self
    }

    /// `metadata.type` parsed as an [`ItemKind`].
    pub fn kind(&self) -> Option<ItemKind> {
        self.item_type().and_then(ItemKind::from_str_loose)
    }

    pub fn item_type(&self) -> Option<&str> {
        self.metadata.get("type").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(Value::as_str)
    }

    /// Raw dependency strings, in extraction order.
    pub fn dependencies(&self) -> Vec<String> {
        match self.metadata.get("dependencies") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Last line of the symbol's block, when the extractor recorded one.
    pub fn end_line(&self) -> Option<u32> {
        self.metadata
            .get("end_lineno")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

/// 1-based inclusive line range of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end: end.max(start) }
    }
}

// ---------------------------------------------------------------------------
// Edge / TrackedFile
// ---------------------------------------------------------------------------

/// The only relation currently produced by extraction.
pub const RELATION_IMPORT: &str = "import";

/// A directed, possibly-unresolved reference from one item to another.
///
/// `(source_id, target_key, relation_type)` is unique. `target_id` is only
/// ever written by the linker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_key: String,
    pub target_id: Option<String>,
    pub relation_type: String,
}

impl Edge {
    pub fn import(source_id: &str, target_key: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_key: target_key.to_string(),
            target_id: None,
            relation_type: RELATION_IMPORT.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target_id.is_some()
    }
}

/// Incremental re-index bookkeeping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: String,
    /// Seconds since the Unix epoch, fractional.
    pub last_modified: f64,
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// `"{kind}:{fileBaseName}:{symbolName}"`.
///
/// Only the base name takes part, so two files sharing a base name in
/// different directories share an id space.
pub fn make_item_id(kind: ItemKind, path: &Path, name: &str) -> String {
    format!("{}:{}:{}", kind.as_str(), file_base_name(path), name)
}

/// `"file:{fileBaseName}"`.
pub fn make_file_id(path: &Path) -> String {
    format!("file:{}", file_base_name(path))
}

pub fn file_base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_base_name(path))
}

fn string_array(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}
