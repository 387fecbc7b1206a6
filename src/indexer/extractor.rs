//! The extraction capability and the pieces shared by every variant.
//!
//! An [`Extractor`] turns one source file into [`Item`]s: a file summary
//! followed by its class and function symbols, each carrying raw import keys
//! in `metadata.dependencies`. Variants only implement [`Extractor::scan`];
//! reading, size limits, item assembly and fresh-source lookup are shared.
//!
//! Extraction never fails loudly. Unreadable, non-UTF-8, oversized or
//! unparsable input yields an empty result and a `debug!` line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indexer::grammar::TreeSitterExtractor;
use crate::indexer::pattern::PatternExtractor;
use crate::resolution::names::short_name;
use crate::types::{Item, ItemKind, Language, LineSpan};

/// Files larger than this are skipped unless configured otherwise.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Upper bound on lines scanned while isolating one block.
pub const DEFAULT_MAX_BLOCK_LINES: usize = 2000;

// ---------------------------------------------------------------------------
// Options and strategy
// ---------------------------------------------------------------------------

/// Which family of extractors to prefer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorStrategy {
    /// Tree-sitter queries.
    #[default]
    Grammar,
    /// Line-start regexes plus brace counting.
    Pattern,
}

impl ExtractorStrategy {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grammar" | "tree-sitter" | "treesitter" => Some(Self::Grammar),
            "pattern" | "regex" => Some(Self::Pattern),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Project root used to compute relative paths for file items.
    pub root: Option<PathBuf>,
    pub max_file_size: u64,
    pub max_block_lines: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            root: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_block_lines: DEFAULT_MAX_BLOCK_LINES,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan output
// ---------------------------------------------------------------------------

/// A class or function found by a scanner, before it becomes an [`Item`].
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: ItemKind,
    pub name: String,
    /// 1-based inclusive line range of the whole declaration.
    pub span: LineSpan,
    pub signature: String,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    /// Declarations in source order.
    pub declarations: Vec<Declaration>,
    /// Normalised import keys, deduplicated, in source order.
    pub imports: Vec<String>,
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

pub trait Extractor: Send + Sync {
    fn language(&self) -> Language;

    fn options(&self) -> &ExtractOptions;

    /// Find declarations and imports in `source`. `None` means the source
    /// could not be parsed at all.
    fn scan(&self, source: &str) -> Option<ScanOutput>;

    /// Items for `path`: the file summary first, then symbols in source order.
    fn analyze(&self, path: &Path) -> Vec<Item> {
        let Some(source) = read_source(path, self.options().max_file_size) else {
            return Vec::new();
        };
        let Some(scan) = self.scan(&source) else {
            debug!(path = %path.display(), "unparsable source skipped");
            return Vec::new();
        };
        let relative = relative_path(path, self.options().root.as_deref());
        build_items(path, &relative, self.language(), &source, scan)
    }

    /// Current text of the first declaration named `symbol`, re-read from
    /// disk. `None` when the file or the symbol no longer exists.
    fn extract_source(&self, path: &Path, symbol: &str) -> Option<String> {
        let source = read_source(path, self.options().max_file_size)?;
        let scan = self.scan(&source)?;
        let decl = scan.declarations.iter().find(|d| d.name == symbol)?;
        Some(slice_lines(&source, decl.span))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// True when some extractor handles `path`'s extension.
pub fn is_supported(path: &Path) -> bool {
    Language::from_path(path).is_some()
}

/// Pick the extractor for `path`. The pattern strategy falls back to the
/// grammar variant for languages without a pattern family.
pub fn extractor_for(
    path: &Path,
    strategy: ExtractorStrategy,
    options: &ExtractOptions,
) -> Option<Box<dyn Extractor>> {
    let language = Language::from_path(path)?;
    Some(build_extractor(language, strategy, options))
}

fn build_extractor(
    language: Language,
    strategy: ExtractorStrategy,
    options: &ExtractOptions,
) -> Box<dyn Extractor> {
    if strategy == ExtractorStrategy::Pattern {
        if let Some(pattern) = PatternExtractor::new(language, options.clone()) {
            return Box::new(pattern);
        }
    }
    Box::new(TreeSitterExtractor::new(language, options.clone()))
}

/// One extractor per language, built up front so a run compiles each
/// grammar query once and can share extractors across threads.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn new(strategy: ExtractorStrategy, options: &ExtractOptions) -> Self {
        let extractors = Language::ALL
            .into_iter()
            .map(|language| build_extractor(language, strategy, options))
            .collect();
        Self { extractors }
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn Extractor> {
        let language = Language::from_path(path)?;
        self.extractors
            .iter()
            .find(|e| e.language() == language)
            .map(|e| e.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read `path` as UTF-8, or `None` if it is missing, too large or not text.
pub fn read_source(path: &Path, max_size: u64) -> Option<String> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable file skipped");
            return None;
        }
    };
    if meta.len() > max_size {
        debug!(path = %path.display(), size = meta.len(), "oversized file skipped");
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    match String::from_utf8(bytes) {
        Ok(s) => Some(s),
        Err(_) => {
            debug!(path = %path.display(), "non-UTF-8 file skipped");
            None
        }
    }
}

/// `path` relative to `root` with `/` separators, or the full path.
pub fn relative_path(path: &Path, root: Option<&Path>) -> String {
    let rel = root
        .and_then(|r| path.strip_prefix(r).ok())
        .unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Lines `span.start..=span.end` (1-based) of `source`.
pub fn slice_lines(source: &str, span: LineSpan) -> String {
    let first = span.start.max(1);
    let last = span.end.max(first);
    source
        .lines()
        .skip(first as usize - 1)
        .take((last - first + 1) as usize)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `ident` occurs in `text` with no identifier character on
/// either side.
pub fn contains_identifier(text: &str, ident: &str) -> bool {
    if ident.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    text.match_indices(ident).any(|(pos, _)| {
        let before = text[..pos].chars().next_back();
        let after = text[pos + ident.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Collapse runs of whitespace and drop a trailing block opener.
pub fn compact_signature(raw: &str) -> String {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .trim_end_matches(|c: char| c == '{' || c == ':' || c.is_whitespace())
        .to_string()
}

/// Assemble the file item and symbol items from one scan.
pub fn build_items(
    path: &Path,
    relative: &str,
    language: Language,
    source: &str,
    scan: ScanOutput,
) -> Vec<Item> {
    let ScanOutput {
        declarations,
        imports,
    } = scan;

    let mut items = Vec::with_capacity(declarations.len() + 1);
    items.push(Item::file(
        path,
        relative,
        source.chars().count(),
        language,
        imports.clone(),
    ));

    let mut seen: HashSet<String> = HashSet::new();
    for decl in declarations {
        let mut item = Item::symbol(path, decl.kind, &decl.name, decl.span, language);
        if !seen.insert(item.id.clone()) {
            debug!(id = %item.id, line = decl.span.start, "duplicate symbol dropped");
            continue;
        }

        let body = slice_lines(source, decl.span);
        let deps: Vec<String> = imports
            .iter()
            .filter(|key| contains_identifier(&body, short_name(key)))
            .cloned()
            .collect();

        let mut content = if decl.signature.is_empty() {
            format!("{} {}", decl.kind, decl.name)
        } else {
            decl.signature
        };
        if let Some(doc) = decl.doc.filter(|d| !d.trim().is_empty()) {
            content.push('\n');
            content.push_str(doc.trim());
        }

        item = item.with_content(content).with_dependencies(deps);
        items.push(item);
    }
    items
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn decl(kind: ItemKind, name: &str, start: u32, end: u32) -> Declaration {
        Declaration {
            kind,
            name: name.into(),
            span: LineSpan::new(start, end),
            signature: String::new(),
            doc: None,
        }
    }

    #[test]
    fn identifier_boundaries() {
        assert!(contains_identifier("return Stock(1)", "Stock"));
        assert!(!contains_identifier("return Stocks(1)", "Stock"));
        assert!(!contains_identifier("my_Stock", "Stock"));
        assert!(contains_identifier("Stock", "Stock"));
        assert!(!contains_identifier("anything", ""));
    }

    #[test]
    fn slice_lines_is_inclusive() {
        let src = "a\nb\nc\nd";
        assert_eq!(slice_lines(src, LineSpan::new(2, 3)), "b\nc");
        assert_eq!(slice_lines(src, LineSpan::new(4, 9)), "d");
    }

    #[test]
    fn signature_compaction() {
        assert_eq!(compact_signature("def f(a,\n      b):"), "def f(a, b)");
        assert_eq!(compact_signature("func (c *Cart) Add(x int) error {"), "func (c *Cart) Add(x int) error");
    }

    #[test]
    fn build_items_assigns_body_dependencies() {
        let source = "import os\nfrom shop.stock import Stock\n\ndef check():\n    return Stock()\n\ndef other():\n    pass\n";
        let scan = ScanOutput {
            declarations: vec![
                decl(ItemKind::Function, "check", 4, 5),
                decl(ItemKind::Function, "other", 7, 8),
                decl(ItemKind::Function, "check", 10, 11),
            ],
            imports: vec!["os".into(), "shop.stock.Stock".into()],
        };
        let items = build_items(Path::new("/p/svc.py"), "svc.py", Language::Python, source, scan);

        assert_eq!(items.len(), 3, "file item plus two unique symbols");
        assert_eq!(items[0].id, "file:svc.py");
        assert_eq!(items[0].dependencies(), vec!["os", "shop.stock.Stock"]);
        assert_eq!(items[1].id, "function:svc.py:check");
        assert_eq!(items[1].dependencies(), vec!["shop.stock.Stock"]);
        assert_eq!(items[1].content, "function check");
        assert!(items[2].dependencies().is_empty());
    }

    #[test]
    fn read_source_rejects_binary_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("blob.py");
        fs::write(&bin, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        assert!(read_source(&bin, DEFAULT_MAX_FILE_SIZE).is_none());

        let big = dir.path().join("big.py");
        fs::write(&big, "x = 1\n".repeat(100)).unwrap();
        assert!(read_source(&big, 10).is_none());
        assert!(read_source(&big, DEFAULT_MAX_FILE_SIZE).is_some());

        assert!(read_source(&dir.path().join("missing.py"), DEFAULT_MAX_FILE_SIZE).is_none());
    }

    #[test]
    fn registry_selects_by_extension_and_strategy() {
        let opts = ExtractOptions::default();
        assert!(extractor_for(Path::new("a.txt"), ExtractorStrategy::Grammar, &opts).is_none());
        let py = extractor_for(Path::new("a.py"), ExtractorStrategy::Pattern, &opts).unwrap();
        assert_eq!(py.language(), Language::Python);
        let go = extractor_for(Path::new("a.go"), ExtractorStrategy::Pattern, &opts).unwrap();
        assert_eq!(go.language(), Language::Go);
        assert_eq!(ExtractorStrategy::from_str_loose("Regex"), Some(ExtractorStrategy::Pattern));
        assert_eq!(ExtractorStrategy::from_str_loose("nope"), None);
    }

    #[test]
    fn extractor_set_covers_every_language() {
        let set = ExtractorSet::new(ExtractorStrategy::Pattern, &ExtractOptions::default());
        for (file, lang) in [("a.py", Language::Python), ("b.tsx", Language::Tsx), ("c.go", Language::Go)] {
            assert_eq!(set.for_path(Path::new(file)).map(|e| e.language()), Some(lang));
        }
        assert!(set.for_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        assert_eq!(
            relative_path(Path::new("/repo/src/a.py"), Some(Path::new("/repo"))),
            "src/a.py"
        );
        assert_eq!(relative_path(Path::new("/other/a.py"), Some(Path::new("/repo"))), "/other/a.py");
    }
}
