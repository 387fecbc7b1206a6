//! Fresh source retrieval for stored items.
//!
//! The store keeps a signature-sized summary of each symbol. Reading an
//! item goes back to disk: a file item returns the whole file, a symbol
//! returns its current block through the extractor. When that fails the
//! cached content is returned together with the reason it may be stale.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::indexer::extractor::{extractor_for, ExtractOptions, ExtractorStrategy};
use crate::types::{Item, ItemKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The source file no longer exists or cannot be read.
    FileMissing,
    /// The file exists but no longer declares the symbol.
    SymbolNotFound,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileMissing => f.write_str("source file is missing"),
            Self::SymbolNotFound => f.write_str("symbol no longer found in source"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadResult {
    pub item_id: String,
    pub content: String,
    /// `None` when `content` was read from disk just now.
    pub stale: Option<StaleReason>,
}

impl ReadResult {
    pub fn is_fresh(&self) -> bool {
        self.stale.is_none()
    }
}

/// Current source for `item`, falling back to its cached content.
pub fn read_fresh(item: &Item, strategy: ExtractorStrategy, options: &ExtractOptions) -> ReadResult {
    let path = Path::new(&item.source_file);
    let (content, stale) = match fresh_content(item, path, strategy, options) {
        Ok(content) => (content, None),
        Err(reason) => {
            debug!(id = %item.id, %reason, "serving cached content");
            (item.content.clone(), Some(reason))
        }
    };
    ReadResult {
        item_id: item.id.clone(),
        content,
        stale,
    }
}

fn fresh_content(
    item: &Item,
    path: &Path,
    strategy: ExtractorStrategy,
    options: &ExtractOptions,
) -> std::result::Result<String, StaleReason> {
    if !path.is_file() {
        return Err(StaleReason::FileMissing);
    }
    if item.kind() == Some(ItemKind::File) {
        return std::fs::read_to_string(path).map_err(|_| StaleReason::FileMissing);
    }
    let name = item.name().ok_or(StaleReason::SymbolNotFound)?;
    extractor_for(path, strategy, options)
        .and_then(|extractor| extractor.extract_source(path, name))
        .ok_or(StaleReason::SymbolNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::extractor::Extractor;
    use crate::indexer::grammar::TreeSitterExtractor;
    use crate::types::Language;
    use std::fs;

    fn analyze(path: &Path) -> Vec<Item> {
        TreeSitterExtractor::new(Language::Python, ExtractOptions::default()).analyze(path)
    }

    #[test]
    fn symbol_read_returns_current_block() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cart.py");
        fs::write(&path, "class Cart:\n    pass\n").unwrap();
        let items = analyze(&path);
        let cart = items.iter().find(|i| i.id == "class:cart.py:Cart").unwrap();

        fs::write(&path, "import os\n\nclass Cart:\n    size = 3\n").unwrap();
        let read = read_fresh(cart, ExtractorStrategy::Grammar, &ExtractOptions::default());
        assert!(read.is_fresh());
        assert_eq!(read.content, "class Cart:\n    size = 3");
    }

    #[test]
    fn file_item_reads_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cart.py");
        fs::write(&path, "x = 1\n").unwrap();
        let file_item = analyze(&path).remove(0);
        let read = read_fresh(&file_item, ExtractorStrategy::Grammar, &ExtractOptions::default());
        assert_eq!(read.content, "x = 1\n");
        assert_eq!(read.stale, None);
    }

    #[test]
    fn stale_reasons() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cart.py");
        fs::write(&path, "class Cart:\n    pass\n").unwrap();
        let cart = analyze(&path).remove(1);

        fs::write(&path, "class Basket:\n    pass\n").unwrap();
        let read = read_fresh(&cart, ExtractorStrategy::Grammar, &ExtractOptions::default());
        assert_eq!(read.stale, Some(StaleReason::SymbolNotFound));
        assert_eq!(read.content, cart.content);

        fs::remove_file(&path).unwrap();
        let read = read_fresh(&cart, ExtractorStrategy::Grammar, &ExtractOptions::default());
        assert_eq!(read.stale, Some(StaleReason::FileMissing));
    }
}
