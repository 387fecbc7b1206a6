//! Configuration data structures.
//!
//! Every section and field has a default, so a YAML file only needs the
//! keys it wants to change:
//!
//! ```yaml
//! index:
//!   extractor: pattern
//!   exclude: ["vendor/**"]
//! search:
//!   alpha: 0.3
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CtxGraphError, Result};
use crate::indexer::embedder::EmbeddingModelChoice;
use crate::indexer::extractor::{ExtractorStrategy, DEFAULT_MAX_BLOCK_LINES, DEFAULT_MAX_FILE_SIZE};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtxGraphConfig {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
}

impl CtxGraphConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.search.alpha) {
            return Err(CtxGraphError::Config(format!(
                "search.alpha must be within 0..=1, got {}",
                self.search.alpha
            )));
        }
        if self.search.limit == 0 {
            return Err(CtxGraphError::Config("search.limit must be at least 1".into()));
        }
        if self.storage.dir.trim().is_empty() || self.storage.db_file.trim().is_empty() {
            return Err(CtxGraphError::Config("storage paths must not be empty".into()));
        }
        if EmbeddingModelChoice::from_name(&self.embedding.model).is_none() {
            return Err(CtxGraphError::Config(format!(
                "embedding.model {:?} is not a supported model",
                self.embedding.model
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the store lives, relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: ".context_aware".into(),
            db_file: "context.db".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub extractor: ExtractorStrategy,
    /// Bytes; larger files are skipped.
    pub max_file_size: u64,
    /// Cap on lines scanned when isolating one block.
    pub max_block_lines: usize,
    /// Gitignore-style globs relative to the project root.
    pub exclude: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorStrategy::Grammar,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_block_lines: DEFAULT_MAX_BLOCK_LINES,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Weight of cosine similarity in hybrid scoring.
    pub alpha: f64,
    /// Number of seed items.
    pub limit: usize,
    /// Breadth-first hops from the seed.
    pub depth: usize,
    /// Upper bound on rendered bundle size.
    pub max_bundle_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            limit: 20,
            depth: 1,
            max_bundle_chars: 24_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    /// fastembed model name, e.g. `all-MiniLM-L6-v2` or `bge-small-en-v1.5`.
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "all-MiniLM-L6-v2".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
