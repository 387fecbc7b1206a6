//! Indexing pipeline.
//!
//! One run goes: discover files, skip the ones whose mtime is unchanged,
//! extract the rest in parallel, persist sequentially, clean up deleted
//! files (directory scope only), embed new items if asked, then run a full
//! link pass.
//!
//! Extraction runs on rayon with no store access. Each file's items and
//! its tracked mtime are committed before the next file, so an interrupted
//! run resumes where it stopped.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{CtxGraphError, Result};
use crate::graph::store::ContextStore;
use crate::indexer::embedder::{embed_missing, EmbeddingProvider};
use crate::indexer::extractor::{is_supported, ExtractOptions, ExtractorSet, ExtractorStrategy};
use crate::resolution::{LinkReport, Linker};
use crate::types::Item;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub strategy: ExtractorStrategy,
    pub extract: ExtractOptions,
    /// Re-extract every file regardless of its tracked mtime.
    pub force: bool,
    /// Embed items that have no vector yet (needs an embedder).
    pub with_semantic: bool,
    /// Extra gitignore-style globs to skip.
    pub exclude: Vec<String>,
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexResult {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub items_saved: usize,
    pub embeddings_written: usize,
    pub link: LinkReport,
    pub duration_ms: u128,
}

impl fmt::Display for IndexResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indexed {} of {} files ({} unchanged, {} removed): {} items",
            self.files_indexed,
            self.files_scanned,
            self.files_skipped,
            self.files_removed,
            self.items_saved,
        )?;
        if self.embeddings_written > 0 {
            write!(f, ", {} embeddings", self.embeddings_written)?;
        }
        write!(f, " in {}ms\n{}", self.duration_ms, self.link)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct IndexingPipeline<'a> {
    store: &'a ContextStore,
    embedder: Option<&'a dyn EmbeddingProvider>,
}

impl<'a> IndexingPipeline<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self {
            store,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Option<&'a dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Index a directory tree or a single file.
    ///
    /// Deleted-file cleanup only happens for a directory, and only for
    /// tracked files under that directory.
    pub fn index_path(&self, target: &Path, options: &IndexOptions) -> Result<IndexResult> {
        let start = Instant::now();
        let target = fs::canonicalize(target).map_err(|e| {
            CtxGraphError::NotFound(format!("{}: {e}", target.display()))
        })?;
        let is_dir = target.is_dir();

        let files = if is_dir {
            collect_files(&target, &options.exclude)?
        } else if is_supported(&target) {
            vec![target.clone()]
        } else {
            debug!(path = %target.display(), "unsupported file");
            Vec::new()
        };

        let mut result = IndexResult {
            files_scanned: files.len(),
            ..IndexResult::default()
        };

        // mtime checks touch the store, so they stay on this thread.
        let mut pending: Vec<(PathBuf, f64)> = Vec::new();
        for path in &files {
            let Some(mtime) = modified_secs(path) else {
                result.files_skipped += 1;
                continue;
            };
            if options.force || self.store.should_reindex(&path_key(path), mtime)? {
                pending.push((path.clone(), mtime));
            } else {
                result.files_skipped += 1;
            }
        }

        let mut extract = options.extract.clone();
        if extract.root.is_none() {
            extract.root = Some(if is_dir {
                target.clone()
            } else {
                target.parent().map(Path::to_path_buf).unwrap_or_default()
            });
        }
        let extractors = ExtractorSet::new(options.strategy, &extract);

        let analyzed: Vec<(PathBuf, f64, Vec<Item>)> = pending
            .into_par_iter()
            .map(|(path, mtime)| {
                let items = extractors
                    .for_path(&path)
                    .map(|e| e.analyze(&path))
                    .unwrap_or_default();
                (path, mtime, items)
            })
            .collect();

        for (path, mtime, items) in analyzed {
            if !items.is_empty() {
                self.store.save(&items)?;
                result.items_saved += items.len();
            }
            self.store.update_file_status(&path_key(&path), mtime)?;
            result.files_indexed += 1;
        }

        if is_dir {
            result.files_removed = self.cleanup(&target, &files)?;
        }

        if options.with_semantic {
            match self.embedder {
                Some(embedder) => result.embeddings_written = embed_missing(self.store, embedder)?,
                None => warn!("semantic indexing requested without an embedding provider"),
            }
        }

        result.link = Linker::new(self.store).link()?;
        result.duration_ms = start.elapsed().as_millis();
        info!(
            scanned = result.files_scanned,
            indexed = result.files_indexed,
            removed = result.files_removed,
            items = result.items_saved,
            "index run finished"
        );
        Ok(result)
    }

    /// Drop tracked files under `dir` that were not found by this scan.
    fn cleanup(&self, dir: &Path, found: &[PathBuf]) -> Result<usize> {
        let mut keep: HashSet<String> = found.iter().map(|p| path_key(p)).collect();
        for tracked in self.store.tracked_files()? {
            if !Path::new(&tracked.path).starts_with(dir) {
                keep.insert(tracked.path);
            }
        }
        let removed = self.store.cleanup_deleted_files(&keep)?;
        for path in &removed {
            debug!(path = %path, "removed deleted file");
        }
        Ok(removed.len())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Supported source files under `root`, honouring `.gitignore` and hidden
/// files, minus `exclude` globs. Sorted for stable runs.
pub fn collect_files(root: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in exclude {
        overrides
            .add(&format!("!{pattern}"))
            .map_err(|e| CtxGraphError::Config(format!("bad exclude pattern {pattern:?}: {e}")))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| CtxGraphError::Config(e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .standard_filters(true)
        .overrides(overrides)
        .build();

    let mut files: Vec<PathBuf> = walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path))
        .collect();
    files.sort();
    Ok(files)
}

/// Seconds since the epoch of the last modification.
pub fn modified_secs(path: &Path) -> Option<f64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

/// Key under which a file is tracked; matches `Item::source_file`.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
