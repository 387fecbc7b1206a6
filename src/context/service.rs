//! `ContextService`: the query surface over one project's store.
//!
//! Binds a project root, its configuration and its store, and exposes the
//! operations the CLI (or any other front end) needs: index, search, read,
//! impacts, graph export and stats. The embedding provider is optional and
//! injected; nothing here constructs one.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::CtxGraphConfig;
use crate::context::assembler::ContextBundle;
use crate::context::export::GraphExport;
use crate::context::reader::{read_fresh, ReadResult};
use crate::error::{CtxGraphError, Result};
use crate::graph::ranking::{GraphRanking, ImpactResult};
use crate::graph::store::{ContextStore, GraphStats};
use crate::graph::traversal::GraphRouter;
use crate::indexer::embedder::EmbeddingProvider;
use crate::indexer::extractor::ExtractOptions;
use crate::indexer::pipeline::{IndexOptions, IndexResult, IndexingPipeline};
use crate::observability::validate_path;

/// Per-call search knobs; `None` falls back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub text: String,
    pub type_filter: Option<String>,
    pub semantic: bool,
    pub depth: Option<usize>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

pub struct ContextService {
    root: PathBuf,
    config: CtxGraphConfig,
    store: ContextStore,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

impl ContextService {
    /// Open (creating if needed) the store under `root` as configured.
    pub fn open(root: &Path, config: CtxGraphConfig) -> Result<Self> {
        config.validate()?;
        let root = root
            .canonicalize()
            .map_err(|e| CtxGraphError::NotFound(format!("{}: {e}", root.display())))?;
        let store = ContextStore::open(&root, &config.storage.dir, &config.storage.db_file)?;
        Ok(Self::with_store(root, config, store))
    }

    /// Wrap an already opened store. `root` should be canonical.
    pub fn with_store(root: PathBuf, config: CtxGraphConfig, store: ContextStore) -> Self {
        Self {
            root,
            config,
            store,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Box<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CtxGraphConfig {
        &self.config
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    fn embedder(&self) -> Option<&dyn EmbeddingProvider> {
        self.embedder.as_deref()
    }

    fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            root: Some(self.root.clone()),
            max_file_size: self.config.index.max_file_size,
            max_block_lines: self.config.index.max_block_lines,
        }
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Index `path` (the project root when `None`), then link.
    pub fn index(&self, path: Option<&Path>, force: bool, with_semantic: bool) -> Result<IndexResult> {
        let target = match path {
            Some(p) => validate_path(p, &self.root)?,
            None => self.root.clone(),
        };

        let mut exclude = self.config.index.exclude.clone();
        exclude.push(format!("{}/**", self.config.storage.dir.trim_end_matches('/')));

        let options = IndexOptions {
            strategy: self.config.index.extractor,
            extract: self.extract_options(),
            force,
            with_semantic,
            exclude,
        };
        info!(path = %target.display(), force, "indexing");
        IndexingPipeline::new(&self.store)
            .with_embedder(self.embedder())
            .index_path(&target, &options)
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Route `request` through the graph and pack the result.
    pub fn search(&self, request: &SearchRequest) -> Result<ContextBundle> {
        let search = &self.config.search;
        let embedder = if request.semantic { self.embedder() } else { None };
        let items = GraphRouter::new(&self.store)
            .with_embedder(embedder)
            .with_alpha(search.alpha)
            .with_limit(request.limit.unwrap_or(search.limit))
            .route(
                &request.text,
                request.type_filter.as_deref(),
                request.depth.unwrap_or(search.depth),
            )?;
        Ok(ContextBundle::assemble(items, search.max_bundle_chars))
    }

    /// Fresh source for `item_id`.
    pub fn read(&self, item_id: &str) -> Result<ReadResult> {
        let item = self
            .store
            .get_item(item_id)?
            .ok_or_else(|| CtxGraphError::NotFound(format!("item {item_id}")))?;
        Ok(read_fresh(&item, self.config.index.extractor, &self.extract_options()))
    }

    /// Items with a resolved edge into `item_id`.
    pub fn impacts(&self, item_id: &str) -> Result<ImpactResult> {
        if self.store.get_item(item_id)?.is_none() {
            return Err(CtxGraphError::NotFound(format!("item {item_id}")));
        }
        GraphRanking::new(&self.store).impacts(item_id)
    }

    pub fn graph_export(&self) -> Result<GraphExport> {
        GraphExport::from_store(&self.store)
    }

    pub fn stats(&self) -> Result<GraphStats> {
        self.store.get_stats()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::reader::StaleReason;
    use crate::indexer::embedder::tests::HashingEmbedder;
    use std::fs;

    fn project() -> (tempfile::TempDir, ContextService) {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("products")).unwrap();
        fs::write(
            tmp.path().join("products/inventory.py"),
            "class InventoryService:\n    \"\"\"Tracks stock levels.\"\"\"\n\n    def reserve(self, sku):\n        return True\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("orders.py"),
            "from products.inventory import InventoryService\n\nclass OrderProcessor:\n    def checkout(self, sku):\n        return InventoryService().reserve(sku)\n",
        )
        .unwrap();
        let service = ContextService::open(tmp.path(), CtxGraphConfig::default()).unwrap();
        (tmp, service)
    }

    #[test]
    fn open_creates_store_under_root() {
        let (tmp, _service) = project();
        assert!(tmp.path().join(".context_aware/context.db").exists());
    }

    #[test]
    fn index_then_search_expands_dependencies() {
        let (_tmp, service) = project();
        let result = service.index(None, false, false).unwrap();
        assert_eq!(result.files_indexed, 2);

        let bundle = service
            .search(&SearchRequest {
                type_filter: Some("class".into()),
                ..SearchRequest::new("OrderProcessor")
            })
            .unwrap();
        let ids: Vec<&str> = bundle.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "class:orders.py:OrderProcessor");
        assert!(ids.contains(&"class:inventory.py:InventoryService"));
        assert!(bundle.render().starts_with("<context_aware_context>"));
    }

    #[test]
    fn search_without_hits_renders_empty_marker() {
        let (_tmp, service) = project();
        service.index(None, false, false).unwrap();
        let bundle = service.search(&SearchRequest::new("zzzunknown")).unwrap();
        assert!(bundle.is_empty());
        assert!(bundle.render().contains("<!-- No context found -->"));
    }

    #[test]
    fn read_and_impacts() {
        let (tmp, service) = project();
        service.index(None, false, false).unwrap();

        let read = service.read("class:inventory.py:InventoryService").unwrap();
        assert!(read.is_fresh());
        assert!(read.content.contains("def reserve"));

        let impact = service.impacts("class:inventory.py:InventoryService").unwrap();
        assert!(impact
            .dependents
            .iter()
            .any(|i| i.id == "class:orders.py:OrderProcessor"));

        fs::remove_file(tmp.path().join("products/inventory.py")).unwrap();
        let read = service.read("class:inventory.py:InventoryService").unwrap();
        assert_eq!(read.stale, Some(StaleReason::FileMissing));

        assert!(matches!(service.read("class:nope.py:Nope"), Err(CtxGraphError::NotFound(_))));
        assert!(matches!(service.impacts("class:nope.py:Nope"), Err(CtxGraphError::NotFound(_))));
    }

    #[test]
    fn index_rejects_paths_outside_root() {
        let (_tmp, service) = project();
        let other = tempfile::tempdir().unwrap();
        assert!(service.index(Some(other.path()), false, false).is_err());
    }

    #[test]
    fn semantic_index_and_search_with_injected_embedder() {
        let (_tmp, service) = project();
        let service = service.with_embedder(Box::new(HashingEmbedder { dim: 32 }));
        let result = service.index(None, false, true).unwrap();
        assert!(result.embeddings_written > 0);

        let bundle = service
            .search(&SearchRequest {
                semantic: true,
                ..SearchRequest::new("stock levels")
            })
            .unwrap();
        assert!(!bundle.is_empty());
    }

    #[test]
    fn export_and_stats_reflect_index() {
        let (_tmp, service) = project();
        service.index(None, false, false).unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.files, 2);
        assert!(stats.resolved_edges >= 1);
        let export = service.graph_export().unwrap();
        assert_eq!(export.nodes.len(), stats.items);
        assert_eq!(export.edges.len(), stats.resolved_edges);
    }
}
