//! End-to-end tests over the shop-project fixture: extract, store, link,
//! route and read across Python, TypeScript and Go sources.

use std::fs;
use std::path::{Path, PathBuf};

use ctxgraph::config::CtxGraphConfig;
use ctxgraph::context::{ContextService, SearchRequest, StaleReason};
use ctxgraph::graph::store::ContextStore;
use ctxgraph::graph::traversal::GraphRouter;
use ctxgraph::indexer::extractor::ExtractorStrategy;
use ctxgraph::indexer::pipeline::{IndexOptions, IndexResult, IndexingPipeline};

fn fixture_path() -> PathBuf {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shop-project");
    assert!(path.exists(), "shop-project fixture must exist");
    path
}

/// Index the fixture into an in-memory store with `strategy`.
fn index_fixture(strategy: ExtractorStrategy) -> (ContextStore, IndexResult) {
    let store = ContextStore::new(":memory:").unwrap();
    let options = IndexOptions {
        strategy,
        ..IndexOptions::default()
    };
    let result = IndexingPipeline::new(&store)
        .index_path(&fixture_path(), &options)
        .unwrap();
    eprintln!("[fixture] {result}");
    (store, result)
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let dest = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &dest);
        } else {
            fs::copy(entry.path(), dest).unwrap();
        }
    }
}

/// A writable copy of the fixture opened through the service facade.
fn service_on_copy() -> (tempfile::TempDir, ContextService) {
    let tmp = tempfile::tempdir().unwrap();
    copy_dir(&fixture_path(), tmp.path());
    let service = ContextService::open(tmp.path(), CtxGraphConfig::default()).unwrap();
    (tmp, service)
}

fn score(store: &ContextStore, id: &str) -> f64 {
    store
        .get_item(id)
        .unwrap()
        .unwrap_or_else(|| panic!("missing item {id}"))
        .score
}

// ---------------------------------------------------------------------------
// Extraction and linking
// ---------------------------------------------------------------------------

#[test]
fn fixture_indexes_every_language() {
    let (store, result) = index_fixture(ExtractorStrategy::Grammar);
    assert_eq!(result.files_scanned, 6);
    assert_eq!(result.files_indexed, 6);

    for id in [
        "file:orders.py",
        "class:inventory.py:InventoryService",
        "function:inventory.py:restock",
        "function:invoice.py:issue_invoice",
        "class:cart.ts:Cart",
        "function:pricing.ts:priceFor",
        "class:pricing.ts:PriceRule",
        "class:server.go:Server",
        "function:server.go:Start",
    ] {
        assert!(store.get_item(id).unwrap().is_some(), "expected {id}");
    }

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.files, 6);
    assert!(stats.resolved_edges >= 5, "got {}", stats.resolved_edges);
}

#[test]
fn centrality_follows_in_degree() {
    let (store, _) = index_fixture(ExtractorStrategy::Grammar);
    let inventory = score(&store, "class:inventory.py:InventoryService");
    let orders = score(&store, "class:orders.py:OrderProcessor");
    assert!(inventory > orders, "{inventory} <= {orders}");
    assert!(orders > 0.0);
    assert_eq!(score(&store, "function:inventory.py:restock"), 0.0);
}

#[test]
fn cross_file_typescript_reference_resolves() {
    let (store, _) = index_fixture(ExtractorStrategy::Grammar);
    let dependents = store.get_dependents("function:pricing.ts:priceFor").unwrap();
    assert!(dependents.iter().any(|i| i.id == "class:cart.ts:Cart"));
}

#[test]
fn pattern_strategy_yields_same_brace_language_items() {
    let (store, result) = index_fixture(ExtractorStrategy::Pattern);
    assert_eq!(result.files_indexed, 6);

    // Python has no pattern family and falls back to the grammar extractor.
    assert!(store.get_item("class:orders.py:OrderProcessor").unwrap().is_some());

    for id in [
        "class:cart.ts:Cart",
        "function:pricing.ts:priceFor",
        "class:server.go:Server",
        "function:server.go:Start",
    ] {
        assert!(store.get_item(id).unwrap().is_some(), "expected {id}");
    }
    let dependents = store.get_dependents("function:pricing.ts:priceFor").unwrap();
    assert!(dependents.iter().any(|i| i.id == "class:cart.ts:Cart"));
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[test]
fn routing_seeds_then_expands_by_depth() {
    let (store, _) = index_fixture(ExtractorStrategy::Grammar);
    let router = GraphRouter::new(&store);

    let seeds = router.route("issue_invoice", Some("function"), 0).unwrap();
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].id, "function:invoice.py:issue_invoice");

    let expanded = router.route("issue_invoice", Some("function"), 1).unwrap();
    let ids: Vec<&str> = expanded.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids[0], "function:invoice.py:issue_invoice");
    assert!(ids.contains(&"class:orders.py:OrderProcessor"));
    assert!(ids.contains(&"class:inventory.py:InventoryService"));

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len(), "items appear once");
}

// ---------------------------------------------------------------------------
// Service: search, read, incremental maintenance
// ---------------------------------------------------------------------------

#[test]
fn service_search_renders_bundle() {
    let (_tmp, service) = service_on_copy();
    service.index(None, false, false).unwrap();

    let bundle = service.search(&SearchRequest::new("Cart")).unwrap();
    let rendered = bundle.render();
    assert!(rendered.starts_with("<context_aware_context>"));
    assert!(rendered.contains("<item id='class:cart.ts:Cart'"));
    assert!(rendered.ends_with("</context_aware_context>"));
}

#[test]
fn deleted_file_is_cleaned_up_and_references_dangle() {
    let (tmp, service) = service_on_copy();
    service.index(None, false, false).unwrap();

    let cart = service.read("class:cart.ts:Cart").unwrap();
    assert!(cart.is_fresh());
    assert!(cart.content.contains("skus.map(priceFor)"));

    fs::remove_file(tmp.path().join("web/pricing.ts")).unwrap();
    let result = service.index(None, false, false).unwrap();
    assert_eq!(result.files_removed, 1);
    assert_eq!(result.files_indexed, 0, "unchanged files are skipped");

    let store = service.store();
    assert!(store.get_item("function:pricing.ts:priceFor").unwrap().is_none());
    assert!(store.get_item("class:pricing.ts:PriceRule").unwrap().is_none());
    assert!(store.get_dependents("function:pricing.ts:priceFor").unwrap().is_empty());
    let pending = store.get_pending_edges(&["class:cart.ts:Cart".to_string()]).unwrap();
    assert!(pending.iter().any(|e| e.target_key == ".pricing.priceFor"));
}

#[test]
fn single_file_index_never_removes_other_files() {
    let (tmp, service) = service_on_copy();
    service.index(None, false, false).unwrap();

    fs::remove_file(tmp.path().join("billing/invoice.py")).unwrap();
    let result = service
        .index(Some(Path::new("shop/orders.py")), true, false)
        .unwrap();
    assert_eq!(result.files_removed, 0);
    assert_eq!(result.files_indexed, 1);

    let invoice = service.read("function:invoice.py:issue_invoice").unwrap();
    assert_eq!(invoice.stale, Some(StaleReason::FileMissing));

    service.index(None, false, false).unwrap();
    assert!(service.store().get_item("function:invoice.py:issue_invoice").unwrap().is_none());
}

#[test]
fn storage_directory_is_not_indexed() {
    let (tmp, service) = service_on_copy();
    fs::write(
        tmp.path().join(".context_aware/stray.py"),
        "class Stray:\n    pass\n",
    )
    .unwrap();
    let result = service.index(None, false, false).unwrap();
    assert_eq!(result.files_scanned, 6);
    assert!(service.store().get_item("class:stray.py:Stray").unwrap().is_none());
}
