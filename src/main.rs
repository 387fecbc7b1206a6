use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use ctxgraph::config::{load_config, CtxGraphConfig};
use ctxgraph::context::{ContextService, SearchRequest};
use ctxgraph::indexer::FastEmbedProvider;
use ctxgraph::observability::init_logging;

#[derive(Parser)]
#[command(name = "ctxgraph")]
#[command(version, about = "Queryable code dependency graph with graph-expanded context bundles")]
struct Cli {
    /// Project root (default: current dir)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory or a single file under the root, then link
    Index {
        /// Path to index (default: the project root)
        path: Option<PathBuf>,
        /// Re-extract files even when unchanged
        #[arg(long)]
        force: bool,
        /// Also compute embeddings for items that lack one
        #[arg(long)]
        semantic: bool,
    },
    /// Search the graph and print a context bundle
    Search {
        /// Query text
        text: String,
        /// Restrict seeds to one item type (file, class, function)
        #[arg(long = "type")]
        item_type: Option<String>,
        /// Blend keyword search with embeddings
        #[arg(long)]
        semantic: bool,
        /// Dependency hops to expand from the seeds
        #[arg(long)]
        depth: Option<usize>,
        /// Maximum seed items
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Emit JSON instead of the tagged bundle
        #[arg(long)]
        json: bool,
    },
    /// Print the current source of one item
    Read {
        /// Item id, e.g. class:orders.py:OrderProcessor
        id: String,
    },
    /// List items that depend on an item
    Impacts {
        /// Item id
        id: String,
    },
    /// Export nodes and resolved edges as JSON
    Graph,
    /// Show index statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(Some(&cli.root)).unwrap_or_else(|e| fail(&e));
    let wants_embedder = match &cli.command {
        Commands::Index { semantic, .. } | Commands::Search { semantic, .. } => *semantic,
        _ => false,
    } || config.embedding.enabled;
    let service = open_service(&cli.root, config, wants_embedder);

    match cli.command {
        Commands::Index { path, force, semantic } => {
            cmd_index(&service, path.as_deref(), force, semantic);
        }
        Commands::Search {
            text,
            item_type,
            semantic,
            depth,
            limit,
            json,
        } => {
            let request = SearchRequest {
                text,
                type_filter: item_type,
                semantic,
                depth,
                limit,
            };
            cmd_search(&service, &request, json);
        }
        Commands::Read { id } => cmd_read(&service, &id),
        Commands::Impacts { id } => cmd_impacts(&service, &id),
        Commands::Graph => cmd_graph(&service),
        Commands::Stats => cmd_stats(&service),
    }
}

// ---------------------------------------------------------------------------
// CLI command implementations
// ---------------------------------------------------------------------------

fn fail(err: &dyn std::fmt::Display) -> ! {
    eprintln!("Error: {err}");
    process::exit(1);
}

fn open_service(root: &Path, config: CtxGraphConfig, with_embedder: bool) -> ContextService {
    let model = config.embedding.model.clone();
    let service = ContextService::open(root, config).unwrap_or_else(|e| fail(&e));
    if !with_embedder {
        return service;
    }
    match FastEmbedProvider::try_new(&model) {
        Ok(provider) => service.with_embedder(Box::new(provider)),
        Err(e) => {
            eprintln!("[ctxgraph] Warning: semantic search unavailable: {e}");
            service
        }
    }
}

fn cmd_index(service: &ContextService, path: Option<&Path>, force: bool, semantic: bool) {
    let result = service
        .index(path, force, semantic)
        .unwrap_or_else(|e| fail(&e));
    eprintln!("[ctxgraph] {result}");
}

fn cmd_search(service: &ContextService, request: &SearchRequest, json: bool) {
    let bundle = service.search(request).unwrap_or_else(|e| fail(&e));
    if json {
        match serde_json::to_string_pretty(&bundle) {
            Ok(out) => println!("{out}"),
            Err(e) => fail(&e),
        }
    } else {
        println!("{bundle}");
    }
}

fn cmd_read(service: &ContextService, id: &str) {
    let read = service.read(id).unwrap_or_else(|e| fail(&e));
    if let Some(reason) = read.stale {
        eprintln!("[ctxgraph] Warning: {reason}; showing indexed content");
    }
    println!("{}", read.content);
}

fn cmd_impacts(service: &ContextService, id: &str) {
    let impact = service.impacts(id).unwrap_or_else(|e| fail(&e));
    println!("{impact}");
}

fn cmd_graph(service: &ContextService) {
    let export = service.graph_export().unwrap_or_else(|e| fail(&e));
    match export.to_json() {
        Ok(out) => println!("{out}"),
        Err(e) => fail(&e),
    }
}

fn cmd_stats(service: &ContextService) {
    let stats = service.stats().unwrap_or_else(|e| fail(&e));
    println!("Files:          {}", stats.files);
    println!("Items:          {}", stats.items);
    println!("Edges:          {}", stats.edges);
    println!("Resolved edges: {}", stats.resolved_edges);
}
