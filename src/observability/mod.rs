//! Logging setup and path guards.
//!
//! - [`init_logging`]: one-time `tracing` subscriber with `RUST_LOG` support
//! - [`validate_path`]: keep user-supplied paths inside the project root

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::error::{CtxGraphError, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ctxgraph=info";

/// Install the stderr subscriber. `verbose` lowers the default filter to
/// `debug`; an explicit `RUST_LOG` always wins. Later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "ctxgraph=debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve `path` against `root` and check the result stays under it.
/// Returns the canonical path.
pub fn validate_path(path: &Path, root: &Path) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|e| CtxGraphError::NotFound(format!("project root {}: {e}", root.display())))?;
    let requested = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let canonical = requested
        .canonicalize()
        .map_err(|e| CtxGraphError::NotFound(format!("{}: {e}", path.display())))?;

    if !canonical.starts_with(&root) {
        return Err(CtxGraphError::Other(format!(
            "{} is outside the project root",
            path.display()
        )));
    }
    Ok(canonical)
}
