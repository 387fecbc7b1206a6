//! Multi-source config loading with priority merging.
//!
//! Priority order (highest wins):
//!   CLI flags > environment > project `.ctxgraph.yaml` > user config > defaults
//!
//! File layers are merged as YAML trees before deserialising, so a project
//! file that only sets `search.alpha` leaves everything the user file set
//! elsewhere untouched. CLI flags are applied by the caller.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, warn};

use super::schema::CtxGraphConfig;
use crate::error::{CtxGraphError, Result};
use crate::indexer::extractor::ExtractorStrategy;

/// Project config file name, looked up at the project root.
pub const PROJECT_CONFIG_FILE: &str = ".ctxgraph.yaml";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load configuration for `project_dir` from every source.
///
/// Missing files are skipped. A file that exists but is not valid YAML
/// for the schema is a [`CtxGraphError::Config`].
pub fn load_config(project_dir: Option<&Path>) -> Result<CtxGraphConfig> {
    load_layers(user_config_path().as_deref(), project_dir, |key| {
        std::env::var(key).ok()
    })
}

/// [`load_config`] with the user config path and environment injected.
pub fn load_layers(
    user_config: Option<&Path>,
    project_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CtxGraphConfig> {
    let mut merged = Value::Mapping(Default::default());

    if let Some(path) = user_config {
        if let Some(layer) = read_layer(path)? {
            merge_values(&mut merged, layer);
        }
    }
    if let Some(dir) = project_dir {
        if let Some(layer) = read_layer(&dir.join(PROJECT_CONFIG_FILE))? {
            merge_values(&mut merged, layer);
        }
    }

    let mut config: CtxGraphConfig = serde_yaml::from_value(merged)
        .map_err(|e| CtxGraphError::Config(format!("invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Apply `CTXGRAPH_*` variables. Unparseable values are logged and ignored.
pub fn apply_env_overrides(config: &mut CtxGraphConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(val) = env("CTXGRAPH_ALPHA") {
        match val.trim().parse::<f64>() {
            Ok(alpha) => config.search.alpha = alpha,
            Err(_) => warn!(value = %val, "ignoring CTXGRAPH_ALPHA"),
        }
    }
    if let Some(val) = env("CTXGRAPH_LIMIT") {
        match val.trim().parse::<usize>() {
            Ok(limit) => config.search.limit = limit,
            Err(_) => warn!(value = %val, "ignoring CTXGRAPH_LIMIT"),
        }
    }
    if let Some(val) = env("CTXGRAPH_DEPTH") {
        match val.trim().parse::<usize>() {
            Ok(depth) => config.search.depth = depth,
            Err(_) => warn!(value = %val, "ignoring CTXGRAPH_DEPTH"),
        }
    }
    if let Some(val) = env("CTXGRAPH_EXTRACTOR") {
        match ExtractorStrategy::from_str_loose(&val) {
            Some(strategy) => config.index.extractor = strategy,
            None => warn!(value = %val, "ignoring CTXGRAPH_EXTRACTOR"),
        }
    }
    if let Some(val) = env("CTXGRAPH_STORAGE_DIR") {
        if !val.trim().is_empty() {
            config.storage.dir = val.trim().to_string();
        }
    }
    if let Some(val) = env("CTXGRAPH_EMBEDDING") {
        config.embedding.enabled = matches!(val.trim(), "1" | "true" | "yes" | "on");
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Platform-specific user config path via the `directories` crate.
fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ctxgraph", "ctxgraph")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), "loading config layer");
    let value: Value = serde_yaml::from_str(&contents)
        .map_err(|e| CtxGraphError::Config(format!("{}: {e}", path.display())))?;
    match value {
        Value::Null => Ok(None),
        Value::Mapping(_) => Ok(Some(value)),
        _ => Err(CtxGraphError::Config(format!(
            "{}: top level must be a mapping",
            path.display()
        ))),
    }
}

/// Deep-merge `overlay` into `base`; overlay scalars and sequences win.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
