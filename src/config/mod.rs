//! Configuration: YAML schema plus layered loading.

pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_layers, PROJECT_CONFIG_FILE};
pub use schema::{CtxGraphConfig, EmbeddingConfig, IndexConfig, SearchConfig, StorageConfig};
