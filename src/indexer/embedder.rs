//! Optional embedding capability.
//!
//! The core never constructs an embedding model on its own. Callers that
//! want vector search build a provider explicitly and pass it in as
//! `Option<&dyn EmbeddingProvider>`; when it is `None` or fails, hybrid
//! search falls back to keyword-only ranking.
//!
//! The fastembed-backed provider (ONNX Runtime on-device, all-MiniLM-L6-v2
//! unless configured otherwise) is feature-gated behind `embedding`.

#[cfg(feature = "embedding")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use tracing::{debug, warn};

use crate::error::{CtxGraphError, Result};
use crate::graph::store::ContextStore;
use crate::types::Item;

/// Texts are embedded in chunks of this size.
const EMBED_BATCH_SIZE: usize = 64;

/// Characters of item content fed into the embedding text.
const MAX_EMBED_CHARS: usize = 1_000;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Anything that can turn text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.generate_embedding(t)).collect()
    }

    fn dimension(&self) -> usize;
}

/// Text used to embed an item: `"{type} {name}: {content}"`.
pub fn item_embedding_text(item: &Item) -> String {
    let content: String = item.content.chars().take(MAX_EMBED_CHARS).collect();
    format!(
        "{} {}: {}",
        item.item_type().unwrap_or("item"),
        item.name().unwrap_or(&item.id),
        content
    )
}

/// Embed every stored item that has no vector yet. Returns how many were
/// written. A failing batch is logged and skipped.
pub fn embed_missing(store: &ContextStore, provider: &dyn EmbeddingProvider) -> Result<usize> {
    let pending = store.items_without_embedding()?;
    let mut written = 0;

    for chunk in pending.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(item_embedding_text).collect();
        let vectors = match provider.generate_embeddings(&texts) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, batch = chunk.len(), "embedding batch failed");
                continue;
            }
        };
        for (item, vector) in chunk.iter().zip(vectors) {
            store.set_embedding(&item.id, &vector)?;
            written += 1;
        }
    }

    debug!(written, "embeddings stored");
    Ok(written)
}

/// Embed a query, turning failure into `None`.
pub fn embed_query(provider: Option<&dyn EmbeddingProvider>, text: &str) -> Option<Vec<f32>> {
    let provider = provider?;
    match provider.generate_embedding(text) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "query embedding failed, using keyword search only");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// fastembed
// ---------------------------------------------------------------------------

/// Sentence-embedding models the fastembed provider can load, selected by
/// the `embedding.model` config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingModelChoice {
    AllMiniLmL6V2,
    AllMiniLmL12V2,
    BgeSmallEnV15,
    BgeBaseEnV15,
}

impl EmbeddingModelChoice {
    pub const ALL: [Self; 4] = [
        Self::AllMiniLmL6V2,
        Self::AllMiniLmL12V2,
        Self::BgeSmallEnV15,
        Self::BgeBaseEnV15,
    ];

    /// Case-insensitive; an organisation prefix such as
    /// `sentence-transformers/` or `BAAI/` is accepted and ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let bare = name.rsplit('/').next().unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|choice| choice.name().eq_ignore_ascii_case(bare))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "bge-base-en-v1.5",
        }
    }

    pub fn dimension(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::AllMiniLmL12V2 | Self::BgeSmallEnV15 => 384,
            Self::BgeBaseEnV15 => 768,
        }
    }

    #[cfg(feature = "embedding")]
    fn fastembed_model(self) -> EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Self::AllMiniLmL12V2 => EmbeddingModel::AllMiniLML12V2,
            Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
            Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
        }
    }
}

/// On-device sentence embeddings through fastembed.
pub struct FastEmbedProvider {
    #[cfg(feature = "embedding")]
    model: TextEmbedding,
    dim: usize,
}

impl FastEmbedProvider {
    /// Load the model named `model` (downloaded and cached on first use).
    ///
    /// # Errors
    /// `Config` for a model name not in [`EmbeddingModelChoice`]; `Embedding`
    /// when the model cannot be loaded, or when the crate was built without
    /// the `embedding` feature.
    pub fn try_new(model: &str) -> Result<Self> {
        let choice = EmbeddingModelChoice::from_name(model).ok_or_else(|| {
            CtxGraphError::Config(format!("unknown embedding model {model:?}"))
        })?;

        #[cfg(feature = "embedding")]
        {
            let model = TextEmbedding::try_new(
                InitOptions::new(choice.fastembed_model()).with_show_download_progress(false),
            )
            .map_err(|e| CtxGraphError::Embedding(e.to_string()))?;
            debug!(model = choice.name(), "embedding model loaded");
            Ok(Self {
                model,
                dim: choice.dimension(),
            })
        }

        #[cfg(not(feature = "embedding"))]
        {
            Err(CtxGraphError::Embedding(format!(
                "cannot load {}: embedding support not compiled; rebuild with `--features embedding`",
                choice.name()
            )))
        }
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embeddings(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| CtxGraphError::Embedding("no embedding returned".into()))
    }

    #[cfg(feature = "embedding")]
    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| CtxGraphError::Embedding(e.to_string()))
    }

    #[cfg(not(feature = "embedding"))]
    fn generate_embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(CtxGraphError::Embedding("embedding support not compiled".into()))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
