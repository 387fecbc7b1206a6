//! Indexer: read source files, extract items, and feed the store.

pub mod embedder;
pub mod extractor;
pub mod grammar;
pub mod imports;
pub mod parser;
pub mod pattern;
pub mod pipeline;

pub use embedder::{EmbeddingModelChoice, EmbeddingProvider, FastEmbedProvider};
pub use extractor::{extractor_for, ExtractOptions, Extractor, ExtractorSet, ExtractorStrategy};
pub use grammar::TreeSitterExtractor;
pub use parser::CodeParser;
pub use pattern::PatternExtractor;
pub use pipeline::{IndexOptions, IndexResult, IndexingPipeline};
