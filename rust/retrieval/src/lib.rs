//! Manual-grounded retrieval for the Stagewright engine.
//!
//! Ingests technical and safety manuals into named corpora (text extraction,
//! overlapping word chunking, dense embeddings, flat L2 index) and serves
//! nearest-neighbor lookups that ground every LLM call the engine makes.

#![warn(clippy::pedantic)]
#![allow(clippy::result_large_err)]
#![allow(clippy::missing_errors_doc)]

pub mod chunk;
pub mod embed;
pub mod error;
pub mod extract;
pub mod index;
pub mod store;

pub use embed::{Embedder, HashEmbedder};
pub use error::{RetrievalError, RetrievalResult};
pub use extract::{DefaultExtractor, TextExtractor};
pub use index::FlatIndex;
pub use store::{BuildReport, CorpusId, CorpusStore, RetrievedChunk};
