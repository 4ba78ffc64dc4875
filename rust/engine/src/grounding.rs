//! Shared helpers for pulling manual context into prompts.

use std::sync::Arc;

use stagewright_retrieval::{CorpusId, CorpusStore, RetrievalError};
use tracing::warn;

use crate::error::EngineResult;

/// Fetch formatted context for one query.
///
/// A corpus that has never been built degrades to the store's placeholder
/// sentence instead of failing the pipeline operation; every other
/// retrieval failure propagates.
pub(crate) async fn context_for(
    corpus: &Arc<CorpusStore>,
    corpus_id: &CorpusId,
    query: &str,
    max_chunks: usize,
) -> EngineResult<String> {
    match corpus.retrieve_context(corpus_id, query, max_chunks).await {
        Ok(context) => Ok(context),
        Err(RetrievalError::NotReady { corpus }) => {
            warn!(%corpus, "manual corpus not built; continuing without context");
            Ok(CorpusStore::format_context(&[]))
        }
        Err(err) => Err(err.into()),
    }
}

/// Fetch and join context for several queries, skipping empty results.
pub(crate) async fn contexts_for(
    corpus: &Arc<CorpusStore>,
    corpus_id: &CorpusId,
    queries: &[&str],
    chunks_per_query: usize,
) -> EngineResult<String> {
    let mut parts = Vec::new();
    for query in queries {
        let context = context_for(corpus, corpus_id, query, chunks_per_query).await?;
        if !context.is_empty() {
            parts.push(context);
        }
    }
    Ok(parts.join("\n\n"))
}
