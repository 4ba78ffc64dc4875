//! Corpus store: build, persist, load, and query named manual corpora.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, chunk_words};
use crate::embed::{Embedder, HashEmbedder};
use crate::error::{RetrievalError, RetrievalResult};
use crate::extract::{DefaultExtractor, TextExtractor};
use crate::index::FlatIndex;

/// Minimum extracted characters for a corpus to be worth indexing.
const MIN_CONTENT_CHARS: usize = 100;

/// Placeholder context returned when a query matches nothing.
const NO_CONTEXT: &str = "No relevant information found in manuals.";

/// Identifies one logical corpus of ingested manuals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorpusId {
    /// The shared technical manuals (device rules, ST syntax, examples).
    Primary,
    /// The shared default safety manuals.
    DefaultSafety,
    /// A safety manual uploaded for one project.
    ProjectSafety(String),
}

impl CorpusId {
    /// The directory slug this corpus persists under.
    #[must_use]
    pub fn slug(&self) -> String {
        match self {
            Self::Primary => "primary_manuals".to_string(),
            Self::DefaultSafety => "default_safety_manuals".to_string(),
            Self::ProjectSafety(project_id) => format!("safety_manual_{project_id}"),
        }
    }
}

impl fmt::Display for CorpusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Summary of a completed corpus build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub chunk_count: usize,
    pub word_count: usize,
    pub sources: Vec<String>,
}

/// One retrieved chunk, ranked by ascending L2 distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// 1-based rank within the result set.
    pub rank: usize,
    pub text: String,
    /// Source document name, when recorded at build time.
    pub source: Option<String>,
    /// Squared L2 distance; smaller is closer.
    pub score: f32,
}

/// Sidecar written next to the vectors, mirroring the build report.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CorpusMetadata {
    corpus: String,
    sources: Vec<String>,
    /// Index into `sources` for each chunk.
    chunk_sources: Vec<usize>,
    chunk_count: usize,
    word_count: usize,
}

/// Vectors plus the embedder identity they were produced with.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedIndex {
    embedder: String,
    dimension: usize,
    index: FlatIndex,
}

/// An in-memory corpus ready to serve queries.
#[derive(Debug)]
struct LoadedCorpus {
    index: FlatIndex,
    chunks: Vec<String>,
    sources: Vec<String>,
    chunk_sources: Vec<usize>,
}

/// Builds and queries manual corpora.
///
/// Reads are served lock-free from an in-memory cache once a corpus is
/// loaded. Builds and cold loads are serialized per corpus behind an async
/// mutex, so a rebuild blocks queries on that corpus (and only that one)
/// until the new index is swapped in.
pub struct CorpusStore {
    root: PathBuf,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    cache: RwLock<HashMap<String, Arc<LoadedCorpus>>>,
    corpus_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for CorpusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusStore")
            .field("root", &self.root)
            .field("embedder", &self.embedder.name())
            .finish_non_exhaustive()
    }
}

impl CorpusStore {
    /// Create a store rooted at `root` with the default extractor and the
    /// deterministic hash embedder.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_components(
            root,
            Arc::new(DefaultExtractor),
            Arc::new(HashEmbedder::default()),
        )
    }

    /// Create a store with injected extractor and embedder implementations.
    #[must_use]
    pub fn with_components(
        root: impl Into<PathBuf>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            root: root.into(),
            extractor,
            embedder,
            cache: RwLock::new(HashMap::new()),
            corpus_locks: Mutex::new(HashMap::new()),
        }
    }

    fn corpus_dir(&self, corpus: &CorpusId) -> PathBuf {
        self.root.join(corpus.slug())
    }

    async fn corpus_lock(&self, slug: &str) -> Arc<Mutex<()>> {
        let mut locks = self.corpus_locks.lock().await;
        locks.entry(slug.to_string()).or_default().clone()
    }

    /// Whether the corpus is resident in memory.
    #[must_use]
    pub fn is_loaded(&self, corpus: &CorpusId) -> bool {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&corpus.slug())
    }

    /// Extract, chunk, embed, and persist `documents` as `corpus`,
    /// replacing any previous build.
    pub async fn build(
        &self,
        corpus: &CorpusId,
        documents: &[PathBuf],
    ) -> RetrievalResult<BuildReport> {
        let slug = corpus.slug();
        let lock = self.corpus_lock(&slug).await;
        let _guard = lock.lock().await;

        let mut sources: Vec<String> = Vec::new();
        let mut chunks: Vec<String> = Vec::new();
        let mut chunk_sources: Vec<usize> = Vec::new();
        let mut total_chars = 0;
        let mut word_count = 0;

        for path in documents {
            let text = self.extractor.extract(path).await?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unnamed>")
                .to_string();
            total_chars += text.len();
            word_count += text.split_whitespace().count();

            let source_ordinal = sources.len();
            sources.push(name);
            for chunk in chunk_words(&text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP) {
                chunks.push(chunk);
                chunk_sources.push(source_ordinal);
            }
        }

        if total_chars < MIN_CONTENT_CHARS || chunks.is_empty() {
            return Err(RetrievalError::EmptyContent);
        }

        let vectors = self.embedder.embed_batch(&chunks);
        let mut index = FlatIndex::new(self.embedder.dimension());
        index.add(vectors);

        let dir = self.corpus_dir(corpus);
        std::fs::create_dir_all(&dir)?;
        write_json(
            &dir.join("index.json"),
            &PersistedIndex {
                embedder: self.embedder.name().to_string(),
                dimension: self.embedder.dimension(),
                index: index.clone(),
            },
        )?;
        write_json(&dir.join("chunks.json"), &chunks)?;
        write_json(
            &dir.join("metadata.json"),
            &CorpusMetadata {
                corpus: slug.clone(),
                sources: sources.clone(),
                chunk_sources: chunk_sources.clone(),
                chunk_count: chunks.len(),
                word_count,
            },
        )?;

        info!(corpus = %slug, chunks = chunks.len(), words = word_count, "corpus built");

        let report = BuildReport {
            chunk_count: chunks.len(),
            word_count,
            sources: sources.clone(),
        };

        let loaded = Arc::new(LoadedCorpus {
            index,
            chunks,
            sources,
            chunk_sources,
        });
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(slug, loaded);

        Ok(report)
    }

    /// Load the corpus from disk if it is not already resident.
    ///
    /// Idempotent: repeat calls on a loaded corpus return immediately.
    pub async fn ensure_loaded(&self, corpus: &CorpusId) -> RetrievalResult<()> {
        self.loaded(corpus).await.map(|_| ())
    }

    async fn loaded(&self, corpus: &CorpusId) -> RetrievalResult<Arc<LoadedCorpus>> {
        let slug = corpus.slug();

        if let Some(loaded) = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&slug)
        {
            return Ok(loaded.clone());
        }

        let lock = self.corpus_lock(&slug).await;
        let _guard = lock.lock().await;

        // A concurrent load may have completed while we waited.
        if let Some(loaded) = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&slug)
        {
            return Ok(loaded.clone());
        }

        let dir = self.corpus_dir(corpus);
        if !dir.join("index.json").exists() {
            return Err(RetrievalError::NotReady {
                corpus: slug.clone(),
            });
        }

        let persisted: PersistedIndex = read_json(&dir.join("index.json"))?;
        if persisted.embedder != self.embedder.name()
            || persisted.dimension != self.embedder.dimension()
        {
            return Err(RetrievalError::EmbedderMismatch {
                expected: self.embedder.name().to_string(),
                found: persisted.embedder,
            });
        }
        let chunks: Vec<String> = read_json(&dir.join("chunks.json"))?;
        let metadata: CorpusMetadata = read_json(&dir.join("metadata.json"))?;

        debug!(corpus = %slug, chunks = chunks.len(), "corpus loaded");

        let loaded = Arc::new(LoadedCorpus {
            index: persisted.index,
            chunks,
            sources: metadata.sources,
            chunk_sources: metadata.chunk_sources,
        });
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(slug, loaded.clone());
        Ok(loaded)
    }

    /// Return the `top_k` chunks nearest to `query`, ascending by distance.
    pub async fn retrieve(
        &self,
        corpus: &CorpusId,
        query: &str,
        top_k: usize,
    ) -> RetrievalResult<Vec<RetrievedChunk>> {
        let loaded = self.loaded(corpus).await?;
        let query_vector = self.embedder.embed(query);
        let hits = loaded.index.search(&query_vector, top_k);

        Ok(hits
            .iter()
            .enumerate()
            .filter_map(|(i, hit)| {
                loaded.chunks.get(hit.ordinal).map(|text| RetrievedChunk {
                    rank: i + 1,
                    text: text.clone(),
                    source: loaded
                        .chunk_sources
                        .get(hit.ordinal)
                        .and_then(|&s| loaded.sources.get(s))
                        .cloned(),
                    score: hit.distance,
                })
            })
            .collect())
    }

    /// Retrieve and format up to `max_chunks` of context as a single string.
    pub async fn retrieve_context(
        &self,
        corpus: &CorpusId,
        query: &str,
        max_chunks: usize,
    ) -> RetrievalResult<String> {
        let results = self.retrieve(corpus, query, max_chunks).await?;
        Ok(Self::format_context(&results))
    }

    /// Join retrieved chunks into a context block for an LLM prompt.
    ///
    /// Chunks are separated by `---` rules; a `[Source: …]` header is
    /// included when the chunk's source document is known.
    #[must_use]
    pub fn format_context(results: &[RetrievedChunk]) -> String {
        if results.is_empty() {
            return NO_CONTEXT.to_string();
        }

        results
            .iter()
            .map(|result| match &result.source {
                Some(source) => format!("[Source: {source}]\n{}", result.text),
                None => result.text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RetrievalResult<()> {
    let json = serde_json::to_string(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> RetrievalResult<T> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
