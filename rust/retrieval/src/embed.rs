//! Dense text embeddings behind a substitutable seam.
//!
//! The engine only depends on the [`Embedder`] trait; the default
//! [`HashEmbedder`] is a deterministic feature-hash encoder that needs no
//! model weights. A sentence-transformer backend (e.g. an ONNX runtime
//! wrapper producing the same 384-dimension vectors) plugs in behind the
//! same trait without touching the corpus store.

/// Vector dimension matching the reference sentence embedder.
pub const DEFAULT_DIMENSION: usize = 384;

/// Encodes text into fixed-dimension dense vectors.
pub trait Embedder: Send + Sync {
    /// A stable identifier recorded in persisted indexes. Loading an index
    /// built with a different embedder is refused.
    fn name(&self) -> &str;

    /// The dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Encode one text into a vector of [`dimension()`](Self::dimension) floats.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Encode a batch of texts. The default implementation maps
    /// [`embed()`](Self::embed) over the slice.
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Deterministic feature-hash embedder.
///
/// Tokenizes to lowercased alphanumeric runs, hashes each token with
/// seahash into a signed bucket, and L2-normalizes the accumulated vector.
/// Identical input always produces an identical vector, which keeps
/// retrieval ordering (and the tests that depend on it) stable.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl HashEmbedder {
    /// Create an embedder with a custom dimension (tests use small ones).
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash-v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in Self::tokens(text) {
            let hash = seahash::hash(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}
