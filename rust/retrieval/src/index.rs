//! Flat L2 nearest-neighbor index.

use serde::{Deserialize, Serialize};

/// A search hit: the stored ordinal of the vector and its squared L2
/// distance from the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub ordinal: usize,
    pub distance: f32,
}

/// An exhaustive-scan L2 index over dense vectors.
///
/// Mirrors a flat FAISS index: vectors are stored in insertion order and
/// queries compare against every entry. Corpora here are thousands of
/// chunks, not millions, so the linear scan is the simplest correct choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// The vector dimension this index was created with.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append vectors in order. Entries whose dimension does not match are
    /// truncated or zero-padded rather than rejected, so a partially
    /// malformed batch cannot poison the whole index.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) {
        for mut vector in vectors {
            vector.resize(self.dimension, 0.0);
            self.vectors.push(vector);
        }
    }

    /// Return the `top_k` nearest vectors by ascending squared L2 distance.
    ///
    /// Ties are broken by stored order, so identical corpora always return
    /// identical rankings.
    #[must_use]
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| Hit {
                ordinal,
                distance: squared_l2(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(top_k);
        hits
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter().chain(std::iter::repeat(&0.0)))
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}
