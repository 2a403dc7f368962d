use crate::{CorpusEntry, Error, Result, SearchResult, Vector};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::BinaryHeap;

/// Above this many rows the distance pass is spread over the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Exact nearest-neighbour index over a fixed product corpus.
///
/// Vectors live in one contiguous row-major buffer; row `i` belongs to
/// `entries[i]`. The index is immutable after construction, so a single
/// instance can be shared behind an `Arc` by any number of concurrent readers.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    dim: usize,
    vectors: Vec<f32>,
    entries: Vec<CorpusEntry>,
}

impl SimilarityIndex {
    /// Build an index, taking the dimension from the first vector.
    pub fn build(vectors: Vec<Vector>, metadata: Vec<CorpusEntry>) -> Result<Self> {
        let dim = vectors.first().map(Vector::dim).unwrap_or(0);
        Self::build_with_dim(dim, vectors, metadata)
    }

    /// Build an index whose vectors must all have exactly `dim` components.
    pub fn build_with_dim(
        dim: usize,
        vectors: Vec<Vector>,
        metadata: Vec<CorpusEntry>,
    ) -> Result<Self> {
        if let Some(bad) = vectors.iter().find(|v| v.dim() != dim) {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }
        if vectors.len() != metadata.len() {
            return Err(Error::CountMismatch {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        let mut flat = Vec::with_capacity(dim * vectors.len());
        for v in vectors {
            flat.extend_from_slice(v.as_slice());
        }

        Self::from_raw_parts(dim, flat, metadata)
    }

    /// Assemble an index from an already-flattened row-major buffer.
    pub fn from_raw_parts(dim: usize, vectors: Vec<f32>, entries: Vec<CorpusEntry>) -> Result<Self> {
        if dim == 0 {
            if !vectors.is_empty() || !entries.is_empty() {
                return Err(Error::InvalidConfig(
                    "zero-dimensional index cannot hold records".to_string(),
                ));
            }
            return Ok(Self { dim, vectors, entries });
        }
        if vectors.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: vectors.len() % dim,
            });
        }
        let rows = vectors.len() / dim;
        if rows != entries.len() {
            return Err(Error::CountMismatch {
                vectors: rows,
                metadata: entries.len(),
            });
        }
        Ok(Self { dim, vectors, entries })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&CorpusEntry> {
        self.entries.get(index)
    }

    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.dim;
        Some(&self.vectors[start..start + self.dim])
    }

    /// The raw row-major vector buffer
    pub fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Return the `min(k, N)` entries closest to `query`.
    ///
    /// Results are ordered by descending relevance (`1 - squared L2 distance`),
    /// ties broken by ascending insertion slot. An empty index yields an empty
    /// list regardless of the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let distances: Vec<f32> = if self.len() >= PARALLEL_SCAN_THRESHOLD {
            self.vectors
                .par_chunks_exact(self.dim)
                .map(|row| crate::simd::l2_squared_simd(row, query))
                .collect()
        } else {
            self.vectors
                .chunks_exact(self.dim)
                .map(|row| crate::simd::l2_squared_simd(row, query))
                .collect()
        };

        // Max-heap on (distance, slot): the root is always the worst kept hit.
        let k = k.min(self.len());
        let mut heap: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(k + 1);
        for (idx, dist) in distances.into_iter().enumerate() {
            let key = (OrderedFloat(dist), idx);
            if heap.len() < k {
                heap.push(key);
            } else if let Some(worst) = heap.peek() {
                if key < *worst {
                    heap.pop();
                    heap.push(key);
                }
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|(dist, idx)| SearchResult {
                entry: self.entries[idx].clone(),
                relevance_score: 1.0 - dist.into_inner(),
                index: idx,
            })
            .collect())
    }

    /// Convenience wrapper over [`SimilarityIndex::search`] for owned vectors
    pub fn search_vector(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        self.search(query.as_slice(), k)
    }
}
