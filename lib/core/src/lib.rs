//! # shopwise Core
//!
//! Core data structures for the shopwise recommendation server.
//!
//! - [`Vector`] - Dense embedding with SIMD distance helpers
//! - [`CorpusEntry`] - Product metadata paired with one vector
//! - [`SimilarityIndex`] - Exact nearest-neighbour search over the corpus
//! - [`SearchResult`] - A ranked hit
//!
//! ## Example
//!
//! ```rust
//! use shopwise_core::{CorpusEntry, SimilarityIndex, Vector};
//!
//! let vectors = vec![Vector::new(vec![0.0, 0.0]), Vector::new(vec![1.0, 0.0])];
//! let entries = vec![
//!     CorpusEntry::new("a", "Kettle", "", ""),
//!     CorpusEntry::new("b", "Toaster", "", ""),
//! ];
//! let index = SimilarityIndex::build(vectors, entries).unwrap();
//!
//! let hits = index.search(&[0.9, 0.0], 1).unwrap();
//! assert_eq!(hits[0].entry.id, "b");
//! ```

pub mod entry;
pub mod error;
pub mod index;
pub mod vector;

/// SIMD-accelerated distance kernels
///
/// - AVX2/FMA on x86_64
/// - NEON on ARM64/Apple Silicon
pub mod simd;

pub use entry::{CorpusEntry, SearchResult};
pub use error::{Error, Result};
pub use index::SimilarityIndex;
pub use vector::Vector;
