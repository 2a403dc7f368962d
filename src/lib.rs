//! # shopwise
//!
//! A shopping recommendation server. A request (query text, optional product
//! photo, price and budget) runs through a fixed sequence of analysis stages
//! and every step is streamed back to the client as a server-sent event.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! shopwise ingest --corpus products.json
//! shopwise serve --http-port 8000
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use shopwise::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let index = IndexStore::new("data/products.vec", "data/products.json").load()?;
//! let inference = Arc::new(HashingInference::new(index.dim()));
//! let orchestrator = Arc::new(PipelineOrchestrator::new(
//!     Some(Arc::new(index)),
//!     inference,
//!     PipelineConfig::default(),
//! ));
//!
//! let mut events = orchestrator.spawn(PipelineRequest::text("espresso machine", 240.0, 200.0));
//! while let Some(frame) = events.recv().await {
//!     print!("{}", String::from_utf8_lossy(&frame));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - `shopwise-core` - vectors, SIMD kernels, corpus entries and the exact similarity index
//! - `shopwise-storage` - the on-disk vector + metadata file pair
//! - `shopwise-pipeline` - stage context, stages, inference capability, orchestrator and SSE events
//! - `shopwise-api` - actix-web endpoints

pub mod ingest;

// Re-export core types
pub use shopwise_core::{CorpusEntry, Error, Result, SearchResult, SimilarityIndex, Vector};

// Re-export storage
pub use shopwise_storage::IndexStore;

// Re-export pipeline
pub use shopwise_pipeline::{
    Availability, EventEmitter, EventStream, HashingInference, InferenceCapability, InferenceError,
    PipelineConfig, PipelineOrchestrator, PipelineOutcome, PipelineRequest, PipelineState, RemoteInference,
    StageContext, StageError, StageName,
};

// Re-export API
pub use shopwise_api::{AppState, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AppState, Availability, CorpusEntry, Error, EventStream, HashingInference, IndexStore, InferenceCapability,
        PipelineConfig, PipelineOrchestrator, PipelineRequest, RestApi, Result, SearchResult, SimilarityIndex,
        StageContext, StageName, Vector,
    };
}

/// SIMD-optimized vector operations
pub mod simd {
    pub use shopwise_core::simd::{dot_product_simd, l2_squared_simd, norm_simd};
}
