//! # shopwise-pipeline
//!
//! The staged recommendation pipeline: a per-request [`StageContext`], the
//! analysis stages that fill it in, the [`InferenceCapability`] they call out
//! to, and the [`PipelineOrchestrator`] that runs them in order while
//! streaming progress as server-sent events.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod inference;
pub mod orchestrator;
pub mod stages;

pub use config::PipelineConfig;
pub use context::{
    AgentOutput, AgentOutputs, BudgetVerdict, IdentificationSource, IdentifiedProduct, PipelineRequest,
    PriceBracket, StageContext, StageData, StageName,
};
pub use error::{InferenceError, Result, StageError};
pub use events::{encode_event, parse_events, EventEmitter, EventStream, EventType, ParsedEvent, StageStatus};
pub use inference::{collect_text, Availability, HashingInference, InferenceCapability, RemoteInference, TextChunks};
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome, PipelineState};
pub use stages::{assess_value, check_budget, summarize, synthesize, Stage};
