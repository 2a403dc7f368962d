use crate::context::StageName;
use std::time::Duration;
use thiserror::Error;

/// Failure of the external inference capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference unavailable: {0}")]
    Unavailable(String),

    #[error("Inference request failed: {0}")]
    Request(String),

    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            InferenceError::Unavailable(e.to_string())
        } else {
            InferenceError::Request(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage is missing prerequisite `{field}`")]
    MissingPrerequisite { stage: StageName, field: &'static str },

    #[error(transparent)]
    InferenceUnavailable(#[from] InferenceError),

    #[error("{stage} stage timed out after {after:?}")]
    StageTimeout { stage: StageName, after: Duration },

    #[error("Index error: {0}")]
    Index(#[from] shopwise_core::Error),

    #[error("Event stream closed by consumer")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, StageError>;
