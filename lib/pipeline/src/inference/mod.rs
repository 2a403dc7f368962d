//! Inference capability consumed by the identification and retrieval stages.
//!
//! The capability turns text or images into vectors in the same space as the
//! corpus index and describes images in free text. Implementations decide
//! their [`Availability`] once, at construction, and stages consult it rather
//! than probing the backend themselves.

mod hashing;
mod remote;

pub use hashing::HashingInference;
pub use remote::RemoteInference;

use crate::error::InferenceError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use shopwise_core::Vector;

/// Readiness of an inference backend, decided at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Availability {
    Ready,
    Unavailable(String),
}

impl Availability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Availability::Ready)
    }
}

/// Text produced incrementally by a describe call
pub type TextChunks = BoxStream<'static, Result<String, InferenceError>>;

#[async_trait]
pub trait InferenceCapability: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &str;

    fn availability(&self) -> Availability;

    /// Dimension of the vectors this backend produces
    fn dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> Result<Vector, InferenceError>;

    async fn embed_image(&self, image: &[u8]) -> Result<Vector, InferenceError>;

    /// Describe an image in response to `prompt`, as a bounded chunk sequence
    async fn describe(&self, image: &[u8], prompt: &str) -> Result<TextChunks, InferenceError>;
}

/// Concatenate a describe stream, failing on the first chunk error or when
/// the backend sends more than `max_chunks` chunks.
pub async fn collect_text(mut chunks: TextChunks, max_chunks: usize) -> Result<String, InferenceError> {
    let mut text = String::new();
    let mut received = 0usize;
    while let Some(chunk) = chunks.next().await {
        received += 1;
        if received > max_chunks {
            return Err(InferenceError::InvalidResponse(format!(
                "description exceeded {max_chunks} chunks"
            )));
        }
        text.push_str(&chunk?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_collect_text_concatenates() {
        let chunks: TextChunks = stream::iter(vec![Ok("Steel ".to_string()), Ok("kettle".to_string())]).boxed();
        assert_eq!(collect_text(chunks, 8).await.unwrap(), "Steel kettle");
    }

    #[tokio::test]
    async fn test_collect_text_stops_on_error() {
        let chunks: TextChunks = stream::iter(vec![
            Ok("partial".to_string()),
            Err(InferenceError::Request("reset".to_string())),
        ])
        .boxed();
        assert!(collect_text(chunks, 8).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_text_is_bounded() {
        let chunks: TextChunks = stream::iter((0..10).map(|i| Ok(i.to_string()))).boxed();
        assert!(matches!(
            collect_text(chunks, 3).await,
            Err(InferenceError::InvalidResponse(_))
        ));
    }
}
