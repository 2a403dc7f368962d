use super::{Availability, InferenceCapability, TextChunks};
use crate::error::InferenceError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shopwise_core::Vector;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Serialize)]
struct EmbedTextRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for an external model server.
///
/// The server exposes `GET /health`, `POST /embed/text`, `POST /embed/image`
/// and `POST /describe?prompt=..`; the latter streams its answer as a chunked
/// UTF-8 body.
pub struct RemoteInference {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
    availability: Availability,
}

impl RemoteInference {
    /// Probe the server once and remember whether it answered.
    pub async fn connect(base_url: &str, dimension: usize, timeout: Duration) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build inference HTTP client");
                return Self {
                    client: reqwest::Client::new(),
                    base_url,
                    dimension,
                    availability: Availability::Unavailable(e.to_string()),
                };
            }
        };

        let availability = match client.get(format!("{base_url}/health")).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(url = %base_url, "Inference server is ready");
                Availability::Ready
            }
            Ok(resp) => {
                warn!(url = %base_url, status = %resp.status(), "Inference server is not healthy");
                Availability::Unavailable(format!("health check returned {}", resp.status()))
            }
            Err(e) => {
                warn!(url = %base_url, error = %e, "Inference server unreachable");
                Availability::Unavailable(e.to_string())
            }
        };

        Self {
            client,
            base_url,
            dimension,
            availability,
        }
    }

    fn ensure_ready(&self) -> Result<(), InferenceError> {
        match &self.availability {
            Availability::Ready => Ok(()),
            Availability::Unavailable(reason) => Err(InferenceError::Unavailable(reason.clone())),
        }
    }

    fn checked(&self, embedding: Vec<f32>) -> Result<Vector, InferenceError> {
        if embedding.len() != self.dimension {
            return Err(InferenceError::InvalidResponse(format!(
                "expected a {}-dimensional embedding, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(Vector::new(embedding))
    }

    async fn post_embedding(&self, request: reqwest::RequestBuilder) -> Result<Vector, InferenceError> {
        let response = request.send().await?.error_for_status()?;
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        self.checked(body.embedding)
    }
}

#[async_trait]
impl InferenceCapability for RemoteInference {
    fn name(&self) -> &str {
        "remote"
    }

    fn availability(&self) -> Availability {
        self.availability.clone()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vector, InferenceError> {
        self.ensure_ready()?;
        let request = self
            .client
            .post(format!("{}/embed/text", self.base_url))
            .json(&EmbedTextRequest { text });
        self.post_embedding(request).await
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vector, InferenceError> {
        self.ensure_ready()?;
        let request = self
            .client
            .post(format!("{}/embed/image", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        self.post_embedding(request).await
    }

    async fn describe(&self, image: &[u8], prompt: &str) -> Result<TextChunks, InferenceError> {
        self.ensure_ready()?;
        let response = self
            .client
            .post(format!("{}/describe", self.base_url))
            .query(&[("prompt", prompt)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?
            .error_for_status()?;

        Ok(decode_text_chunks(response.bytes_stream()))
    }
}

/// Split the valid UTF-8 prefix off `pending`, keeping an incomplete trailing
/// sequence for the next chunk.
fn take_text(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    String::from_utf8(std::mem::replace(pending, rest)).unwrap_or_default()
}

/// Turn a body byte stream into text chunks as the bytes arrive.
fn decode_text_chunks<S, E>(body: S) -> TextChunks
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<InferenceError> + Send + 'static,
{
    stream::unfold((body.boxed(), Vec::<u8>::new(), false), |(mut body, mut pending, done)| async move {
        if done {
            return None;
        }
        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    pending.extend_from_slice(&chunk);
                    let text = take_text(&mut pending);
                    if !text.is_empty() {
                        return Some((Ok(text), (body, pending, false)));
                    }
                }
                Some(Err(e)) => return Some((Err(e.into()), (body, pending, true))),
                None if pending.is_empty() => return None,
                None => {
                    let text = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    return Some((Ok(text), (body, pending, true)));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 9 (discard) is closed on test hosts; the probe fails fast.
        let remote = RemoteInference::connect("http://127.0.0.1:9/", 8, Duration::from_millis(200)).await;
        assert!(!remote.availability().is_ready());
        assert!(matches!(
            remote.embed_text("kettle").await,
            Err(InferenceError::Unavailable(_))
        ));
        assert!(remote.describe(b"img", "what").await.is_err());
    }

    #[test]
    fn test_dimension_is_checked() {
        let remote = RemoteInference {
            client: reqwest::Client::new(),
            base_url: "http://localhost".to_string(),
            dimension: 3,
            availability: Availability::Ready,
        };
        assert!(remote.checked(vec![1.0, 2.0, 3.0]).is_ok());
        assert!(matches!(
            remote.checked(vec![1.0]),
            Err(InferenceError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_body_chunks_decode_incrementally() {
        // "café\n" with the two-byte é split across network chunks
        let parts: Vec<Result<Bytes, InferenceError>> = vec![
            Ok(Bytes::from_static(b"caf\xc3")),
            Ok(Bytes::from_static(b"\xa9\n")),
            Ok(Bytes::from_static(b"steel kettle")),
        ];
        let chunks: Vec<String> = decode_text_chunks(stream::iter(parts))
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["caf", "\u{e9}\n", "steel kettle"]);
    }

    #[tokio::test]
    async fn test_body_error_ends_the_stream() {
        let parts: Vec<Result<Bytes, InferenceError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(InferenceError::InvalidResponse("reset".to_string())),
            Ok(Bytes::from_static(b"ignored")),
        ];
        let mut chunks = decode_text_chunks(stream::iter(parts));
        assert_eq!(chunks.next().await.unwrap().unwrap(), "partial");
        assert!(chunks.next().await.unwrap().is_err());
        assert!(chunks.next().await.is_none());
    }
}
