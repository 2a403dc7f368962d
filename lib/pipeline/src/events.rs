//! Server-sent event framing and the per-request event channel.
//!
//! Each request owns one [`EventEmitter`] / [`EventStream`] pair. The emitter
//! sends fully framed `event: ..\ndata: ..\n\n` blocks down a bounded channel;
//! the HTTP layer forwards every block as its own body chunk, so events reach
//! the client in emission order and without batching.

use crate::context::{StageContext, StageName};
use crate::error::{Result, StageError};
use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ContextUpdate,
    Error,
    Final,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ContextUpdate => "context_update",
            EventType::Error => "error",
            EventType::Final => "final_recommendation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Thinking,
    Responded,
    Failed,
}

#[derive(Serialize)]
struct StagePayload<'a> {
    stage: StageName,
    status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    context: &'a StageContext,
}

#[derive(Serialize)]
struct FinalPayload<'a> {
    final_recommendation: &'a str,
    context: &'a StageContext,
}

/// Frame one event in the SSE wire format.
///
/// `serde_json` never emits raw newlines, so the payload always fits on a
/// single `data:` line.
pub fn encode_event<T: Serialize>(event: EventType, payload: &T) -> Result<Bytes> {
    let data = serde_json::to_string(payload).map_err(shopwise_core::Error::from)?;
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event.as_str(), data)))
}

/// Writing half of a request's event stream
pub struct EventEmitter {
    tx: mpsc::Sender<Bytes>,
    emitted: usize,
}

impl EventEmitter {
    /// Create a connected emitter/stream pair buffering up to `capacity` events.
    pub fn channel(capacity: usize) -> (EventEmitter, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (EventEmitter { tx, emitted: 0 }, EventStream { rx })
    }

    /// Number of events written so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has dropped the stream
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Write one event; fails with `Cancelled` when the consumer is gone.
    pub async fn emit<T: Serialize>(&mut self, event: EventType, payload: &T) -> Result<()> {
        let frame = encode_event(event, payload)?;
        self.tx.send(frame).await.map_err(|_| StageError::Cancelled)?;
        self.emitted += 1;
        Ok(())
    }

    pub async fn stage_started(&mut self, stage: StageName, ctx: &StageContext) -> Result<()> {
        let payload = StagePayload {
            stage,
            status: StageStatus::Thinking,
            message: None,
            error: None,
            context: ctx,
        };
        self.emit(EventType::ContextUpdate, &payload).await
    }

    pub async fn stage_completed(&mut self, stage: StageName, message: &str, ctx: &StageContext) -> Result<()> {
        let payload = StagePayload {
            stage,
            status: StageStatus::Responded,
            message: Some(message),
            error: None,
            context: ctx,
        };
        self.emit(EventType::ContextUpdate, &payload).await
    }

    pub async fn stage_failed(&mut self, stage: StageName, error: &StageError, ctx: &StageContext) -> Result<()> {
        let payload = StagePayload {
            stage,
            status: StageStatus::Failed,
            message: None,
            error: Some(error.to_string()),
            context: ctx,
        };
        self.emit(EventType::Error, &payload).await
    }

    pub async fn final_recommendation(&mut self, recommendation: &str, ctx: &StageContext) -> Result<()> {
        let payload = FinalPayload {
            final_recommendation: recommendation,
            context: ctx,
        };
        self.emit(EventType::Final, &payload).await
    }
}

/// Reading half of a request's event stream; yields framed SSE blocks.
pub struct EventStream {
    rx: mpsc::Receiver<Bytes>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// One parsed SSE block, for consumers and tests
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Split an SSE body into its blank-line-terminated blocks.
pub fn parse_events(body: &str) -> Vec<ParsedEvent> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(rest).ok();
                }
            }
            Some(ParsedEvent {
                event: event?,
                data: data?,
            })
        })
        .collect()
}
