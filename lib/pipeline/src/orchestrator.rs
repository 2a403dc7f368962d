//! Runs the stages of one request in order and reports progress as events.

use crate::config::PipelineConfig;
use crate::context::{PipelineRequest, StageContext, StageName};
use crate::error::StageError;
use crate::events::{EventEmitter, EventStream};
use crate::inference::InferenceCapability;
use crate::stages::{synthesize, BudgetStage, IdentificationStage, RetrievalStage, Stage, ValueStage};
use shopwise_core::SimilarityIndex;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where a pipeline run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running(StageName),
    Done(StageName),
    Synthesizing,
    Complete,
    Failed(StageName),
    /// The consumer went away; no further events were sent
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Complete | PipelineState::Failed(_) | PipelineState::Cancelled
        )
    }
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub context: StageContext,
    pub error: Option<StageError>,
}

/// Sequences the stages against a fresh [`StageContext`] per request.
///
/// Execution within a request is strictly sequential and fail-fast: the first
/// failing stage produces one `error` event and ends the stream. Requests are
/// independent of each other; the orchestrator itself holds only read-only
/// state and can drive any number of runs concurrently.
pub struct PipelineOrchestrator {
    stages: Vec<Box<dyn Stage>>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Build the standard identification → retrieval → value → budget pipeline.
    pub fn new(
        index: Option<Arc<SimilarityIndex>>,
        inference: Arc<dyn InferenceCapability>,
        config: PipelineConfig,
    ) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(IdentificationStage::new(Arc::clone(&inference), &config)),
            Box::new(RetrievalStage::new(index, inference, config.top_k)),
            Box::new(ValueStage),
            Box::new(BudgetStage),
        ];
        Self::with_stages(stages, config)
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>, config: PipelineConfig) -> Self {
        Self { stages, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the pipeline in a background task and hand back its event stream.
    ///
    /// Dropping the stream cancels the run at its next suspension point.
    pub fn spawn(self: Arc<Self>, request: PipelineRequest) -> EventStream {
        let (mut emitter, stream) = EventEmitter::channel(self.config.event_buffer);
        tokio::spawn(async move {
            self.run(request, &mut emitter).await;
        });
        stream
    }

    /// Run every stage, then synthesis, writing events to `emitter`.
    pub async fn run(&self, request: PipelineRequest, emitter: &mut EventEmitter) -> PipelineOutcome {
        let mut context = StageContext::new(&request);
        let span = info_span!("pipeline", session_id = %context.session_id);
        let (state, error) = self
            .drive(&request, &mut context, emitter)
            .instrument(span)
            .await;
        PipelineOutcome { state, context, error }
    }

    async fn drive(
        &self,
        request: &PipelineRequest,
        ctx: &mut StageContext,
        emitter: &mut EventEmitter,
    ) -> (PipelineState, Option<StageError>) {
        info!(
            query = %request.query,
            has_image = request.image.is_some(),
            "Pipeline started"
        );
        let mut state = PipelineState::Init;

        for stage in &self.stages {
            let name = stage.name();
            if emitter.stage_started(name, ctx).await.is_err() {
                return disconnected(state);
            }
            state = PipelineState::Running(name);
            debug!(stage = %name, "Stage started");

            let result = tokio::select! {
                biased;
                _ = emitter.closed() => Err(StageError::Cancelled),
                finished = timeout(self.config.stage_timeout, stage.run(ctx, request)) => match finished {
                    Ok(result) => result,
                    Err(_) => Err(StageError::StageTimeout {
                        stage: name,
                        after: self.config.stage_timeout,
                    }),
                },
            };

            let output = match result {
                Ok(output) => output,
                Err(StageError::Cancelled) => return disconnected(state),
                Err(e) => return fail(name, e, ctx, emitter).await,
            };

            stage.apply(ctx, &output);
            let message = output.message.clone();
            ctx.agent_outputs.insert(name, output);
            if emitter.stage_completed(name, &message, ctx).await.is_err() {
                return disconnected(state);
            }
            state = PipelineState::Done(name);
            debug!(stage = %name, "Stage completed");
        }

        state = PipelineState::Synthesizing;
        let recommendation = match synthesize(ctx) {
            Ok(text) => text,
            Err(e) => return fail(StageName::Synthesis, e, ctx, emitter).await,
        };
        ctx.final_recommendation = Some(recommendation.clone());
        if emitter.final_recommendation(&recommendation, ctx).await.is_err() {
            return disconnected(state);
        }

        info!(events = emitter.emitted(), "Pipeline complete");
        (PipelineState::Complete, None)
    }
}

fn disconnected(state: PipelineState) -> (PipelineState, Option<StageError>) {
    warn!(last_state = ?state, "Client disconnected, abandoning pipeline");
    (PipelineState::Cancelled, None)
}

async fn fail(
    stage: StageName,
    e: StageError,
    ctx: &StageContext,
    emitter: &mut EventEmitter,
) -> (PipelineState, Option<StageError>) {
    error!(stage = %stage, error = %e, "Stage failed");
    if emitter.stage_failed(stage, &e, ctx).await.is_err() {
        warn!(stage = %stage, "Client disconnected before the error event was sent");
    }
    (PipelineState::Failed(stage), Some(e))
}
