use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{error::InternalError, http::StatusCode, web, App, HttpResponse, HttpServer, Result as ActixResult};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use shopwise_core::{SearchResult, SimilarityIndex};
use shopwise_pipeline::{
    collect_text, summarize, Availability, EventStream, InferenceCapability, InferenceError, PipelineOrchestrator,
    PipelineRequest,
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted product image upload
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Largest accepted text field in a multipart form
pub const MAX_FIELD_BYTES: usize = 64 * 1024;

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    /// `None` when the index files could not be loaded
    pub index: Option<Arc<SimilarityIndex>>,
    pub inference: Arc<dyn InferenceCapability>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

#[derive(Deserialize)]
struct RecommendationQuery {
    #[serde(default)]
    query: String,
    price: f64,
    user_budget: f64,
}

#[derive(Deserialize)]
struct ReviewQuery {
    query: String,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ReviewAnalysis {
    summary: String,
    top_products: Vec<SearchResult>,
}

#[derive(Serialize)]
struct ImageAnalysis {
    prompt: String,
    analysis: String,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: AppState, port: u16, static_dir: Option<PathBuf>) -> std::io::Result<()> {
        let data = web::Data::new(state);
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            let mut app = App::new().wrap(cors).app_data(data.clone()).configure(configure);
            if let Some(dir) = &static_dir {
                app = app.service(actix_files::Files::new("/", dir).index_file("index.html"));
            }
            app
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register the `/api` routes; shared by the server and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/recommendation", web::post().to(recommend))
            .route("/get-recommendation", web::get().to(get_recommendation))
            .route("/analyze-reviews", web::post().to(analyze_reviews))
            .route("/analyze-product-image", web::post().to(analyze_product_image)),
    );
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "error": message.to_string()
    }))
}

fn finite(name: &str, value: f64) -> Result<f64, HttpResponse> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("`{name}` must be a finite number, got '{value}'"),
        ))
    }
}

fn inference_error_response(e: &InferenceError) -> HttpResponse {
    match e {
        InferenceError::Unavailable(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, e),
        _ => error_response(StatusCode::BAD_GATEWAY, e),
    }
}

fn event_stream_response(events: EventStream) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(events.map(Ok::<Bytes, Infallible>))
}

/// Text and file parts of a multipart upload
#[derive(Default)]
struct UploadForm {
    fields: Vec<(String, String)>,
    image: Option<Bytes>,
}

impl UploadForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    fn number(&self, name: &str) -> Result<f64, HttpResponse> {
        match self.text(name).map(str::trim) {
            None | Some("") => Err(error_response(StatusCode::BAD_REQUEST, format!("`{name}` is required"))),
            Some(raw) => {
                let value = raw.parse::<f64>().map_err(|_| {
                    error_response(StatusCode::BAD_REQUEST, format!("`{name}` must be a number, got '{raw}'"))
                })?;
                finite(name, value)
            }
        }
    }
}

async fn read_upload(mut payload: Multipart) -> ActixResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let limit = if name == "image" { MAX_IMAGE_BYTES } else { MAX_FIELD_BYTES };
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            if buf.len() + chunk.len() > limit {
                warn!(field = %name, limit, "Multipart field too large");
                let message = format!("`{name}` exceeds the {limit} byte limit");
                let response = error_response(StatusCode::PAYLOAD_TOO_LARGE, &message);
                return Err(InternalError::from_response(message, response).into());
            }
            buf.extend_from_slice(&chunk);
        }
        if name == "image" {
            if !buf.is_empty() {
                form.image = Some(buf.freeze());
            }
        } else {
            form.fields.push((name, String::from_utf8_lossy(&buf).into_owned()));
        }
    }
    Ok(form)
}

async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let index = match &state.index {
        Some(index) => serde_json::json!({
            "loaded": true,
            "entries": index.len(),
            "dim": index.dim(),
        }),
        None => serde_json::json!({ "loaded": false }),
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "index": index,
        "inference": {
            "backend": state.inference.name(),
            "availability": state.inference.availability(),
        },
    })))
}

async fn recommend(state: web::Data<AppState>, payload: Multipart) -> ActixResult<HttpResponse> {
    let form = read_upload(payload).await?;
    let (price, budget) = match (form.number("price"), form.number("budget")) {
        (Ok(price), Ok(budget)) => (price, budget),
        (Err(response), _) | (_, Err(response)) => return Ok(response),
    };

    let mut request = PipelineRequest::text(form.text("query").unwrap_or_default(), price, budget);
    request.image = form.image;
    info!(has_image = request.image.is_some(), "Recommendation requested");

    let events = Arc::clone(&state.orchestrator).spawn(request);
    Ok(event_stream_response(events))
}

async fn get_recommendation(
    state: web::Data<AppState>,
    query: web::Query<RecommendationQuery>,
) -> ActixResult<HttpResponse> {
    let query = query.into_inner();
    let (price, budget) = match (finite("price", query.price), finite("user_budget", query.user_budget)) {
        (Ok(price), Ok(budget)) => (price, budget),
        (Err(response), _) | (_, Err(response)) => return Ok(response),
    };
    let request = PipelineRequest::text(query.query, price, budget);
    let events = Arc::clone(&state.orchestrator).spawn(request);
    Ok(event_stream_response(events))
}

async fn analyze_reviews(
    state: web::Data<AppState>,
    body: web::Either<web::Json<ReviewQuery>, web::Form<ReviewQuery>>,
) -> ActixResult<HttpResponse> {
    let req = match body {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    };
    let query = req.query.trim();
    if query.is_empty() {
        return Ok(error_response(StatusCode::BAD_REQUEST, "`query` must not be empty"));
    }

    let Some(index) = &state.index else {
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "similarity index is not loaded",
        ));
    };

    let vector = match state.inference.embed_text(query).await {
        Ok(vector) => vector,
        Err(e) => return Ok(inference_error_response(&e)),
    };
    let top_k = req.top_k.unwrap_or(state.orchestrator.config().top_k);
    let top_products = match index.search(vector.as_slice(), top_k) {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "Review search failed");
            return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, e));
        }
    };

    Ok(HttpResponse::Ok().json(ReviewAnalysis {
        summary: summarize(query, &top_products),
        top_products,
    }))
}

async fn analyze_product_image(state: web::Data<AppState>, payload: Multipart) -> ActixResult<HttpResponse> {
    if let Availability::Unavailable(reason) = state.inference.availability() {
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("image analysis is unavailable: {reason}"),
        ));
    }

    let form = read_upload(payload).await?;
    let Some(image) = form.image.as_ref() else {
        return Ok(error_response(StatusCode::BAD_REQUEST, "an `image` file is required"));
    };
    let prompt = form
        .text("prompt")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(state.orchestrator.config().identification_prompt.as_str())
        .to_string();

    let max_chunks = state.orchestrator.config().max_description_chunks;
    let described = match state.inference.describe(image, &prompt).await {
        Ok(chunks) => collect_text(chunks, max_chunks).await,
        Err(e) => Err(e),
    };
    match described {
        Ok(analysis) => Ok(HttpResponse::Ok().json(ImageAnalysis { prompt, analysis })),
        Err(e) => {
            warn!(error = %e, "Image analysis failed");
            Ok(inference_error_response(&e))
        }
    }
}
