//! REST API of the generation service

use crate::model::{ExampleMetadata, ImageSource, ResponseSet, VariationSummary};
use crate::pipeline::{Pipeline, PipelineError};
use crate::protocol::{
    Dataset, DatasetList, DescriptionsRequest, DescriptionsResponse, ErrorBody, GenerateRequest,
    GenerateResponse, HealthResponse, ServiceConfig,
};
use crate::provider::{
    fetch_json, validate_key, DirExampleSource, ExampleDocument, ExampleSource, SourceError,
};
use crate::SurfaceConfig;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};


/// Inline base64 images can be large
const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// API state
pub struct ApiState {
    pub config: SurfaceConfig,
    pub pipeline: Arc<dyn Pipeline>,
    pub datasets: DirExampleSource,
}

impl ApiState {
    pub fn new(config: SurfaceConfig, pipeline: Arc<dyn Pipeline>) -> Self {
        let datasets = DirExampleSource::new(config.server.data_dir.clone());
        Self {
            config,
            pipeline,
            datasets,
        }
    }
}

/// Errors returned to clients as `{ error, details? }`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{error}")]
    Internal {
        error: String,
        details: Option<String>,
    },
}

impl ApiError {
    fn internal(error: &str, details: impl ToString) -> Self {
        ApiError::Internal {
            error: error.to_string(),
            details: Some(details.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, ErrorBody { error, details: None }),
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, ErrorBody { error, details: None }),
            ApiError::Internal { error, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody { error, details })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/generate", post(generate))
        .route("/get_descriptions", post(get_descriptions))
        .route("/datasets", get(list_datasets))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Surface MLLM Backend is running".to_string(),
    })
}

/// Model list and form defaults
async fn get_config(State(state): State<Arc<ApiState>>) -> Json<ServiceConfig> {
    let config = &state.config;
    Json(ServiceConfig {
        models: config.models.clone(),
        prompt_variations: config.prompt_variations.clone(),
        default_prompt: config.defaults.prompt.clone(),
        default_num_trials: config.defaults.num_trials,
        default_models: config.defaults.models.clone(),
        default_prompt_variation: config.defaults.prompt_variation,
    })
}

/// Run the pipeline for one image
async fn generate(
    State(state): State<Arc<ApiState>>,
    Json(mut request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if request.image.trim().is_empty() {
        return Err(ApiError::BadRequest("No image provided".to_string()));
    }
    if request.selected_models.is_empty() {
        return Err(ApiError::BadRequest(
            "Please select at least one model".to_string(),
        ));
    }
    if request.num_trials == 0 {
        return Err(ApiError::BadRequest(
            "Number of trials must be at least 1".to_string(),
        ));
    }
    match request.source {
        ImageSource::Url if !is_http_url(&request.image) => {
            return Err(ApiError::BadRequest(
                "Image URL must start with http:// or https://".to_string(),
            ));
        }
        ImageSource::Base64 if !request.image.starts_with("data:image/") => {
            return Err(ApiError::BadRequest("Invalid image data".to_string()));
        }
        _ => {}
    }
    if request.prompt.trim().is_empty() {
        request.prompt = state.config.defaults.prompt.clone();
    }

    info!(?request, "Generate request");

    let output = state.pipeline.run(&request).await.map_err(|e| match e {
        PipelineError::InvalidImage(reason) => {
            warn!("Rejected image payload: {}", reason);
            ApiError::BadRequest(format!("Invalid image data: {}", reason))
        }
        PipelineError::Parse(_) | PipelineError::NoOutput => {
            error!("Pipeline failed: {}", e);
            ApiError::internal("Failed to parse results", e)
        }
        _ => {
            error!("Pipeline failed: {}", e);
            ApiError::internal("Failed to generate descriptions", e)
        }
    })?;

    let image_id = output.image_id.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            .to_string()
    });

    Ok(Json(GenerateResponse {
        success: true,
        descriptions: output.descriptions,
        variation_summary: output.summary,
        image_id: Some(image_id),
    }))
}

/// Load a stored example dataset
async fn get_descriptions(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<DescriptionsRequest>,
) -> Result<Json<DescriptionsResponse>, ApiError> {
    if request.image_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Image name is required".to_string()));
    }
    let key = validate_key(&request.image_name)
        .map_err(|_| ApiError::BadRequest("Invalid image name".to_string()))?;

    let dir = state.datasets.root().join(key);
    if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
        return Err(ApiError::NotFound("Data not found".to_string()));
    }

    let descriptions: ResponseSet =
        load_or_default(&state.datasets, key, ExampleDocument::Descriptions).await?;
    let variation: VariationSummary =
        load_or_default(&state.datasets, key, ExampleDocument::Summary).await?;
    let metadata: ExampleMetadata =
        load_or_default(&state.datasets, key, ExampleDocument::Metadata).await?;

    Ok(Json(DescriptionsResponse {
        success: true,
        descriptions,
        variation,
        metadata,
    }))
}

/// A missing document is an empty one
async fn load_or_default<T>(
    source: &DirExampleSource,
    key: &str,
    document: ExampleDocument,
) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    match fetch_json(source, key, document).await {
        Ok(value) => Ok(value),
        Err(SourceError::NotFound(_)) => Ok(T::default()),
        Err(e) => {
            warn!(key, %document, "Failed to load dataset document: {}", e);
            Err(ApiError::internal("Failed to load descriptions", e))
        }
    }
}

/// Available example datasets
async fn list_datasets(State(state): State<Arc<ApiState>>) -> Result<Json<DatasetList>, ApiError> {
    if !tokio::fs::metadata(state.datasets.root()).await.is_ok_and(|m| m.is_dir()) {
        return Ok(Json(DatasetList::default()));
    }

    let keys = state
        .datasets
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to get datasets", e))?;

    let datasets = keys
        .into_iter()
        .map(|id| Dataset {
            name: capitalise(&id),
            id,
        })
        .collect();
    Ok(Json(DatasetList { datasets }))
}

fn is_http_url(image: &str) -> bool {
    let image = image.trim_start();
    image.starts_with("http://") || image.starts_with("https://")
}

fn capitalise(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
