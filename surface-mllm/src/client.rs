//! Generation service client
//!
//! The service proxies requests to the description pipeline. It is slow
//! (minutes per request for several trials) and nothing is retried.

use crate::protocol::{
    DatasetList, DescriptionsRequest, DescriptionsResponse, ErrorBody, GenerateRequest,
    GenerateResponse, HealthResponse, ServiceConfig,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when talking to the generation service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Unexpected response body: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ServiceError {
    /// Text suitable for showing to the user
    ///
    /// Messages the service chose to send are passed through; transport and
    /// decoding failures get a generic notice.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Upstream { message, .. } if !message.is_empty() => message.clone(),
            ServiceError::Transport(e) if e.is_timeout() => {
                "The generation service did not respond in time.".to_string()
            }
            _ => "Failed to generate descriptions. Please try again.".to_string(),
        }
    }
}

/// Remote generation service
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Run the pipeline for one image
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ServiceError>;

    /// Fetch the model list and form defaults
    async fn config(&self) -> Result<ServiceConfig, ServiceError>;

    /// List the server-side example datasets
    async fn datasets(&self) -> Result<DatasetList, ServiceError>;

    /// Load a server-side example dataset
    async fn get_descriptions(&self, image_name: &str)
        -> Result<DescriptionsResponse, ServiceError>;

    async fn health(&self) -> Result<HealthResponse, ServiceError>;
}

/// reqwest implementation of [`GenerationService`]
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
}

impl HttpGenerationClient {
    /// Create a client for `base_url`, e.g. `http://localhost:8000`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self.client.get(self.url(path)).send().await?;
        decode(response).await
    }
}

/// Decode a success body, or turn a failure into [`ServiceError::Upstream`]
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        return Err(ServiceError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ServiceError> {
        info!(
            models = ?request.selected_models,
            trials = request.num_trials,
            variation = %request.prompt_variation,
            source = request.source.as_str(),
            "Requesting generation"
        );

        let response = self
            .client
            .post(self.url("/generate"))
            .json(request)
            .send()
            .await?;
        let generated: GenerateResponse = decode(response).await?;

        debug!(runs = generated.descriptions.len(), "Generation complete");
        Ok(generated)
    }

    async fn config(&self) -> Result<ServiceConfig, ServiceError> {
        self.get("/config").await
    }

    async fn datasets(&self) -> Result<DatasetList, ServiceError> {
        self.get("/datasets").await
    }

    async fn get_descriptions(
        &self,
        image_name: &str,
    ) -> Result<DescriptionsResponse, ServiceError> {
        let request = DescriptionsRequest {
            image_name: image_name.to_string(),
        };
        let response = self
            .client
            .post(self.url("/get_descriptions"))
            .json(&request)
            .send()
            .await?;
        decode(response).await
    }

    async fn health(&self) -> Result<HealthResponse, ServiceError> {
        self.get("/health").await
    }
}
