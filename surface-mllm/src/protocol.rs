//! Wire types of the generation service
//!
//! Shared by the HTTP client and the axum server so both ends agree on the
//! camelCase JSON shapes.

use crate::model::{
    ExampleMetadata, ImageSource, ModelId, ModelOption, PromptVariation, ResponseSet,
    VariationOption, VariationSummary,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /generate`
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Remote URL or `data:` payload, according to `source`
    #[serde(default)]
    pub image: String,
    #[serde(default = "crate::default_prompt")]
    pub prompt: String,
    #[serde(default = "default_num_trials")]
    pub num_trials: u32,
    #[serde(default = "ModelId::defaults")]
    pub selected_models: Vec<ModelId>,
    #[serde(default)]
    pub prompt_variation: PromptVariation,
    #[serde(default = "default_source")]
    pub source: ImageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_key: Option<String>,
}

fn default_num_trials() -> u32 {
    3
}

fn default_source() -> ImageSource {
    ImageSource::Url
}

// Keys and inline image payloads stay out of logs
impl fmt::Debug for GenerateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = match self.source {
            ImageSource::Url => self.image.clone(),
            ImageSource::Base64 => format!("<{} bytes of base64>", self.image.len()),
        };
        f.debug_struct("GenerateRequest")
            .field("image", &image)
            .field("prompt", &self.prompt)
            .field("num_trials", &self.num_trials)
            .field("selected_models", &self.selected_models)
            .field("prompt_variation", &self.prompt_variation)
            .field("source", &self.source)
            .field("openai_key", &self.openai_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_key", &self.gemini_key.as_ref().map(|_| "<redacted>"))
            .field("claude_key", &self.claude_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Successful body of `POST /generate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub success: bool,
    pub descriptions: ResponseSet,
    #[serde(default)]
    pub variation_summary: VariationSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

/// Body of `GET /config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub models: Vec<ModelOption>,
    pub prompt_variations: Vec<VariationOption>,
    pub default_prompt: String,
    pub default_num_trials: u32,
    pub default_models: Vec<ModelId>,
    pub default_prompt_variation: PromptVariation,
}

/// Body of `POST /get_descriptions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionsRequest {
    #[serde(default)]
    pub image_name: String,
}

/// Successful body of `POST /get_descriptions`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub descriptions: ResponseSet,
    #[serde(default)]
    pub variation: VariationSummary,
    #[serde(default)]
    pub metadata: ExampleMetadata,
}

/// One example dataset on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
}

/// Body of `GET /datasets`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetList {
    pub datasets: Vec<Dataset>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Error body returned on any non-2xx status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
