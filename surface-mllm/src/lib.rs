//! Surface MLLM - compare image descriptions across multimodal language models
//!
//! This crate provides:
//! - A typed data model for per-trial model outputs and their variation summaries
//! - Session stores with whole-value replacement and stale-load protection
//! - A display-mode controller and view composer for the comparison tables
//! - Clients for the static example provider and the generation service
//! - The generation service itself: a thin REST proxy over the Python pipeline

pub mod api;
pub mod client;
pub mod compose;
pub mod display;
pub mod grid;
pub mod highlight;
pub mod image;
pub mod keys;
pub mod model;
pub mod pipeline;
pub mod protocol;
pub mod provider;
pub mod store;
pub mod variation;

#[cfg(test)]
mod test_support;

pub use display::{DisplayController, DisplayState, RepresentationType};
pub use highlight::highlight;
pub use model::{ModelId, ModelRun, PromptVariation, ResponseSet, VariationSummary};
pub use store::Session;

use model::{ModelOption, VariationOption};
use std::path::PathBuf;

/// Configuration for the generation service
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SurfaceConfig {
    /// HTTP listener and dataset settings
    #[serde(default)]
    pub server: ServerConfig,

    /// External pipeline invocation
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Models offered to clients
    #[serde(default = "default_models")]
    pub models: Vec<ModelOption>,

    /// Prompt variation modes offered to clients
    #[serde(default = "default_prompt_variations")]
    pub prompt_variations: Vec<VariationOption>,

    /// Defaults pre-filled into client forms
    #[serde(default)]
    pub defaults: GenerationDefaults,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            models: default_models(),
            prompt_variations: default_prompt_variations(),
            defaults: GenerationDefaults::default(),
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory holding one sub-directory per example dataset
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// How the external description pipeline is launched
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PipelineConfig {
    /// Python interpreter
    #[serde(default = "default_python")]
    pub python: String,

    /// Directory containing the pipeline script
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,

    /// Script file name inside `script_dir`
    #[serde(default = "default_script")]
    pub script: String,

    /// Seconds before a pipeline run is killed
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            script_dir: default_script_dir(),
            script: default_script(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Form defaults advertised by `GET /config`
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default = "default_num_trials")]
    pub num_trials: u32,

    #[serde(default = "ModelId::defaults")]
    pub models: Vec<ModelId>,

    #[serde(default)]
    pub prompt_variation: PromptVariation,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            num_trials: default_num_trials(),
            models: ModelId::defaults(),
            prompt_variation: PromptVariation::default(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_log_level() -> String { "info".to_string() }
fn default_python() -> String { "python3".to_string() }
fn default_script_dir() -> PathBuf { PathBuf::from("pipeline") }
fn default_script() -> String { "pipeline.py".to_string() }
fn default_timeout_secs() -> u64 { 600 }
fn default_num_trials() -> u32 { 3 }

/// Prompt used when the user leaves the prompt blank
pub fn default_prompt() -> String {
    "Describe the image in detail.".to_string()
}

fn default_models() -> Vec<ModelOption> {
    ModelId::defaults()
        .into_iter()
        .map(|id| ModelOption {
            id,
            name: id.full_name().to_string(),
        })
        .collect()
}

fn default_prompt_variations() -> Vec<VariationOption> {
    PromptVariation::ALL
        .iter()
        .map(|&id| VariationOption {
            id,
            name: id.label().to_string(),
        })
        .collect()
}
