//! External description pipeline
//!
//! The pipeline is a Python script that queries the models, aggregates their
//! answers and prints its result as JSON on the last line of stdout.

use crate::model::{ImageSource, ResponseSet, VariationSummary};
use crate::protocol::GenerateRequest;
use crate::PipelineConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Errors from running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to start pipeline: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    #[error("Pipeline exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Pipeline produced no output")]
    NoOutput,

    #[error("Failed to parse results: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid image payload: {0}")]
    InvalidImage(String),
}

/// Result printed by the pipeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    #[serde(default)]
    pub descriptions: ResponseSet,
    #[serde(default)]
    pub summary: VariationSummary,
    #[serde(default)]
    pub image_id: Option<String>,
}

/// Something that turns a generation request into descriptions
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, request: &GenerateRequest) -> Result<PipelineOutput, PipelineError>;
}

/// Runs the pipeline script as a child process
pub struct ScriptPipeline {
    config: PipelineConfig,
}

impl ScriptPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    fn script_path(&self) -> PathBuf {
        self.config.script_dir.join(&self.config.script)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Script arguments for a request whose image is passed as `image_arg`
    fn args(request: &GenerateRequest, image_arg: &str, source: &str) -> Vec<String> {
        let models: Vec<&str> = request.selected_models.iter().map(|m| m.as_str()).collect();
        vec![
            "--image_url".to_string(),
            image_arg.to_string(),
            "--prompt".to_string(),
            request.prompt.clone(),
            "--num_trials".to_string(),
            request.num_trials.to_string(),
            "--models".to_string(),
            models.join(","),
            "--variation_type".to_string(),
            request.prompt_variation.as_str().to_string(),
            "--source".to_string(),
            source.to_string(),
        ]
    }
}

/// Write a `data:image/...;base64,` payload to a file inside `dir`
fn write_inline_image(dir: &Path, data_url: &str) -> Result<PathBuf, PipelineError> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| PipelineError::InvalidImage("missing data URL header".to_string()))?;
    let extension = header
        .strip_prefix("data:image/")
        .and_then(|rest| rest.strip_suffix(";base64"))
        .map(|subtype| if subtype == "jpeg" { "jpg" } else { subtype })
        .ok_or_else(|| PipelineError::InvalidImage(format!("unsupported header {:?}", header)))?;
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PipelineError::InvalidImage(format!("unsupported header {:?}", header)));
    }

    let bytes = B64
        .decode(payload.trim())
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
    let path = dir.join(format!("image.{}", extension));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Parse the last non-empty stdout line
fn parse_output(stdout: &str) -> Result<PipelineOutput, PipelineError> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or(PipelineError::NoOutput)?;
    Ok(serde_json::from_str(line)?)
}

#[async_trait]
impl Pipeline for ScriptPipeline {
    async fn run(&self, request: &GenerateRequest) -> Result<PipelineOutput, PipelineError> {
        // The scratch dir holds the decoded image until the child has exited
        let (args, _scratch): (Vec<String>, Option<TempDir>) = match request.source {
            ImageSource::Url => (
                Self::args(request, &request.image, ImageSource::Url.as_str()),
                None,
            ),
            ImageSource::Base64 => {
                let dir = tempfile::tempdir()?;
                let path = write_inline_image(dir.path(), &request.image)?;
                (Self::args(request, &path.to_string_lossy(), "file"), Some(dir))
            }
        };

        let script = self.script_path();
        info!(
            script = %script.display(),
            models = ?request.selected_models,
            trials = request.num_trials,
            "Running pipeline"
        );

        let mut command = Command::new(&self.config.python);
        command
            .arg("-u")
            .arg(&script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (var, key) in [
            ("OPENAI_API_KEY", &request.openai_key),
            ("GEMINI_API_KEY", &request.gemini_key),
            ("ANTHROPIC_API_KEY", &request.claude_key),
        ] {
            if let Some(key) = key {
                command.env(var, key);
            }
        }

        let start = Instant::now();
        let child = command.spawn().map_err(PipelineError::Spawn)?;
        let timeout = self.timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(?timeout, "Pipeline timed out, killing it");
                return Err(PipelineError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            stdout_lines = stdout.lines().count(),
            "Pipeline finished"
        );

        if !output.status.success() {
            return Err(PipelineError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Pipeline stderr");
        }

        parse_output(&stdout)
    }
}
