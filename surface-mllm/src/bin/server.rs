//! Surface MLLM generation service binary

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use surface::api::{create_router, ApiState};
use surface::pipeline::ScriptPipeline;
use surface::SurfaceConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Load config from file; the defaults apply when none is given
    let config_path = std::env::args().nth(1);
    let config: SurfaceConfig = match &config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path))?
        }
        None => SurfaceConfig::default(),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Surface MLLM server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = config_path.as_deref().unwrap_or("<defaults>"),
        data_dir = %config.server.data_dir.display(),
        script = %config.pipeline.script_dir.join(&config.pipeline.script).display(),
        models = config.models.len(),
        "Loaded configuration"
    );

    if !config.server.data_dir.is_dir() {
        warn!(
            data_dir = %config.server.data_dir.display(),
            "Dataset directory does not exist, /datasets will be empty"
        );
    }

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;

    let pipeline = Arc::new(ScriptPipeline::new(config.pipeline.clone()));
    let state = Arc::new(ApiState::new(config, pipeline));
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
