//! Surface CLI - compare image descriptions across models from the terminal
//!
//! Usage:
//!   surface examples
//!   surface show <KEY> [--representation percentage] [--detail atomic]
//!   surface generate --image photo.jpg --models gpt,claude --trials 2
//!
//! Examples come from a directory or a static file server (`--data`), live
//! generations go through the generation service (`--service`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surface::client::{GenerationService, HttpGenerationClient};
use surface::compose::{compose_with, render_text, terminal_marker};
use surface::display::{DetailLevel, DisplayState, ViewMode};
use surface::image::ImageInput;
use surface::keys::{KeyName, KeyStore};
use surface::provider::{DirExampleSource, ExampleSource, HttpExampleSource};
use surface::store::{GenerateOutcome, GenerationForm, Session, SessionMode};
use surface::{ModelId, PromptVariation, RepresentationType};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "surface", version, about = "Compare image descriptions across multimodal models")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// Example data: a directory or an http(s) base URL
    #[arg(long, global = true, default_value = "data")]
    data: String,

    /// Generation service URL
    #[arg(long, global = true, default_value = "http://localhost:8000")]
    service: String,

    /// Request timeout for the generation service, in seconds
    #[arg(long, global = true, default_value_t = 600)]
    timeout: u64,

    /// File holding third-party API keys
    #[arg(long, global = true, default_value = ".surface/keys.json")]
    keys: PathBuf,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the available examples
    Examples,
    /// Show a stored example
    Show {
        key: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Generate descriptions for an image through the service
    Generate {
        /// Image URL, data URL or local file
        #[arg(long)]
        image: String,
        #[arg(long, default_value = "Describe the image in detail.")]
        prompt: String,
        #[arg(long, default_value_t = 3)]
        trials: u32,
        /// Comma-separated model list
        #[arg(long, value_delimiter = ',', default_value = "gpt,claude,gemini")]
        models: Vec<ModelId>,
        #[arg(long, default_value = "original")]
        variation: PromptVariation,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// List the datasets stored on the service
    Datasets,
    /// Check that the service is up
    Health,
    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a key
    Set { provider: Provider, value: String },
    /// Remove a key
    Remove { provider: Provider },
    /// Show which keys are stored
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Openai,
    Gemini,
    Claude,
}

impl From<Provider> for KeyName {
    fn from(p: Provider) -> Self {
        match p {
            Provider::Openai => KeyName::OpenAi,
            Provider::Gemini => KeyName::Gemini,
            Provider::Claude => KeyName::Claude,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Representation {
    Model,
    None,
    Percentage,
    Natural,
}

#[derive(Clone, Copy, ValueEnum)]
enum Detail {
    Response,
    Sentence,
    Atomic,
}

#[derive(Args)]
struct ViewArgs {
    /// Variation-aware rendering
    #[arg(long, value_enum, default_value = "model")]
    representation: Representation,
    /// Granularity of the detail section
    #[arg(long, value_enum, default_value = "response")]
    detail: Detail,
    /// Only show these models (comma-separated)
    #[arg(long, value_delimiter = ',')]
    only: Vec<ModelId>,
    /// Run shown in the detail section
    #[arg(long, default_value = "1")]
    current: String,
    /// Raw descriptions only, no variation sections
    #[arg(long)]
    raw: bool,
    #[arg(long)]
    no_summary: bool,
    #[arg(long)]
    no_list: bool,
    /// Do not colour the variation annotations
    #[arg(long)]
    plain: bool,
    /// Show only the `--current` run in the list and grid
    #[arg(long)]
    single: bool,
}

impl ViewArgs {
    fn apply(&self, session: &Session) {
        let display = session.display();
        display.set_representation_type(match self.representation {
            Representation::Model => RepresentationType::Model,
            Representation::None => RepresentationType::None,
            Representation::Percentage => RepresentationType::Percentage,
            Representation::Natural => RepresentationType::Natural,
        });
        display.set_detail_level(match self.detail {
            Detail::Response => DetailLevel::Response,
            Detail::Sentence => DetailLevel::Sentence,
            Detail::Atomic => DetailLevel::Atomic,
        });
        if !self.only.is_empty() {
            display.set_selected_models(self.only.iter().copied().collect::<BTreeSet<_>>());
        }
        display.set_current_id(self.current.clone());
        display.set_show_variations(!self.raw);
        display.set_show_variation_summary(!self.no_summary);
        display.set_show_description_list(!self.no_list);
        display.set_show_color_uncertainty_indicator(!self.plain);
        display.set_view_mode(if self.single { ViewMode::One } else { ViewMode::All });
    }
}

fn print_view(session: &Session) {
    let state: DisplayState = session.display().state();
    let view = compose_with(&session.snapshot(), &state, &terminal_marker);
    println!("{}", render_text(&view));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let source: Arc<dyn ExampleSource> =
        if cli.data.starts_with("http://") || cli.data.starts_with("https://") {
            Arc::new(HttpExampleSource::new(&cli.data).context("Failed to create HTTP client")?)
        } else {
            Arc::new(DirExampleSource::new(&cli.data))
        };
    let service = Arc::new(
        HttpGenerationClient::new(&cli.service, Duration::from_secs(cli.timeout))
            .context("Failed to create HTTP client")?,
    );
    let session = Session::new(source, service);

    match cli.cmd {
        Cmd::Examples => {
            let keys = session
                .source()
                .list()
                .await
                .with_context(|| format!("Failed to list examples in {}", cli.data))?;
            if keys.is_empty() {
                eprintln!("{}", "No examples found".yellow());
            }
            for key in keys {
                println!("{}", key);
            }
        }
        Cmd::Show { key, view } => {
            view.apply(&session);
            let report = session.load_example(&key).await;
            if report.applied.is_empty() {
                anyhow::bail!("Could not load example {}", key);
            }
            for (document, error) in &report.failed {
                eprintln!("{} {}: {}", "warning:".yellow(), document, error);
            }
            print_view(&session);
        }
        Cmd::Generate {
            image,
            prompt,
            trials,
            models,
            variation,
            view,
        } => {
            let keys = KeyStore::load(&cli.keys)
                .with_context(|| format!("Failed to read {}", cli.keys.display()))?;
            let image = ImageInput::from_user_input(&image)
                .await
                .context("Invalid image")?;
            let form = GenerationForm {
                image: Some(image),
                prompt,
                num_trials: trials,
                models,
                prompt_variation: variation,
            };

            session.set_mode(SessionMode::Generate);
            view.apply(&session);
            eprintln!("{}", "Generating descriptions, this can take a few minutes...".cyan());
            match session.generate(&form, Some(&keys)).await {
                Ok(GenerateOutcome::Applied { runs }) => {
                    eprintln!("{} {} runs", "Done:".green(), runs);
                    print_view(&session);
                }
                Ok(GenerateOutcome::Superseded) => {
                    eprintln!("{}", "Result discarded".yellow());
                }
                Err(e) => anyhow::bail!("{}", e.user_message()),
            }
        }
        Cmd::Datasets => {
            let list = session
                .service()
                .datasets()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            for dataset in list.datasets {
                println!("{}  {}", dataset.id.cyan(), dataset.name);
            }
        }
        Cmd::Health => {
            let health = session
                .service()
                .health()
                .await
                .with_context(|| format!("Service at {} is not reachable", cli.service))?;
            println!("{} {}", health.status.green(), health.message);
        }
        Cmd::Keys { action } => {
            let mut keys = KeyStore::load(&cli.keys)
                .with_context(|| format!("Failed to read {}", cli.keys.display()))?;
            match action {
                KeyAction::Set { provider, value } => keys.set(provider.into(), value),
                KeyAction::Remove { provider } => keys.remove(provider.into()),
                KeyAction::List => {
                    for name in [KeyName::OpenAi, KeyName::Gemini, KeyName::Claude] {
                        let state = if keys.get(name).is_some() {
                            "set".green()
                        } else {
                            "not set".dimmed()
                        };
                        println!("{:<10} {}", name.storage_name(), state);
                    }
                    return Ok(());
                }
            }
            keys.save(&cli.keys)
                .with_context(|| format!("Failed to write {}", cli.keys.display()))?;
        }
    }

    Ok(())
}
