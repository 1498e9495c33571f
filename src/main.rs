use std::path::PathBuf;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::{Parser, Subcommand};

use lifecycle_config::ConfigManager;
use model_lifecycle::{ModelId, ModelLifecycle, PullOptions, PullOutcome};

/// Pull, load and inspect locally cached model artifacts
///
/// Examples:
///   model-lifecycle pull hexgrad/Kokoro-82M
///   model-lifecycle pull org/model --allow '*.onnx' --deny '*-quantized.onnx'
///   model-lifecycle load org/model
///   model-lifecycle list
#[derive(Parser)]
#[command(
    name = "model-lifecycle",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Never contact the remote registry
    #[arg(long, global = true)]
    offline: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a model into the local cache
    #[command(name = "pull", alias = "download")]
    Pull {
        /// Model identifier, e.g. org/name
        model: String,

        /// Only fetch files matching this glob (repeatable)
        #[arg(long = "allow", value_name = "PATTERN")]
        allow: Vec<String>,

        /// Skip files matching this glob (repeatable)
        #[arg(long = "deny", value_name = "PATTERN")]
        deny: Vec<String>,
    },

    /// Load a locally present model and report it
    #[command(name = "load")]
    Load {
        /// Model identifier, e.g. org/name
        model: String,
    },

    /// List models present in the local cache
    #[command(name = "list", alias = "ls")]
    List,
}

fn non_empty(patterns: Vec<String>) -> Option<Vec<String>> {
    (!patterns.is_empty()).then_some(patterns)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::new(),
    }
    .context("failed to load configuration")?;

    let mut settings = config_manager.into_settings();
    if cli.offline {
        settings.hub.offline = true;
    }

    let _log_guard = logging::init(&settings.logging)?;

    let lifecycle = ModelLifecycle::new(settings)?;
    let manager = lifecycle.get_model_manager();

    match cli.command {
        Commands::Pull { model, allow, deny } => {
            let id = ModelId::new(model)?;
            let options = PullOptions {
                allow: non_empty(allow),
                deny: non_empty(deny),
            };

            let outcome = manager.pull(&id, &options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                match outcome {
                    PullOutcome::AlreadyExists { path } => {
                        println!("{} already present at {}", id, path.display());
                    }
                    PullOutcome::Created { path, files, bytes } => {
                        println!(
                            "Pulled {} ({} file(s), {}) into {}",
                            id,
                            files,
                            ByteSize(bytes),
                            path.display()
                        );
                    }
                }
            }
        }
        Commands::Load { model } => {
            let id = ModelId::new(model)?;
            let artifact = manager.load(&id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(artifact.as_ref())?);
            } else {
                println!(
                    "Loaded {} from {} ({} file(s), {})",
                    artifact.id,
                    artifact.root.display(),
                    artifact.files.len(),
                    ByteSize(artifact.total_bytes)
                );
                for file in &artifact.files {
                    println!("  {:<60} {}", file.path.display(), ByteSize(file.size));
                }
            }

            drop(artifact);
            manager.unload(&id)?;
        }
        Commands::List => {
            let models = manager.list_local()?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                println!("No models in {}", lifecycle.settings().storage.cache_dir.display());
            } else {
                for id in models {
                    println!("{}", id);
                }
            }
        }
    }

    Ok(())
}
