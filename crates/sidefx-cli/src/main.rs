mod display;
mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use sidefx_ai::{InferenceAdapter, ModelArtifacts, load_adapter};
use sidefx_http::AppState;
use tracing_subscriber::EnvFilter;

/// Drug side-effect severity predictor.
#[derive(Debug, Parser)]
#[command(name = "sidefx", version, about)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "sidefx_ai=debug").
    #[arg(long, env = "SIDEFX_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ModelArgs {
    /// Directory holding best_pipeline.onnx and label_encoder.json.
    #[arg(long, env = "SIDEFX_MODEL_DIR", default_value = "models", global = true)]
    model_dir: PathBuf,

    /// Pipeline file, overriding the one in --model-dir.
    #[arg(long, env = "SIDEFX_PIPELINE", global = true)]
    pipeline_file: Option<PathBuf>,

    /// Label decoder file, overriding the one in --model-dir.
    #[arg(long, env = "SIDEFX_DECODER", global = true)]
    decoder_file: Option<PathBuf>,
}

impl ModelArgs {
    fn artifacts(&self) -> ModelArtifacts {
        let mut artifacts = ModelArtifacts::in_dir(&self.model_dir);
        if let Some(path) = &self.pipeline_file {
            artifacts = artifacts.with_pipeline(path);
        }
        if let Some(path) = &self.decoder_file {
            artifacts = artifacts.with_decoder(path);
        }
        artifacts
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prompt for one drug record on stdin and print its predicted severity.
    Predict {
        /// Also print per-class probabilities.
        #[arg(long)]
        probabilities: bool,
    },
    /// Serve POST /predict and GET /health over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "SIDEFX_LISTEN", default_value = "127.0.0.1:8000")]
        listen: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    tracing::info!("sidefx v{}", env!("CARGO_PKG_VERSION"));

    let adapter = load_adapter(&cli.model.artifacts());

    match cli.command {
        Command::Predict { probabilities } => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            prompt::run_predict(
                &adapter,
                &mut stdin.lock(),
                &mut stdout.lock(),
                Local::now().naive_local(),
                probabilities,
            )
        }
        Command::Serve { listen } => serve(adapter, &listen).await,
    }
}

async fn serve(adapter: InferenceAdapter, listen: &str) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(Arc::new(adapter)));
    sidefx_http::serve(listen, state)
        .await
        .with_context(|| format!("serving HTTP on {listen}"))
}

/// Log to stderr so the interactive prompt owns stdout.
fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level {level:?}"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
