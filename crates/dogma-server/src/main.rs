//! `central-dogma`: the server binary.
//!
//! ```bash
//! central-dogma --data-dir ./data
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dogma_config::DogmaConfig;
use tracing::error;

/// Central Dogma: a replicated, version-controlled configuration
/// repository server.
#[derive(Parser)]
#[command(name = "central-dogma", author, version, about, long_about = None)]
struct Cli {
    /// Storage root. Overrides whatever `dataDir` the layered config
    /// sources would otherwise resolve to.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dogma_server::init_tracing();

    let cli = Cli::parse();
    let config = match &cli.data_dir {
        Some(data_dir) => DogmaConfig::load_from_data_dir(data_dir),
        None => DogmaConfig::load(),
    };

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = dogma_server::run(config).await {
        error!("server exited with an error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
