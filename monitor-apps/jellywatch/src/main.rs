//! Binary entry point for the Jellywatch daemon.
//!
//! Loads the TOML configuration, initializes logging and hands control to
//! [`jellywatch::Jellywatch::start`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ext_config::{Config, File, FileFormat};
use jellywatch::{config::JellywatchConfig, Jellywatch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jellywatch", about = "Jellyfin session monitoring daemon", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", default_value = "jellywatch-config.toml")]
    config_path: PathBuf,
    /// Append logs to this file instead of stdout.
    #[arg(short = 'f', long = "log-file")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging is not up yet, so configuration failures go to stderr.
    let config_path = args.config_path.display().to_string();
    let mut config = match Config::builder()
        .add_source(File::new(&config_path, FileFormat::Toml))
        .build()
    {
        Ok(settings) => match settings.try_deserialize::<JellywatchConfig>() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse the configuration {config_path}: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Failed to read the configuration {config_path}: {e}");
            std::process::exit(1);
        }
    };
    config.set_log_dir(args.log_file);

    init_logging(&config);

    info!(
        "Jellywatch starting with {} configured backend(s)",
        config.backends.len()
    );
    if let Err(e) = Jellywatch::new(config).start().await {
        error!("Jellywatch failed: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins when set; otherwise the `display.debug` flag picks the
/// default level. With a log file configured, output goes there without
/// ANSI escapes.
fn init_logging(config: &JellywatchConfig) {
    let default_directive = if config.display.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let log_file = config.log_dir().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                eprintln!(
                    "Could not open the log file {}: {e}; logging to stdout",
                    path.display()
                );
            })
            .ok()
    });

    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .init(),
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
