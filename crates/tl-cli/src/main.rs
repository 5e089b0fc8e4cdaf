//! Resize, sepia-tone and caption two images with one assembly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tl_cli::{sample_images, step_options, CaptionStyle, ConsoleListener, STEP_NAME, STEP_ROBOT};
use tl_client::{ClientConfig, Transloadit};

/// Command-line arguments for tl-image-resizer
#[derive(Parser, Debug)]
#[command(name = "tl-image-resizer")]
#[command(about = "Convert images to captioned sepia PNGs with Transloadit")]
#[command(version)]
struct Args {
    /// Images to process; defaults to the bundled samples
    #[arg(num_args = 1.., default_values_os_t = sample_images())]
    files: Vec<PathBuf>,

    /// Caption drawn onto every image
    #[arg(long, default_value = "Rust Example")]
    text: String,

    /// Upload inputs in the creation request instead of through tus
    #[arg(long)]
    multipart: bool,

    /// API host
    #[arg(long, env = "TRANSLOADIT_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        bail!("Failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let args = Args::parse();

    for file in &args.files {
        if !file.is_file() {
            bail!("Input file not found: {}", file.display());
        }
    }

    let mut config = ClientConfig::from_env().context("Failed to load Transloadit credentials")?;
    if let Some(host) = &args.host {
        config = config.with_host(host);
    }
    let transloadit = Transloadit::with_config(config);

    let mut assembly = transloadit.new_assembly();
    for file in &args.files {
        assembly.add_file_auto(file);
    }

    let caption = CaptionStyle {
        text: args.text.clone(),
        ..CaptionStyle::default()
    };
    assembly.add_step(STEP_NAME, STEP_ROBOT, step_options(&caption));
    assembly.set_listener(Arc::new(ConsoleListener::new(STEP_NAME, std::io::stdout())));

    info!(files = args.files.len(), multipart = args.multipart, "Starting assembly");

    let response = assembly
        .save(!args.multipart)
        .await
        .context("Failed to create assembly")?;
    println!(
        "Assembly {} created, waiting for results ...",
        response.id().unwrap_or("(unknown)")
    );

    assembly.wait().await.context("Assembly did not complete")?;
    Ok(())
}
