use anyhow::Result;
use clap::Parser;
use image_prep::app::{App, ImageStatus, RunOptions};
use image_prep::models::{Config, OutputEncoding};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-prep")]
#[command(about = "Shrink images to a bounding box and publish them to storage")]
struct CliArgs {
    /// Image files to process.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Maximum output width in pixels.
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum output height in pixels.
    #[arg(long)]
    max_height: Option<u32>,

    /// Output quality between 0.0 and 1.0.
    #[arg(long)]
    quality: Option<f32>,

    /// Output encoding: jpeg, png or webp.
    #[arg(long, value_parser = parse_encoding_arg)]
    format: Option<OutputEncoding>,

    /// Directory for the processed files and manifest.json.
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Upload processed images to the configured bucket.
    #[arg(long)]
    upload: bool,

    /// Give up on a single resize or upload after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
}

fn parse_encoding_arg(input: &str) -> std::result::Result<OutputEncoding, String> {
    input.parse().map_err(|e: image_prep::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_prep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting image-prep");

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let resize = config.resize;
    let resize = resize.with_bounds(
        args.max_width.unwrap_or(resize.max_width()),
        args.max_height.unwrap_or(resize.max_height()),
    )?;
    let resize = resize.with_quality(args.quality.unwrap_or(resize.quality()))?;
    let resize = resize.with_encoding(args.format.unwrap_or(resize.encoding()));

    let options = RunOptions {
        output_dir: args.output_dir,
        upload: args.upload,
        timeout: args.timeout_secs.map(Duration::from_secs),
    };

    let app = match App::new(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    match app.run(args.inputs, resize, options).await {
        Ok(summary) if summary.count(ImageStatus::Failed) == 0 => {
            info!("All images processed successfully");
            Ok(())
        }
        Ok(summary) => {
            error!(
                "{} of {} images failed",
                summary.count(ImageStatus::Failed),
                summary.images.len()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}
