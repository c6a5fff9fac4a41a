//! Application orchestration for preparing and publishing a set of images.

use crate::cdn::{CdnClient, CdnService, MockCdnClient};
use crate::image::{format_file_size, is_image_file, ImageProcessor, ImageService, ImageSource};
use crate::models::{Config, ResizeConfig};
use crate::upload::ImageUploader;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-run behaviour chosen by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output_dir: Option<PathBuf>,
    pub upload: bool,
    /// Bound on each resize and each upload; no bound when `None`.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub input: String,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl ImageReport {
    fn new(input: &Path, status: ImageStatus) -> Self {
        Self {
            input: input.display().to_string(),
            status,
            error: None,
            width: None,
            height: None,
            original_size: None,
            new_size: None,
            output_path: None,
            public_url: None,
        }
    }

    fn failed(input: &Path, error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(input, ImageStatus::Failed)
        }
    }
}

/// Everything a run did, in input order. Written as `manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub config: ResizeConfig,
    pub images: Vec<ImageReport>,
}

impl RunSummary {
    pub fn count(&self, status: ImageStatus) -> usize {
        self.images.iter().filter(|r| r.status == status).count()
    }
}

/// Coordinates preprocessing, local output and storage uploads for a run.
pub struct App {
    uploader: Arc<ImageUploader>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub images: Arc<dyn ImageService>,
    pub cdn: Arc<dyn CdnService>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, upload_retries: usize) -> Self {
        let uploader = ImageUploader::new(services.images, services.cdn)
            .with_retry(upload_retries, Duration::from_millis(500));
        Self {
            uploader: Arc::new(uploader),
        }
    }

    /// Construct an app from configuration (see `Config::from_env`).
    pub async fn new(config: &Config) -> Result<Self> {
        let cdn: Arc<dyn CdnService> = match (
            config.dry_run,
            &config.storage_access_key_id,
            &config.storage_secret_access_key,
        ) {
            (false, Some(access_key_id), Some(secret_access_key)) => {
                info!(
                    "Uploading to bucket {} at {}",
                    config.storage_bucket, config.storage_endpoint
                );
                Arc::new(
                    CdnClient::new(
                        access_key_id.clone(),
                        secret_access_key.clone(),
                        config.storage_endpoint.clone(),
                        config.storage_bucket.clone(),
                        config.storage_public_base_url.clone(),
                    )
                    .await?,
                )
            }
            _ => {
                info!("Dry run: uploads stay in memory");
                Arc::new(
                    MockCdnClient::new().with_base_url(config.storage_public_base_url.clone()),
                )
            }
        };

        Ok(Self::with_services(
            AppServices {
                images: Arc::new(ImageProcessor::new()),
                cdn,
            },
            config.upload_retry_attempts,
        ))
    }

    /// Process every input concurrently and return a report per input.
    pub async fn run(
        &self,
        inputs: Vec<PathBuf>,
        config: ResizeConfig,
        options: RunOptions,
    ) -> Result<RunSummary> {
        if let Some(dir) = &options.output_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let options = Arc::new(options);
        let output_names = output_names(&inputs, &config);

        let tasks: Vec<_> = inputs
            .into_iter()
            .zip(output_names)
            .map(|(input, output_name)| {
                if !is_image_file(&input) {
                    warn!("Skipping {}: not an image file", input.display());
                    return Task::Skipped(input);
                }

                let uploader = self.uploader.clone();
                let options = options.clone();
                let path = input.clone();
                Task::Spawned(
                    input,
                    tokio::spawn(async move {
                        process_one(&uploader, &path, &output_name, config, &options).await
                    }),
                )
            })
            .collect();

        let mut images = Vec::with_capacity(tasks.len());
        for task in tasks {
            let report = match task {
                Task::Skipped(input) => ImageReport::new(&input, ImageStatus::Skipped),
                Task::Spawned(input, handle) => match handle.await {
                    Ok(report) => report,
                    Err(e) => ImageReport::failed(
                        &input,
                        &Error::Invariant(format!("Image task join error: {}", e)),
                    ),
                },
            };
            images.push(report);
        }

        let summary = RunSummary {
            generated_at: Utc::now(),
            config,
            images,
        };

        if let Some(dir) = &options.output_dir {
            let manifest_path = dir.join("manifest.json");
            tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&summary)?).await?;
            info!("Wrote manifest to {}", manifest_path.display());
        }

        info!(
            "Processed {} images: {} ok, {} failed, {} skipped",
            summary.images.len(),
            summary.count(ImageStatus::Ok),
            summary.count(ImageStatus::Failed),
            summary.count(ImageStatus::Skipped)
        );

        Ok(summary)
    }
}

enum Task {
    Skipped(PathBuf),
    Spawned(PathBuf, tokio::task::JoinHandle<ImageReport>),
}

/// `<stem>.<ext>` per input, with `-2`, `-3`... appended to repeated stems.
fn output_names(inputs: &[PathBuf], config: &ResizeConfig) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string());
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;

            if *count == 1 {
                format!("{}.{}", stem, config.encoding().extension())
            } else {
                format!("{}-{}.{}", stem, count, config.encoding().extension())
            }
        })
        .collect()
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    what: String,
    work: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| Error::Timeout(format!("{} after {:?}", what, limit)))?,
        None => work.await,
    }
}

async fn process_one(
    uploader: &ImageUploader,
    input: &Path,
    output_name: &str,
    config: ResizeConfig,
    options: &RunOptions,
) -> ImageReport {
    let previews = uploader.images().previews();

    let processed = match with_timeout(
        options.timeout,
        format!("resizing {}", input.display()),
        uploader
            .images()
            .resize_image(ImageSource::File(input.to_path_buf()), &config),
    )
    .await
    {
        Ok(processed) => processed,
        Err(e) => {
            error!("Failed to process {}: {}", input.display(), e);
            return ImageReport::failed(input, &e);
        }
    };

    info!(
        "{}: {} -> {} ({}x{} -> {}x{})",
        input.display(),
        format_file_size(processed.original_size),
        format_file_size(processed.new_size),
        processed.source_width,
        processed.source_height,
        processed.width,
        processed.height
    );

    let mut report = ImageReport {
        width: Some(processed.width),
        height: Some(processed.height),
        original_size: Some(processed.original_size),
        new_size: Some(processed.new_size),
        ..ImageReport::new(input, ImageStatus::Ok)
    };

    let outcome = async {
        if let Some(dir) = &options.output_dir {
            let output_path = dir.join(output_name);
            tokio::fs::write(&output_path, &processed.encoded[..]).await?;
            report.output_path = Some(output_path.display().to_string());
        }

        if options.upload {
            let (_, public_url) = with_timeout(
                options.timeout,
                format!("uploading {}", input.display()),
                uploader.upload_processed(&processed),
            )
            .await?;
            report.public_url = Some(public_url);
        }

        Ok::<_, Error>(())
    }
    .await;

    previews.release(processed.preview);

    match outcome {
        Ok(()) => report,
        Err(e) => {
            error!("Failed to publish {}: {}", input.display(), e);
            ImageReport {
                status: ImageStatus::Failed,
                error: Some(e.to_string()),
                ..report
            }
        }
    }
}
