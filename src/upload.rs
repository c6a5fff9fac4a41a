//! Preprocess-then-upload flow.
//!
//! Only the storage write is retried. A failed resize is returned straight
//! to the caller, who can pick the file again.

use crate::cdn::CdnService;
use crate::image::{ImageService, ImageSource, ProcessedImage};
use crate::models::{OutputEncoding, ResizeConfig};
use crate::Result;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{info, warn};

/// A processed image that now also lives in the bucket.
#[derive(Debug)]
pub struct UploadedImage {
    pub key: String,
    pub public_url: String,
    pub processed: ProcessedImage,
}

pub struct ImageUploader {
    images: Arc<dyn ImageService>,
    cdn: Arc<dyn CdnService>,
    retries: usize,
    retry_interval: Duration,
}

impl ImageUploader {
    pub fn new(images: Arc<dyn ImageService>, cdn: Arc<dyn CdnService>) -> Self {
        Self {
            images,
            cdn,
            retries: 3,
            retry_interval: Duration::from_millis(500),
        }
    }

    /// Retries after the first failed upload, `retries` times at most.
    pub fn with_retry(mut self, retries: usize, interval: Duration) -> Self {
        self.retries = retries;
        self.retry_interval = interval;
        self
    }

    pub fn images(&self) -> &Arc<dyn ImageService> {
        &self.images
    }

    /// Resizes `source` and uploads the result under a fresh key.
    ///
    /// The returned preview handle is still live; release it through
    /// `self.images().previews()` once the public URL is displayed instead.
    pub async fn upload(&self, source: ImageSource, config: &ResizeConfig) -> Result<UploadedImage> {
        let processed = self.images.resize_image(source, config).await?;

        let uploaded = self.upload_processed(&processed).await;
        match uploaded {
            Ok((key, public_url)) => Ok(UploadedImage {
                key,
                public_url,
                processed,
            }),
            Err(e) => {
                self.images.previews().release(processed.preview);
                Err(e)
            }
        }
    }

    /// Uploads an already processed image, returning its key and public URL.
    pub async fn upload_processed(&self, processed: &ProcessedImage) -> Result<(String, String)> {
        let key = upload_key(processed.encoding);
        let public_url = self
            .upload_with_retry(&key, &processed.encoded, processed.encoding.mime_type())
            .await?;

        info!("Uploaded {} ({} bytes)", public_url, processed.new_size);
        Ok((key, public_url))
    }

    async fn upload_with_retry(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let strategy = FixedInterval::new(self.retry_interval).take(self.retries);

        Retry::spawn(strategy, || async move {
            self.cdn
                .upload_file(key, data, content_type)
                .await
                .map_err(|e| {
                    warn!("Upload of {} failed: {}", key, e);
                    e
                })
        })
        .await
    }
}

/// Storage key of the form `<unix-millis>_<random>.<ext>`.
pub fn upload_key(encoding: OutputEncoding) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    format!(
        "{}_{}.{}",
        Utc::now().timestamp_millis(),
        suffix.to_ascii_lowercase(),
        encoding.extension()
    )
}
