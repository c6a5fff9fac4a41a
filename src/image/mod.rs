//! Image preprocessing before upload
//!
//! Decodes an image, clamps it into the configured bounding box and
//! re-encodes it so it is small enough to push over the network.

pub mod batch;
pub mod clamp;
pub mod codec;
pub mod mime;
pub mod mock;
pub mod preview;
pub mod processor;

pub use batch::process_batch;
pub use clamp::fit_within;
pub use codec::{Codec, ImageCodec, Raster};
pub use mime::{detect_image_mime, format_file_size, is_image_file};
pub use mock::MockImageProcessor;
pub use preview::{PreviewHandle, PreviewStore};
pub use processor::ImageProcessor;

use crate::models::{OutputEncoding, ResizeConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the encoded input image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ImageSource {
    /// Reads the whole source into memory.
    pub async fn read(self) -> Result<Vec<u8>> {
        match self {
            ImageSource::Bytes(bytes) => Ok(bytes),
            ImageSource::File(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| Error::Read(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImageSource::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
            ImageSource::File(path) => path.display().to_string(),
        }
    }
}

/// Result of one resize call. Owned by the caller, who must release
/// `preview` once it is no longer displayed.
#[derive(Debug)]
pub struct ProcessedImage {
    pub encoded: Arc<[u8]>,
    pub preview: PreviewHandle,
    pub original_size: u64,
    pub new_size: u64,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub encoding: OutputEncoding,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn resize_image(
        &self,
        source: ImageSource,
        config: &ResizeConfig,
    ) -> Result<ProcessedImage>;

    /// Store that owns the preview handles this service hands out.
    fn previews(&self) -> &PreviewStore;
}
