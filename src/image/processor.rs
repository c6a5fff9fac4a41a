use super::{
    detect_image_mime, fit_within, Codec, ImageCodec, ImageService, ImageSource, PreviewStore,
    ProcessedImage, Raster,
};
use crate::models::ResizeConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct ImageProcessor {
    codec: Arc<dyn Codec>,
    previews: PreviewStore,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self::with_codec(Arc::new(ImageCodec::new()))
    }

    pub fn with_codec(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            previews: PreviewStore::new(),
        }
    }

    fn render_and_encode_sync(
        codec: &dyn Codec,
        raster: Raster,
        config: ResizeConfig,
    ) -> Result<(Vec<u8>, u32, u32)> {
        let (width, height) = fit_within(
            raster.width(),
            raster.height(),
            config.max_width(),
            config.max_height(),
        );

        let surface = codec.render(&raster, width, height)?;
        drop(raster);

        let encoded = codec.encode(&surface, config.quality(), config.encoding())?;
        Ok((encoded, surface.width(), surface.height()))
    }

    async fn decode(&self, bytes: Vec<u8>) -> Result<Raster> {
        tokio::task::spawn_blocking({
            let codec = self.codec.clone();
            move || codec.decode(&bytes)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image decode task join error: {}", e)))?
    }

    async fn render_and_encode(
        &self,
        raster: Raster,
        config: ResizeConfig,
    ) -> Result<(Vec<u8>, u32, u32)> {
        tokio::task::spawn_blocking({
            let codec = self.codec.clone();
            move || Self::render_and_encode_sync(codec.as_ref(), raster, config)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image encode task join error: {}", e)))?
    }
}

#[async_trait]
impl ImageService for ImageProcessor {
    async fn resize_image(
        &self,
        source: ImageSource,
        config: &ResizeConfig,
    ) -> Result<ProcessedImage> {
        let description = source.describe();
        let bytes = source.read().await?;
        let original_size = bytes.len() as u64;
        let source_mime = detect_image_mime(&bytes).unwrap_or("unknown type");

        let raster = self.decode(bytes).await?;
        let (source_width, source_height) = (raster.width(), raster.height());

        let (encoded, width, height) = self.render_and_encode(raster, *config).await?;
        let encoded: Arc<[u8]> = Arc::from(encoded);
        let new_size = encoded.len() as u64;

        debug!(
            "Resized {} ({}) from {}x{} ({} bytes) to {}x{} {} ({} bytes)",
            description,
            source_mime,
            source_width,
            source_height,
            original_size,
            width,
            height,
            config.encoding(),
            new_size
        );

        Ok(ProcessedImage {
            preview: self.previews.create(encoded.clone()),
            encoded,
            original_size,
            new_size,
            width,
            height,
            source_width,
            source_height,
            encoding: config.encoding(),
        })
    }

    fn previews(&self) -> &PreviewStore {
        &self.previews
    }
}
