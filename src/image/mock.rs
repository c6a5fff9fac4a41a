use super::{fit_within, ImageService, ImageSource, PreviewStore, ProcessedImage};
use crate::models::ResizeConfig;
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Pretends every input is `source_dimensions` and echoes it back shrunk.
pub struct MockImageProcessor {
    process_count: Arc<Mutex<usize>>,
    source_dimensions: (u32, u32),
    should_fail: Arc<Mutex<bool>>,
    previews: PreviewStore,
}

impl MockImageProcessor {
    pub fn new() -> Self {
        Self {
            process_count: Arc::new(Mutex::new(0)),
            source_dimensions: (1200, 800),
            should_fail: Arc::new(Mutex::new(false)),
            previews: PreviewStore::new(),
        }
    }

    pub fn with_source_dimensions(mut self, width: u32, height: u32) -> Self {
        self.source_dimensions = (width, height);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_process_count(&self) -> usize {
        *self.process_count.lock().unwrap()
    }
}

impl Default for MockImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageProcessor {
    async fn resize_image(
        &self,
        source: ImageSource,
        config: &ResizeConfig,
    ) -> Result<ProcessedImage> {
        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Decode("Mock failure".to_string()));
        }

        let bytes = source.read().await?;

        *self.process_count.lock().unwrap() += 1;

        let (source_width, source_height) = self.source_dimensions;
        let (width, height) = fit_within(
            source_width,
            source_height,
            config.max_width(),
            config.max_height(),
        );

        // Keep half of the input so size accounting looks plausible.
        let encoded: Arc<[u8]> = Arc::from(&bytes[..bytes.len() / 2]);

        Ok(ProcessedImage {
            preview: self.previews.create(encoded.clone()),
            original_size: bytes.len() as u64,
            new_size: encoded.len() as u64,
            encoded,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_image_processor() {
        let processor = MockImageProcessor::new();

        let result = processor
            .resize_image(
                ImageSource::Bytes(b"fake image data".to_vec()),
                &ResizeConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!((result.width, result.height), (600, 400));
        assert_eq!(result.original_size, 15);
        assert_eq!(result.new_size, 7);
        assert_eq!(processor.get_process_count(), 1);

        processor.previews().release(result.preview);
    }

    #[tokio::test]
    async fn test_mock_with_custom_dimensions() {
        let processor = MockImageProcessor::new().with_source_dimensions(300, 3000);

        let result = processor
            .resize_image(ImageSource::Bytes(b"data".to_vec()), &ResizeConfig::default())
            .await
            .unwrap();

        assert_eq!((result.width, result.height), (60, 600));
        processor.previews().release(result.preview);
    }

    #[tokio::test]
    async fn test_mock_with_failure() {
        let processor = MockImageProcessor::new().with_failure(true);

        let result = processor
            .resize_image(ImageSource::Bytes(b"data".to_vec()), &ResizeConfig::default())
            .await;
        assert!(result.is_err());
        assert_eq!(processor.get_process_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_unique_previews() {
        let processor = MockImageProcessor::new();
        let config = ResizeConfig::default();

        let result1 = processor
            .resize_image(ImageSource::Bytes(b"data".to_vec()), &config)
            .await
            .unwrap();
        let result2 = processor
            .resize_image(ImageSource::Bytes(b"data".to_vec()), &config)
            .await
            .unwrap();

        assert_ne!(result1.preview.reference(), result2.preview.reference());
        assert_eq!(processor.previews().live_count(), 2);

        processor.previews().release(result1.preview);
        processor.previews().release(result2.preview);
        assert_eq!(processor.previews().live_count(), 0);
    }
}
