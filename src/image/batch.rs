use super::{ImageService, ImageSource, ProcessedImage};
use crate::models::ResizeConfig;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::warn;

/// Resizes every source concurrently.
///
/// Calls may finish in any order; the returned vector is indexed like
/// `sources`, so result `i` always belongs to input `i`.
pub async fn process_batch(
    service: Arc<dyn ImageService>,
    sources: Vec<ImageSource>,
    config: ResizeConfig,
) -> Vec<Result<ProcessedImage>> {
    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let service = service.clone();
            tokio::spawn(async move { service.resize_image(source, &config).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Batch item {} did not complete: {}", index, e);
                Err(Error::Invariant(format!(
                    "Batch task {} join error: {}",
                    index, e
                )))
            }
        };
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageCodec, ImageProcessor};
    use image::{ImageFormat, Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn create_test_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_results_pair_with_inputs() {
        let codec = ImageCodec::new();
        let processor = Arc::new(ImageProcessor::with_codec(Arc::new(codec.clone())));

        // Ten distinct widths, some above and some below the 600px bound.
        let sizes: Vec<(u32, u32)> = (0..10).map(|i| (200 + i * 150, 100 + i * 10)).collect();
        let sources = sizes
            .iter()
            .map(|&(w, h)| ImageSource::Bytes(create_test_image(w, h)))
            .collect();

        let results = process_batch(processor.clone(), sources, ResizeConfig::default()).await;
        assert_eq!(results.len(), sizes.len());

        for (&(w, h), result) in sizes.iter().zip(results) {
            let processed = result.unwrap();
            assert_eq!((processed.source_width, processed.source_height), (w, h));
            assert_eq!(
                (processed.width, processed.height),
                crate::image::fit_within(w, h, 600, 600)
            );
            processor.previews().release(processed.preview);
        }

        assert_eq!(codec.live_surfaces(), 0);
        assert_eq!(processor.previews().live_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_stay_with_their_input() {
        let processor = Arc::new(ImageProcessor::new());
        let sources = vec![
            ImageSource::Bytes(create_test_image(10, 10)),
            ImageSource::Bytes(b"corrupt".to_vec()),
            ImageSource::Bytes(create_test_image(20, 20)),
        ];

        let mut results = process_batch(processor.clone(), sources, ResizeConfig::default()).await;

        let last = results.pop().unwrap().unwrap();
        let middle = results.pop().unwrap();
        let first = results.pop().unwrap().unwrap();

        assert_eq!(first.width, 10);
        assert!(matches!(middle, Err(Error::Decode(_))));
        assert_eq!(last.width, 20);

        processor.previews().release(first.preview);
        processor.previews().release(last.preview);
    }
}
