//! Codec boundary between the clamp logic and the pixel work.
//!
//! [`Codec`] is the narrow interface the processor talks to: decode bytes
//! into a [`Raster`], render a raster onto a surface of a given size, and
//! encode a raster back into bytes. [`ImageCodec`] implements it on top of
//! the `image` crate.

use crate::models::OutputEncoding;
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader, Limits};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Largest surface we are willing to render onto (16384 x 16384).
pub const MAX_SURFACE_PIXELS: u64 = 16_384 * 16_384;

/// Sources wider or taller than this are refused before any pixel buffer
/// is allocated.
pub const MAX_SOURCE_DIMENSION: u32 = 65_535;

pub trait Codec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Raster>;
    fn render(&self, raster: &Raster, width: u32, height: u32) -> Result<Raster>;
    fn encode(&self, raster: &Raster, quality: f32, encoding: OutputEncoding) -> Result<Vec<u8>>;
}

/// Counts a live decode or render surface until dropped.
#[derive(Debug)]
pub struct SurfaceGuard {
    live: Arc<AtomicUsize>,
}

impl SurfaceGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { live: live.clone() }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A decoded pixel grid, owned by exactly one call.
#[derive(Debug)]
pub struct Raster {
    image: DynamicImage,
    _surface: SurfaceGuard,
}

impl Raster {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

#[derive(Debug, Clone)]
pub struct ImageCodec {
    filter: FilterType,
    live_surfaces: Arc<AtomicUsize>,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
            live_surfaces: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of rasters and surfaces currently allocated by this codec.
    pub fn live_surfaces(&self) -> usize {
        self.live_surfaces.load(Ordering::SeqCst)
    }

    fn surface(&self, image: DynamicImage) -> Raster {
        Raster {
            image,
            _surface: SurfaceGuard::new(&self.live_surfaces),
        }
    }
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits
}

/// Decodes with the EXIF orientation applied, so a rotated phone photo
/// comes out upright with its displayed width and height.
fn decode_oriented(bytes: &[u8]) -> image::ImageResult<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(decode_limits());

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Raster> {
        if bytes.is_empty() {
            return Err(Error::Decode("input is empty".to_string()));
        }

        let image = decode_oriented(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Decode(format!(
                "decoded image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        Ok(self.surface(image))
    }

    fn render(&self, raster: &Raster, width: u32, height: u32) -> Result<Raster> {
        if width == 0 || height == 0 {
            return Err(Error::Surface(format!(
                "cannot render onto a {}x{} surface",
                width, height
            )));
        }
        let area = u64::from(width) * u64::from(height);
        if area > MAX_SURFACE_PIXELS {
            return Err(Error::Surface(format!(
                "{}x{} exceeds the maximum surface area of {} pixels",
                width, height, MAX_SURFACE_PIXELS
            )));
        }

        let rendered = if raster.width() == width && raster.height() == height {
            raster.image.clone()
        } else {
            raster.image.resize_exact(width, height, self.filter)
        };

        Ok(self.surface(rendered))
    }

    fn encode(&self, raster: &Raster, quality: f32, encoding: OutputEncoding) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        let result = match encoding {
            // JPEG has no alpha channel
            OutputEncoding::Jpeg => DynamicImage::ImageRgb8(raster.image.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(
                    &mut buffer,
                    jpeg_quality(quality),
                )),
            OutputEncoding::Png => match raster.image.color() {
                ColorType::L8
                | ColorType::La8
                | ColorType::Rgb8
                | ColorType::Rgba8
                | ColorType::L16
                | ColorType::La16
                | ColorType::Rgb16
                | ColorType::Rgba16 => raster
                    .image
                    .write_with_encoder(PngEncoder::new(&mut buffer)),
                // Float rasters (EXR, HDR) have no PNG representation
                color if color.has_alpha() => DynamicImage::ImageRgba8(raster.image.to_rgba8())
                    .write_with_encoder(PngEncoder::new(&mut buffer)),
                _ => DynamicImage::ImageRgb8(raster.image.to_rgb8())
                    .write_with_encoder(PngEncoder::new(&mut buffer)),
            },
            OutputEncoding::WebP => DynamicImage::ImageRgba8(raster.image.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut buffer)),
        };
        result.map_err(|e| Error::Encode(format!("{} encoding failed: {}", encoding, e)))?;

        if buffer.is_empty() {
            return Err(Error::Encode(format!(
                "{} encoder produced no output",
                encoding
            )));
        }

        Ok(buffer)
    }
}

/// Maps a 0.0-1.0 quality factor onto the encoder's 1-100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Inserts an APP1 Exif segment carrying only the Orientation tag
/// directly after the JPEG SOI marker.
#[cfg(test)]
pub(crate) fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert!(jpeg.starts_with(&[0xFF, 0xD8]));

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\x00\x00".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{
        GrayImage, ImageFormat, Rgb, Rgb32FImage, RgbImage, Rgba, Rgba32FImage, RgbaImage,
    };
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.75), 75);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.333), 33);
    }

    #[test]
    fn test_decode_reports_dimensions() {
        let codec = ImageCodec::new();
        let raster = codec.decode(&png_bytes(40, 20)).unwrap();
        assert_eq!((raster.width(), raster.height()), (40, 20));
    }

    #[test]
    fn test_decode_applies_exif_orientation() {
        let codec = ImageCodec::new();
        let bytes = jpeg_bytes(40, 20);

        let upright = codec.decode(&with_exif_orientation(&bytes, 1)).unwrap();
        assert_eq!((upright.width(), upright.height()), (40, 20));

        // 6 = rotate 90 degrees clockwise to display
        let rotated = codec.decode(&with_exif_orientation(&bytes, 6)).unwrap();
        assert_eq!((rotated.width(), rotated.height()), (20, 40));

        let rotated = codec.decode(&with_exif_orientation(&bytes, 8)).unwrap();
        assert_eq!((rotated.width(), rotated.height()), (20, 40));
    }

    #[test]
    fn test_decode_rejects_source_over_dimension_limit() {
        let codec = ImageCodec::new();
        let mut bytes = Vec::new();
        GrayImage::new(MAX_SOURCE_DIMENSION + 1, 1)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let err = codec.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(codec.live_surfaces(), 0);
    }

    #[test]
    fn test_decode_accepts_wide_source_under_limit() {
        let codec = ImageCodec::new();
        let mut bytes = Vec::new();
        GrayImage::new(20_000, 2)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let raster = codec.decode(&bytes).unwrap();
        assert_eq!((raster.width(), raster.height()), (20_000, 2));
    }

    #[test]
    fn test_png_encodes_float_rasters() {
        let codec = ImageCodec::new();

        let rgb = codec.surface(DynamicImage::ImageRgb32F(Rgb32FImage::from_pixel(
            8,
            4,
            Rgb([0.25, 0.5, 1.0]),
        )));
        let bytes = codec.encode(&rgb, 0.75, OutputEncoding::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (8, 4));

        let rgba = codec.surface(DynamicImage::ImageRgba32F(Rgba32FImage::from_pixel(
            8,
            4,
            Rgba([0.25, 0.5, 1.0, 0.5]),
        )));
        let bytes = codec.encode(&rgba, 0.75, OutputEncoding::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = ImageCodec::new();
        let err = codec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = codec.decode(&[]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let codec = ImageCodec::new();
        let bytes = png_bytes(40, 20);
        let err = codec.decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_render_and_encode_each_format() {
        let codec = ImageCodec::new();
        let raster = codec.decode(&png_bytes(40, 20)).unwrap();
        let rendered = codec.render(&raster, 20, 10).unwrap();
        assert_eq!((rendered.width(), rendered.height()), (20, 10));

        for (encoding, format) in [
            (OutputEncoding::Jpeg, ImageFormat::Jpeg),
            (OutputEncoding::Png, ImageFormat::Png),
            (OutputEncoding::WebP, ImageFormat::WebP),
        ] {
            let bytes = codec.encode(&rendered, 0.75, encoding).unwrap();
            assert_eq!(image::guess_format(&bytes).unwrap(), format);
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (20, 10));
        }
    }

    #[test]
    fn test_render_rejects_oversized_surface() {
        let codec = ImageCodec::new();
        let raster = codec.decode(&png_bytes(4, 4)).unwrap();
        let err = codec.render(&raster, 100_000, 100_000).unwrap_err();
        assert!(matches!(err, Error::Surface(_)));
        let err = codec.render(&raster, 0, 4).unwrap_err();
        assert!(matches!(err, Error::Surface(_)));
    }

    #[test]
    fn test_surfaces_are_counted_and_released() {
        let codec = ImageCodec::new();
        assert_eq!(codec.live_surfaces(), 0);
        {
            let raster = codec.decode(&png_bytes(8, 8)).unwrap();
            assert_eq!(codec.live_surfaces(), 1);
            let rendered = codec.render(&raster, 4, 4).unwrap();
            assert_eq!(codec.live_surfaces(), 2);
            drop(rendered);
            assert_eq!(codec.live_surfaces(), 1);
        }
        assert_eq!(codec.live_surfaces(), 0);

        let _ = codec.decode(b"garbage");
        assert_eq!(codec.live_surfaces(), 0);
    }

    #[test]
    fn test_lower_quality_gives_smaller_jpeg() {
        let codec = ImageCodec::new();
        let raster = codec.decode(&png_bytes(128, 128)).unwrap();
        let high = codec.encode(&raster, 1.0, OutputEncoding::Jpeg).unwrap();
        let low = codec.encode(&raster, 0.1, OutputEncoding::Jpeg).unwrap();
        assert!(low.len() < high.len());
    }
}
