//! Data models and configuration
//!
//! Defines the resize parameters shared by every preprocessing call and the
//! environment-driven configuration for the storage bucket.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_WIDTH: u32 = 600;
pub const DEFAULT_MAX_HEIGHT: u32 = 600;
pub const DEFAULT_QUALITY: f32 = 0.75;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl OutputEncoding {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputEncoding::Jpeg => "image/jpeg",
            OutputEncoding::Png => "image/png",
            OutputEncoding::WebP => "image/webp",
        }
    }

    /// File extension, taken from the MIME subtype.
    pub fn extension(self) -> &'static str {
        match self {
            OutputEncoding::Jpeg => "jpeg",
            OutputEncoding::Png => "png",
            OutputEncoding::WebP => "webp",
        }
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Ok(OutputEncoding::Jpeg),
            "png" | "image/png" => Ok(OutputEncoding::Png),
            "webp" | "image/webp" => Ok(OutputEncoding::WebP),
            other => Err(Error::InvalidConfig(format!(
                "Unsupported output encoding '{}'. Expected jpeg, png or webp",
                other
            ))),
        }
    }
}

/// Immutable parameters for a single resize call.
///
/// Only built through [`ResizeConfig::new`] and the `with_*` setters, so the
/// bounds and quality are always valid. It is serialized into the run
/// manifest but never read back.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ResizeConfig {
    max_width: u32,
    max_height: u32,
    quality: f32,
    encoding: OutputEncoding,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_QUALITY,
            encoding: OutputEncoding::Jpeg,
        }
    }
}

impl ResizeConfig {
    pub fn new(
        max_width: u32,
        max_height: u32,
        quality: f32,
        encoding: OutputEncoding,
    ) -> Result<Self> {
        if max_width == 0 || max_height == 0 {
            return Err(Error::InvalidConfig(format!(
                "Bounding box must be at least 1x1, got {}x{}",
                max_width, max_height
            )));
        }
        if !quality.is_finite() || !(0.0..=1.0).contains(&quality) {
            return Err(Error::InvalidConfig(format!(
                "Quality must be between 0.0 and 1.0, got {}",
                quality
            )));
        }

        Ok(Self {
            max_width,
            max_height,
            quality,
            encoding,
        })
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    pub fn with_bounds(self, max_width: u32, max_height: u32) -> Result<Self> {
        Self::new(max_width, max_height, self.quality, self.encoding)
    }

    pub fn with_quality(self, quality: f32) -> Result<Self> {
        Self::new(self.max_width, self.max_height, quality, self.encoding)
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_access_key_id: Option<String>,
    pub storage_secret_access_key: Option<String>,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_public_base_url: String,
    pub upload_retry_attempts: usize,
    pub dry_run: bool,
    pub resize: ResizeConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup instead of the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_access_key_id = var("STORAGE_ACCESS_KEY_ID");
        let storage_secret_access_key = var("STORAGE_SECRET_ACCESS_KEY");
        let storage_endpoint = var("STORAGE_ENDPOINT")
            .unwrap_or_else(|| "https://project.supabase.co/storage/v1/s3".to_string());
        let storage_bucket = var("STORAGE_BUCKET").unwrap_or_else(|| "recipes".to_string());
        let storage_public_base_url = var("STORAGE_PUBLIC_BASE_URL").unwrap_or_else(|| {
            format!(
                "https://project.supabase.co/storage/v1/object/public/{}",
                storage_bucket
            )
        });

        let dry_run = match var("DRY_RUN") {
            Some(value) => parse_bool("DRY_RUN", &value)?,
            None => false,
        } || storage_access_key_id.is_none()
            || storage_secret_access_key.is_none();

        let upload_retry_attempts = match var("UPLOAD_RETRY_ATTEMPTS") {
            Some(value) => parse_number("UPLOAD_RETRY_ATTEMPTS", &value)?,
            None => 3,
        };

        let defaults = ResizeConfig::default();
        let max_width = match var("IMAGE_MAX_WIDTH") {
            Some(value) => parse_number("IMAGE_MAX_WIDTH", &value)?,
            None => defaults.max_width(),
        };
        let max_height = match var("IMAGE_MAX_HEIGHT") {
            Some(value) => parse_number("IMAGE_MAX_HEIGHT", &value)?,
            None => defaults.max_height(),
        };
        let quality = match var("IMAGE_QUALITY") {
            Some(value) => parse_number("IMAGE_QUALITY", &value)?,
            None => defaults.quality(),
        };
        let encoding = match var("IMAGE_FORMAT") {
            Some(value) => value.parse()?,
            None => defaults.encoding(),
        };

        Ok(Self {
            storage_access_key_id,
            storage_secret_access_key,
            storage_endpoint,
            storage_bucket,
            storage_public_base_url,
            upload_retry_attempts,
            dry_run,
            resize: ResizeConfig::new(max_width, max_height, quality, encoding)?,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} has an invalid value '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
