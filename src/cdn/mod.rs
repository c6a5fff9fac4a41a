//! Upload sink for processed images
//!
//! Pushes encoded images to an S3-compatible bucket (Supabase Storage,
//! DigitalOcean Spaces, MinIO...) and hands back their public URL.

pub mod client;
pub mod mock;

pub use client::CdnClient;
pub use mock::MockCdnClient;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CdnService: Send + Sync {
    /// Stores `data` under `key` and returns its public URL.
    async fn upload_file(&self, key: &str, data: &[u8], content_type: &str) -> Result<String>;
}
