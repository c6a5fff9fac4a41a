//! Image preprocessing for upload
//!
//! Decodes an uploaded photo, clamps it into a bounding box while keeping its
//! aspect ratio, re-encodes it at a fixed quality and hands back both the
//! compressed bytes and a short-lived preview handle. The result can then be
//! pushed to an S3-compatible bucket for durable public access.

pub mod app;
pub mod cdn;
pub mod error;
pub mod image;
pub mod models;
pub mod upload;

pub use error::{Error, Result};
