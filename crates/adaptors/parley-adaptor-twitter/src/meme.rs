//! Meme images: generate, download and re-encode for upload

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use parley_core::{ParleyError, Result};
use serde::Deserialize;
use tracing::debug;

/// Largest width of an uploaded image
pub const MAX_WIDTH: u32 = 1200;
/// Largest height of an uploaded image
pub const MAX_HEIGHT: u32 = 675;
/// JPEG quality of uploaded images
pub const JPEG_QUALITY: u8 = 80;

const GLIF_ENDPOINT: &str = "https://simple-api.glif.app";
const GLIF_MEME_ID: &str = "clxtc53mi0000ghv10g6irjqj";

/// Turns a meme concept into upload-ready JPEG bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemeGenerator: Send + Sync {
    /// Generate an image for `concept`
    async fn generate(&self, concept: &str) -> Result<Bytes>;
}

#[derive(Deserialize)]
struct GlifResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// [`MemeGenerator`] backed by the Glif simple API
pub struct GlifMemeGenerator {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    glif_id: String,
}

impl GlifMemeGenerator {
    /// Generator authenticated with `api_key`
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: GLIF_ENDPOINT.to_string(),
            glif_id: GLIF_MEME_ID.to_string(),
        }
    }

    /// Use another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn image_url(&self, concept: &str) -> Result<String> {
        let response: GlifResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "id": self.glif_id, "inputs": [concept] }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            return Err(ParleyError::generation(format!("image generation failed: {}", error)));
        }
        response
            .output
            .map(|url| url.replace(['<', '>'], "").trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ParleyError::generation("image generation returned no URL"))
    }
}

#[async_trait]
impl MemeGenerator for GlifMemeGenerator {
    async fn generate(&self, concept: &str) -> Result<Bytes> {
        let url = self.image_url(concept).await?;
        debug!(%url, "Downloading generated image");
        let raw = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        prepare_image(&raw)
    }
}

/// Fit an image inside 1200x675 without enlarging it and re-encode it as
/// JPEG
pub fn prepare_image(raw: &[u8]) -> Result<Bytes> {
    let mut img = image::load_from_memory(raw)
        .map_err(|e| ParleyError::other(format!("unreadable image: {}", e)))?;
    if img.width() > MAX_WIDTH || img.height() > MAX_HEIGHT {
        img = img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ParleyError::other(format!("jpeg encoding failed: {}", e)))?;
    debug!(width = rgb.width(), height = rgb.height(), bytes = out.len(), "Prepared meme image");
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn dimensions(jpeg: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_large_image_is_shrunk_to_fit() {
        let out = prepare_image(&png(2400, 2400)).unwrap();
        assert_eq!(dimensions(&out), (675, 675));
    }

    #[test]
    fn test_wide_image_keeps_aspect_ratio() {
        let out = prepare_image(&png(2400, 1350)).unwrap();
        assert_eq!(dimensions(&out), (1200, 675));
    }

    #[test]
    fn test_small_image_is_not_enlarged() {
        let out = prepare_image(&png(320, 200)).unwrap();
        assert_eq!(dimensions(&out), (320, 200));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(prepare_image(b"definitely not an image").is_err());
    }
}
