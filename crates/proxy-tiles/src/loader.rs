//! Turning a [`SourceImage`] into a decoded bitmap

use async_trait::async_trait;

use crate::source::{DecodedImage, SourceImage};
use crate::types::{Result, TileError};

#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, source: &SourceImage) -> Result<DecodedImage>;
}

/// Decodes local bytes and, with the `http` feature, fetches remote URLs
#[derive(Clone, Default)]
pub struct DefaultLoader {
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl DefaultLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "http")]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match self.fetch_once(url).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // A stale intermediary cache is the usual culprit; bust it once
                log::warn!("Retrying {} with a cache-busting parameter: {}", url, e);
                self.fetch_once(&cache_busted(url)).await
            }
        }
    }

    #[cfg(feature = "http")]
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TileError::Decode(format!("Failed to fetch {}: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TileError::Decode(format!("Failed to read {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "http"))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(TileError::Decode(format!(
            "Cannot fetch {} without the `http` feature",
            url
        )))
    }
}

#[async_trait]
impl SourceLoader for DefaultLoader {
    async fn load(&self, source: &SourceImage) -> Result<DecodedImage> {
        match source {
            SourceImage::Local { bytes, .. } => {
                let bytes = bytes.clone();
                tokio::task::spawn_blocking(move || DecodedImage::decode(&bytes)).await?
            }
            SourceImage::Remote { url } => {
                let bytes = self.fetch(url).await?;
                tokio::task::spawn_blocking(move || DecodedImage::decode(&bytes)).await?
            }
        }
    }
}

/// Append `t=<unix millis>` to a URL
pub fn cache_busted(url: &str) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, sep, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn test_cache_busted_separator() {
        assert!(cache_busted("https://a/b.jpg").starts_with("https://a/b.jpg?t="));
        assert!(cache_busted("https://a/b.jpg?v=1").starts_with("https://a/b.jpg?v=1&t="));
    }

    #[tokio::test]
    async fn test_default_loader_decodes_local_png() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let decoded = DefaultLoader::new()
            .load(&SourceImage::local(png))
            .await
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[tokio::test]
    async fn test_default_loader_reports_corrupt_local_bytes() {
        let result = DefaultLoader::new()
            .load(&SourceImage::local(b"garbage".to_vec()))
            .await;
        assert!(matches!(result, Err(TileError::Decode(_))));
    }
}
