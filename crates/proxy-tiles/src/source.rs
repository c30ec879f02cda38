//! Image sources and decoded bitmaps

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use sha2::{Digest, Sha256};

use crate::types::{Result, TileError};

/// Where a card image comes from
#[derive(Clone)]
pub enum SourceImage {
    /// Fetched over the network by the loader
    Remote { url: String },
    /// User supplied bytes, identified by their content hash
    Local { digest: String, bytes: Arc<[u8]> },
}

impl SourceImage {
    pub fn remote(url: impl Into<String>) -> Self {
        SourceImage::Remote { url: url.into() }
    }

    /// Wrap raw file bytes, hashing them so identical uploads share tiles
    pub fn local(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let digest = hex::encode(Sha256::digest(&bytes));
        SourceImage::Local { digest, bytes }
    }

    /// Stable identity used in cache keys: the URL or `local:<sha256>`
    pub fn identity(&self) -> String {
        match self {
            SourceImage::Remote { url } => url.clone(),
            SourceImage::Local { digest, .. } => format!("local:{}", digest),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceImage::Remote { .. })
    }
}

impl PartialEq for SourceImage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SourceImage::Remote { url: a }, SourceImage::Remote { url: b }) => a == b,
            (SourceImage::Local { digest: a, .. }, SourceImage::Local { digest: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for SourceImage {}

impl Hash for SourceImage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SourceImage::Remote { url } => {
                0u8.hash(state);
                url.hash(state);
            }
            SourceImage::Local { digest, .. } => {
                1u8.hash(state);
                digest.hash(state);
            }
        }
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceImage::Remote { url } => f.debug_struct("Remote").field("url", url).finish(),
            SourceImage::Local { digest, bytes } => f
                .debug_struct("Local")
                .field("digest", digest)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// A decoded RGBA bitmap.
///
/// Not `Clone`: handing one to the worker pool moves it, and the worker drops
/// it once the tile is encoded or the transcode fails.
pub struct DecodedImage {
    image: RgbaImage,
}

impl DecodedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decode an encoded image (PNG, JPEG, WebP), guessing the format
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| TileError::Decode(e.to_string()))?;
        Ok(Self::from(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.image
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecodedImage({}x{})", self.width(), self.height())
    }
}
