use std::io::Cursor;
use std::time::Duration;

use proxy_layout::LayoutError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TileError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode tile: {0}")]
    Encode(String),
    #[error("Cache write failed: {0}")]
    CacheWrite(String),
    #[error("Cache read failed: {0}")]
    CacheRead(String),
    #[error("Worker did not respond within {0:?}")]
    WorkerTimeout(Duration),
    #[error("Worker crashed: {0}")]
    WorkerCrash(String),
    #[error("Worker pool has been shut down")]
    PoolDestroyed,
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, TileError>;

/// An encoded print tile: JPEG bytes covering card plus bleed
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

impl Tile {
    /// Wrap a cached blob, reading its pixel size from the JPEG header
    pub fn from_jpeg(jpeg: Vec<u8>) -> Result<Self> {
        let (width, height) = image::ImageReader::with_format(
            Cursor::new(jpeg.as_slice()),
            image::ImageFormat::Jpeg,
        )
        .into_dimensions()
        .map_err(|e| TileError::Decode(format!("Cached tile is not a JPEG: {}", e)))?;

        Ok(Self {
            width,
            height,
            jpeg,
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}
