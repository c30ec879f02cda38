#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use proxy_layout::PrintEntry;
use proxy_tiles::*;

/// PNG bytes of a solid-color image
pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(width, height, Rgba(rgba))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A distinct local source per `seed`
pub fn local_source(seed: u8) -> SourceImage {
    SourceImage::local(png(6, 8, [seed, 255 - seed, 128, 255]))
}

pub fn entry(front: SourceImage, back: Option<SourceImage>, name: &str) -> PrintEntry<SourceImage> {
    PrintEntry {
        front,
        back,
        name: name.to_string(),
    }
}

/// Small tiles keep the tests quick
pub fn test_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        pixels_per_mm: 2.0,
        batch_yield: Duration::from_millis(1),
        progress_grace: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Counts transcodes and optionally sleeps first
pub struct CountingTranscoder {
    pub calls: AtomicUsize,
    pub delay: Duration,
    /// Only sleep when running on a pool worker thread
    pub delay_on_workers_only: bool,
}

impl CountingTranscoder {
    pub fn new() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            delay_on_workers_only: false,
        })
    }

    pub fn slow_on_workers(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            delay_on_workers_only: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcode for CountingTranscoder {
    fn transcode(
        &self,
        surface: &mut Surface,
        bitmap: DecodedImage,
        params: &TileParams,
    ) -> Result<Tile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let on_worker = std::thread::current()
            .name()
            .is_some_and(|n| n.starts_with("proxy-tile-worker"));
        if !self.delay.is_zero() && (on_worker || !self.delay_on_workers_only) {
            std::thread::sleep(self.delay);
        }
        JpegTranscoder.transcode(surface, bitmap, params)
    }
}

/// Memory store that remembers every key written
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryTileStore,
    pub puts: Mutex<Vec<String>>,
    pub put_delay: Duration,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow_puts(put_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            put_delay,
            ..Self::default()
        })
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.inner.get_batch(keys).await
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        self.puts.lock().unwrap().push(key.to_string());
        self.inner.put(key, blob).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn estimate_size_bytes(&self) -> Result<u64> {
        self.inner.estimate_size_bytes().await
    }
}
