use std::time::Duration;

use proxy_layout::constants::PRINT_PIXELS_PER_MM;

/// Upper bound on worker threads regardless of core count
pub const MAX_WORKERS: usize = 8;

/// Runtime knobs for the tile pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Worker threads in the pool. Zero runs every transcode inline.
    pub workers: usize,
    /// How long a single transcode may take before it is abandoned
    pub task_timeout: Duration,
    /// Concurrency of a prefetch batch when running inline
    pub inline_batch_size: usize,
    /// Delay before progress resets after a sweep finishes
    pub progress_grace: Duration,
    /// Pause between prefetch batches so interactive work can run
    pub batch_yield: Duration,
    pub jpeg_quality: u8,
    /// Raster resolution of tiles
    pub pixels_per_mm: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            task_timeout: Duration::from_secs(30),
            inline_batch_size: 4,
            progress_grace: Duration::from_secs(2),
            batch_yield: Duration::from_millis(20),
            jpeg_quality: 85,
            pixels_per_mm: PRINT_PIXELS_PER_MM,
        }
    }
}

impl PipelineConfig {
    /// `min(available_parallelism, 8)`, at least one
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, MAX_WORKERS)
    }

    pub fn inline() -> Self {
        Self {
            workers: 0,
            ..Default::default()
        }
    }
}
