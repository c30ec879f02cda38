//! Tile pipeline for print-ready card proxies.
//!
//! Source images are cropped, scaled, optionally watermarked and encoded to
//! JPEG tiles on a worker pool, cached durably under deterministic keys and
//! assembled into paginated documents.

pub mod assemble;
pub mod config;
pub mod key;
pub mod loader;
pub mod lookup;
pub mod marker;
pub mod pdf;
pub mod pool;
pub mod prefetch;
pub mod source;
pub mod store;
pub mod transcode;
mod types;

pub use assemble::{
    AssembledDocument, AssembledPage, AssembledSlot, AssemblyProgress, PageAssembler,
    SlotContent, SlotFailure,
};
pub use config::PipelineConfig;
pub use key::CacheKey;
pub use loader::{DefaultLoader, SourceLoader};
pub use lookup::{Lookup, LookupCache};
pub use pdf::{render_pdf_bytes, write_pdf};
pub use pool::{TileProcessor, WorkerPool};
pub use prefetch::{
    PrefetchEvent, PrefetchProgress, PrefetchScheduler, PrefetchState, SweepItemOutcome,
    SweepReport, collect_sources,
};
pub use source::{DecodedImage, SourceImage};
pub use store::{LmdbTileStore, MemoryTileStore, TileStore, format_size, put_or_log};
pub use transcode::{JpegTranscoder, Surface, TileParams, Transcode};
pub use types::*;
