use std::path::PathBuf;

mod session;

pub use session::{PrintSession, session_task};

// Re-export types from library crates
pub use proxy_layout::{DeckCard, PrintEntry, PrintSettings};
pub use proxy_tiles::{SlotFailure, SourceImage, SweepReport};

/// Commands sent from a front end to the session
#[derive(Debug)]
pub enum PrintCommand {
    DeckChanged {
        deck: Vec<DeckCard<SourceImage>>,
    },
    /// Consecutive queued changes collapse into the newest one
    SettingsChanged {
        settings: PrintSettings,
    },
    Generate {
        output_path: PathBuf,
    },
    EstimateCacheSize,
    ClearCache,
}

/// Updates sent from the session back to the front end
#[derive(Debug, Clone, PartialEq)]
pub enum PrintUpdate {
    Progress {
        operation: String,
        current: usize,
        total: usize,
    },
    Generated {
        path: PathBuf,
        pages: usize,
        failures: Vec<SlotFailure>,
    },
    CacheSize {
        bytes: u64,
    },
    CacheCleared,
    Error {
        message: String,
    },
}

pub const OPERATION_PREFETCH: &str = "prefetch";
pub const OPERATION_GENERATE: &str = "generate";
