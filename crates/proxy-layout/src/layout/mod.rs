//! Pagination of a print queue onto card grids
//!
//! This module turns a flat list of physical copies into pages:
//! - Stable batching of entries onto front pages
//! - Duplex back pages with mirrored columns
//! - Summary statistics for a finished layout

mod paginate;
mod types;

pub use paginate::*;
pub use types::*;
