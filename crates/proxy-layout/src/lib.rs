pub mod constants;
pub mod geometry;
pub mod layout;
pub mod marks;
mod settings;
mod types;

pub use geometry::{
    CropRect, PageGrid, compute_crop_rect, compute_page_grid, compute_target_pixel_size,
};
pub use layout::*;
pub use marks::{GuideSegment, cut_guides};
pub use settings::*;
pub use types::*;
