//! Pure geometry: tile pixel sizes, crop rectangles and page grids.
//!
//! Nothing in here touches images or documents, so every function can be
//! shared between the tile pipeline and the page layout.

use crate::types::{LayoutError, Result};

// =============================================================================
// Tile Geometry
// =============================================================================

/// Pixel size of a tile covering the card plus bleed on every side.
///
/// `(card + 2 * bleed) * scale_factor`, rounded to the nearest pixel and
/// never smaller than one pixel.
pub fn compute_target_pixel_size(
    card_width_mm: f32,
    card_height_mm: f32,
    bleed_mm: f32,
    scale_factor: f32,
) -> (u32, u32) {
    let width = ((card_width_mm + 2.0 * bleed_mm) * scale_factor).round();
    let height = ((card_height_mm + 2.0 * bleed_mm) * scale_factor).round();
    (width.max(1.0) as u32, height.max(1.0) as u32)
}

/// Source rectangle to sample, in source pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub sx: f32,
    pub sy: f32,
    pub sw: f32,
    pub sh: f32,
}

/// Center-crop a source image to the target aspect ratio (width / height).
///
/// A source wider than the target keeps its full height and loses width on
/// both sides; anything else keeps its full width and loses height.
pub fn compute_crop_rect(source_width: u32, source_height: u32, target_aspect: f32) -> CropRect {
    let src_w = source_width as f32;
    let src_h = source_height as f32;
    let source_aspect = src_w / src_h;

    if source_aspect > target_aspect {
        let sw = src_h * target_aspect;
        CropRect {
            sx: (src_w - sw) / 2.0,
            sy: 0.0,
            sw,
            sh: src_h,
        }
    } else {
        let sh = src_w / target_aspect;
        CropRect {
            sx: 0.0,
            sy: (src_h - sh) / 2.0,
            sw: src_w,
            sh,
        }
    }
}

// =============================================================================
// Page Grid
// =============================================================================

/// Card grid on one sheet of paper, in millimeters from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGrid {
    pub cols: usize,
    pub rows: usize,
    /// Left edge of the first column
    pub start_x_mm: f32,
    /// Top edge of the first row
    pub start_y_mm: f32,
    pub card_width_mm: f32,
    pub card_height_mm: f32,
    pub gap_mm: f32,
}

impl PageGrid {
    /// Number of cards that fit on one page
    pub fn capacity(&self) -> usize {
        self.cols * self.rows
    }

    /// Top-left corner of the card at (col, row)
    pub fn cell_origin(&self, col: usize, row: usize) -> (f32, f32) {
        (
            self.start_x_mm + col as f32 * (self.card_width_mm + self.gap_mm),
            self.start_y_mm + row as f32 * (self.card_height_mm + self.gap_mm),
        )
    }

    /// Column a card lands in on the back of the sheet after a long-edge flip
    pub fn mirrored_col(&self, col: usize) -> usize {
        self.cols - 1 - col
    }
}

/// Compute the centered card grid for a sheet of paper.
///
/// `cols = floor((paper_w - 2 * margin) / (card_w + gap))`, rows likewise,
/// each clamped to at least one. Cards that cannot physically fit on the
/// paper are a structural error rather than a clamped grid.
pub fn compute_page_grid(
    paper_width_mm: f32,
    paper_height_mm: f32,
    card_width_mm: f32,
    card_height_mm: f32,
    gap_mm: f32,
    margin_mm: f32,
) -> Result<PageGrid> {
    if card_width_mm.is_nan()
        || card_height_mm.is_nan()
        || card_width_mm <= 0.0
        || card_height_mm <= 0.0
    {
        return Err(LayoutError::Config(format!(
            "Card dimensions must be positive, got {}x{}mm",
            card_width_mm, card_height_mm
        )));
    }
    if gap_mm < 0.0 {
        return Err(LayoutError::Config("Gap cannot be negative".to_string()));
    }
    if card_width_mm > paper_width_mm || card_height_mm > paper_height_mm {
        return Err(LayoutError::CardExceedsPaper {
            card_width_mm,
            card_height_mm,
            paper_width_mm,
            paper_height_mm,
        });
    }

    let cols = fit_count(paper_width_mm - 2.0 * margin_mm, card_width_mm + gap_mm);
    let rows = fit_count(paper_height_mm - 2.0 * margin_mm, card_height_mm + gap_mm);

    let grid_width = cols as f32 * card_width_mm + (cols - 1) as f32 * gap_mm;
    let grid_height = rows as f32 * card_height_mm + (rows - 1) as f32 * gap_mm;

    Ok(PageGrid {
        cols,
        rows,
        start_x_mm: (paper_width_mm - grid_width) / 2.0,
        start_y_mm: (paper_height_mm - grid_height) / 2.0,
        card_width_mm,
        card_height_mm,
        gap_mm,
    })
}

fn fit_count(available_mm: f32, pitch_mm: f32) -> usize {
    let count = (available_mm / pitch_mm).floor();
    if count.is_finite() && count >= 1.0 {
        count as usize
    } else {
        1
    }
}

// =============================================================================
// Tests
// =============================================================================
