//! Shared constants for card layout and print rendering
//!
//! This module centralizes magic numbers used by the geometry, pagination
//! and document rendering code.

// =============================================================================
// Unit Conversion
// =============================================================================

/// Points per millimeter (1 inch = 72 points, 1 inch = 25.4mm)
pub const POINTS_PER_MM: f32 = 72.0 / 25.4; // ≈ 2.83465

/// Convert millimeters to points
#[inline]
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * POINTS_PER_MM
}

// =============================================================================
// Raster Resolution
// =============================================================================

/// Pixels per millimeter for print tiles (12 px/mm ≈ 300 DPI)
pub const PRINT_PIXELS_PER_MM: f32 = 12.0;

// =============================================================================
// Page Layout
// =============================================================================

/// Default printer-safe margin on every side of the paper
pub const DEFAULT_MARGIN_MM: f32 = 5.0;

/// Footer baseline distance from the bottom paper edge
pub const FOOTER_OFFSET_BOTTOM_MM: f32 = 5.0;

/// Footer distance from the left paper edge
pub const FOOTER_OFFSET_LEFT_MM: f32 = 10.0;

/// Footer font size (points)
pub const FOOTER_FONT_SIZE: f32 = 8.0;

/// Footer printed on every non-empty page unless overridden
pub const DEFAULT_FOOTER_TEXT: &str =
    "Images via Scryfall. Proxy tool for personal playtesting only.";

// =============================================================================
// Cut Guides
// =============================================================================

/// Stroke width of cut guides
pub const CUT_GUIDE_WIDTH_MM: f32 = 0.1;

/// Length of each arm of a crosshair corner mark
pub const CROSSHAIR_LENGTH_MM: f32 = 3.0;

/// Dash and gap length for dotted guides
pub const DOTTED_DASH_MM: f32 = 1.0;

// =============================================================================
// Error Placeholders
// =============================================================================

/// Border width of the placeholder drawn for a failed slot
pub const PLACEHOLDER_BORDER_WIDTH_MM: f32 = 0.5;

/// Font size of placeholder text (points)
pub const PLACEHOLDER_FONT_SIZE: f32 = 10.0;

/// Maximum characters of the card name shown on a placeholder
pub const PLACEHOLDER_NAME_CHARS: usize = 15;
