//! "PROXY" watermark stamped onto tiles.
//!
//! Drawn from a tiny built-in bitmap font so tiles render the same on every
//! machine, with no system fonts involved.

use image::RgbImage;

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
/// Horizontal advance per glyph, in font cells (glyph plus one blank column)
const ADVANCE_COLS: u32 = GLYPH_COLS + 1;

pub const MARKER_TEXT: &str = "PROXY";
/// Glyph height as a fraction of tile height
pub const MARKER_HEIGHT_RATIO: f32 = 0.025;
/// Baseline distance from the bottom edge as a fraction of tile height
pub const MARKER_BASELINE_RATIO: f32 = 0.035;
pub const MARKER_OPACITY: f32 = 0.8;

/// Rows of a glyph, most significant of the low five bits is the left column
fn glyph(c: char) -> Option<[u8; GLYPH_ROWS as usize]> {
    let rows = match c {
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        _ => return None,
    };
    Some(rows)
}

/// Stamp the marker centered horizontally near the bottom of the tile
pub fn stamp_proxy_marker(canvas: &mut RgbImage) {
    let (w, h) = (canvas.width() as f32, canvas.height() as f32);
    stamp_text(
        canvas,
        MARKER_TEXT,
        w / 2.0,
        h - h * MARKER_BASELINE_RATIO,
        h * MARKER_HEIGHT_RATIO,
        [255, 255, 255],
        MARKER_OPACITY,
    );
}

/// Blend `text` onto the canvas, centered on `center_x` with its baseline at
/// `baseline_y`. Characters without a glyph advance without drawing.
pub fn stamp_text(
    canvas: &mut RgbImage,
    text: &str,
    center_x: f32,
    baseline_y: f32,
    glyph_height: f32,
    color: [u8; 3],
    opacity: f32,
) {
    let cell = glyph_height / GLYPH_ROWS as f32;
    let chars = text.chars().count() as u32;
    if chars == 0 || cell <= 0.0 {
        return;
    }

    let total_cols = chars * ADVANCE_COLS - 1;
    let left = center_x - total_cols as f32 * cell / 2.0;
    let top = baseline_y - glyph_height;

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let glyph_left = left + (i as u32 * ADVANCE_COLS) as f32 * cell;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                    continue;
                }
                let x0 = glyph_left + col as f32 * cell;
                let y0 = top + row as f32 * cell;
                fill_cell(canvas, x0, y0, cell, color, opacity);
            }
        }
    }
}

fn fill_cell(canvas: &mut RgbImage, x0: f32, y0: f32, size: f32, color: [u8; 3], opacity: f32) {
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let px0 = (x0.round() as i64).clamp(0, w);
    let py0 = (y0.round() as i64).clamp(0, h);
    // Cover at least one pixel so tiny tiles still show the text
    let px1 = ((x0 + size).round() as i64).max(px0 + 1).clamp(0, w);
    let py1 = ((y0 + size).round() as i64).max(py0 + 1).clamp(0, h);

    for y in py0..py1 {
        for x in px0..px1 {
            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
            for (channel, &target) in pixel.0.iter_mut().zip(color.iter()) {
                let blended = *channel as f32 * (1.0 - opacity) + target as f32 * opacity;
                *channel = blended.round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_marker_lightens_bottom_center_only() {
        let mut canvas = RgbImage::from_pixel(400, 560, Rgb([0, 0, 0]));
        stamp_proxy_marker(&mut canvas);

        let lit: Vec<_> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());

        // Glyphs live between baseline - 0.025h and the baseline
        let baseline = 560.0 - 560.0 * MARKER_BASELINE_RATIO;
        let top = baseline - 560.0 * MARKER_HEIGHT_RATIO;
        for &(x, y) in &lit {
            assert!((y as f32) >= top.floor() && (y as f32) <= baseline.ceil());
            assert!(x > 150 && x < 250);
        }

        // White at 80% over black
        let (x, y) = lit[0];
        assert_eq!(canvas.get_pixel(x, y).0, [204, 204, 204]);
    }

    #[test]
    fn test_unknown_characters_are_skipped() {
        let mut canvas = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        stamp_text(&mut canvas, "??", 50.0, 90.0, 14.0, [255, 255, 255], 1.0);
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
