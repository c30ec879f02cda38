//! Cut guide geometry
//!
//! Guides are produced as plain line segments in millimeters (top-left
//! origin) so any backend can stroke them. Only occupied slots get guides.

use crate::constants::CROSSHAIR_LENGTH_MM;
use crate::types::CutMarkStyle;

/// One stroke of a cut guide
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Stroke with a dash pattern instead of a solid line
    pub dashed: bool,
}

impl GuideSegment {
    fn new(x1: f32, y1: f32, x2: f32, y2: f32, dashed: bool) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            dashed,
        }
    }
}

/// Guide segments for a card at (x, y) of size w by h.
///
/// Lines and dotted guides trace the card rectangle. Crosshairs are L marks
/// at each corner pushed outwards by half the gap, so they sit in the gutter
/// between neighbouring cards.
pub fn cut_guides(
    style: CutMarkStyle,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    gap: f32,
) -> Vec<GuideSegment> {
    match style {
        CutMarkStyle::None => Vec::new(),
        CutMarkStyle::Lines | CutMarkStyle::Dotted => {
            let dashed = style == CutMarkStyle::Dotted;
            vec![
                GuideSegment::new(x, y, x + w, y, dashed),
                GuideSegment::new(x + w, y, x + w, y + h, dashed),
                GuideSegment::new(x + w, y + h, x, y + h, dashed),
                GuideSegment::new(x, y + h, x, y, dashed),
            ]
        }
        CutMarkStyle::Crosshairs => {
            let len = CROSSHAIR_LENGTH_MM;
            let off = gap / 2.0;
            vec![
                // Top left
                GuideSegment::new(x - off, y, x - off - len, y, false),
                GuideSegment::new(x, y - off, x, y - off - len, false),
                // Top right
                GuideSegment::new(x + w + off, y, x + w + off + len, y, false),
                GuideSegment::new(x + w, y - off, x + w, y - off - len, false),
                // Bottom left
                GuideSegment::new(x - off, y + h, x - off - len, y + h, false),
                GuideSegment::new(x, y + h + off, x, y + h + off + len, false),
                // Bottom right
                GuideSegment::new(x + w + off, y + h, x + w + off + len, y + h, false),
                GuideSegment::new(x + w, y + h + off, x + w, y + h + off + len, false),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_draws_nothing() {
        assert!(cut_guides(CutMarkStyle::None, 0.0, 0.0, 63.0, 88.0, 0.0).is_empty());
    }

    #[test]
    fn test_lines_trace_rectangle() {
        let segs = cut_guides(CutMarkStyle::Lines, 10.0, 20.0, 63.0, 88.0, 0.0);
        assert_eq!(segs.len(), 4);
        assert!(segs.iter().all(|s| !s.dashed));
        assert_eq!(segs[0], GuideSegment::new(10.0, 20.0, 73.0, 20.0, false));
        assert_eq!(segs[2].y1, 108.0);
    }

    #[test]
    fn test_dotted_is_dashed() {
        let segs = cut_guides(CutMarkStyle::Dotted, 0.0, 0.0, 10.0, 10.0, 0.0);
        assert_eq!(segs.len(), 4);
        assert!(segs.iter().all(|s| s.dashed));
    }

    #[test]
    fn test_crosshairs_offset_by_half_gap() {
        let segs = cut_guides(CutMarkStyle::Crosshairs, 10.0, 10.0, 63.0, 88.0, 2.0);
        assert_eq!(segs.len(), 8);
        // Top-left horizontal arm starts 1mm left of the card edge, 3mm long
        assert_eq!(segs[0], GuideSegment::new(9.0, 10.0, 6.0, 10.0, false));
        // Bottom-right vertical arm hangs below the card
        assert_eq!(segs[7], GuideSegment::new(73.0, 99.0, 73.0, 102.0, false));
    }
}
