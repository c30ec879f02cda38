//! Deterministic cache keys for rendered tiles

use std::fmt;

use crate::source::SourceImage;
use crate::transcode::TileParams;

/// Key of a rendered tile in the store.
///
/// Format: `{source}_{card_w}x{card_h}@{px_per_mm}q{quality}_{bleed}_{background}_{marker}`.
/// Floats use Rust's shortest round-trip formatting and background ids
/// never contain `_`, so reading the fixed-shape suffix from the right
/// recovers every field even when the source identity contains `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source: &SourceImage, params: &TileParams) -> Self {
        CacheKey(format!(
            "{}_{}x{}@{}q{}_{}_{}_{}",
            source.identity(),
            params.card_width_mm,
            params.card_height_mm,
            params.pixels_per_mm,
            params.jpeg_quality,
            params.bleed_mm,
            params.background.id(),
            params.marker
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_layout::PageBackground;

    fn params() -> TileParams {
        TileParams {
            card_width_mm: 63.0,
            card_height_mm: 88.0,
            bleed_mm: 0.0,
            background: PageBackground::White,
            marker: false,
            pixels_per_mm: 12.0,
            jpeg_quality: 85,
        }
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::new(&SourceImage::remote("https://a/b_c.jpg"), &params());
        assert_eq!(key.as_str(), "https://a/b_c.jpg_63x88@12q85_0_white_false");
    }

    #[test]
    fn test_key_is_deterministic() {
        let src = SourceImage::local(vec![1, 2, 3]);
        assert_eq!(CacheKey::new(&src, &params()), CacheKey::new(&src, &params()));
    }

    #[test]
    fn test_key_changes_with_every_visual_field() {
        let src = SourceImage::remote("https://a/b.jpg");
        let base = CacheKey::new(&src, &params());

        let variants = [
            TileParams {
                card_width_mm: 62.0,
                ..params()
            },
            TileParams {
                card_height_mm: 87.5,
                ..params()
            },
            TileParams {
                bleed_mm: 0.5,
                ..params()
            },
            TileParams {
                background: PageBackground::Black,
                ..params()
            },
            TileParams {
                marker: true,
                ..params()
            },
            TileParams {
                pixels_per_mm: 2.0,
                ..params()
            },
            TileParams {
                jpeg_quality: 95,
                ..params()
            },
        ];

        let mut seen = std::collections::HashSet::new();
        seen.insert(base.clone());
        for variant in &variants {
            assert!(seen.insert(CacheKey::new(&src, variant)));
        }
        assert_ne!(CacheKey::new(&SourceImage::remote("https://a/c.jpg"), &params()), base);
    }

    #[test]
    fn test_fractional_values_do_not_collide() {
        // 1.5 bleed vs 1 bleed with a 5 in the next field must stay distinct
        let src = SourceImage::remote("u");
        let a = CacheKey::new(
            &src,
            &TileParams {
                bleed_mm: 1.5,
                ..params()
            },
        );
        let b = CacheKey::new(
            &src,
            &TileParams {
                bleed_mm: 1.0,
                ..params()
            },
        );
        assert_ne!(a, b);
        assert!(a.as_str().contains("_1.5_"));
    }
}
