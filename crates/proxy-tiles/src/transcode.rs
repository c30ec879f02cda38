//! Crop, scale, stamp and encode a decoded image into a print tile

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use proxy_layout::{PageBackground, PrintSettings, compute_crop_rect, compute_target_pixel_size};

use crate::config::PipelineConfig;
use crate::key::CacheKey;
use crate::marker::stamp_proxy_marker;
use crate::source::{DecodedImage, SourceImage};
use crate::types::{Result, Tile, TileError};

/// Everything that determines the pixels of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileParams {
    /// Card width after scaling
    pub card_width_mm: f32,
    /// Card height after scaling
    pub card_height_mm: f32,
    pub bleed_mm: f32,
    pub background: PageBackground,
    pub marker: bool,
    pub pixels_per_mm: f32,
    pub jpeg_quality: u8,
}

impl TileParams {
    pub fn from_settings(settings: &PrintSettings, config: &PipelineConfig) -> Self {
        let (card_width_mm, card_height_mm) = settings.effective_card_size();
        Self {
            card_width_mm,
            card_height_mm,
            bleed_mm: settings.bleed_mm,
            background: settings.background,
            marker: settings.proxy_marker,
            pixels_per_mm: config.pixels_per_mm,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Pixel size of the tile including bleed
    pub fn target_size(&self) -> (u32, u32) {
        compute_target_pixel_size(
            self.card_width_mm,
            self.card_height_mm,
            self.bleed_mm,
            self.pixels_per_mm,
        )
    }

    pub fn key_for(&self, source: &SourceImage) -> CacheKey {
        CacheKey::new(source, self)
    }
}

/// Reusable raster owned by one worker
#[derive(Debug, Default)]
pub struct Surface {
    canvas: RgbImage,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize if needed and flood with the background color
    pub fn prepare(&mut self, width: u32, height: u32, background: PageBackground) -> &mut RgbImage {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbImage::new(width, height);
        }
        let fill = Rgb(background.rgb());
        for pixel in self.canvas.pixels_mut() {
            *pixel = fill;
        }
        &mut self.canvas
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }
}

/// Turns one decoded bitmap into one tile.
///
/// The bitmap is consumed whether or not the transcode succeeds.
pub trait Transcode: Send + Sync {
    fn transcode(
        &self,
        surface: &mut Surface,
        bitmap: DecodedImage,
        params: &TileParams,
    ) -> Result<Tile>;
}

/// Background fill, center crop, scale, optional marker, JPEG
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegTranscoder;

impl Transcode for JpegTranscoder {
    fn transcode(
        &self,
        surface: &mut Surface,
        bitmap: DecodedImage,
        params: &TileParams,
    ) -> Result<Tile> {
        let (width, height) = params.target_size();
        let source = bitmap.into_rgba();
        if source.width() == 0 || source.height() == 0 {
            return Err(TileError::Decode("Source image is empty".to_string()));
        }

        // Crop to the card's aspect ratio, then stretch over card + bleed
        let crop = compute_crop_rect(
            source.width(),
            source.height(),
            params.card_width_mm / params.card_height_mm,
        );
        let sx = (crop.sx.round() as u32).min(source.width() - 1);
        let sy = (crop.sy.round() as u32).min(source.height() - 1);
        let sw = (crop.sw.round() as u32).clamp(1, source.width() - sx);
        let sh = (crop.sh.round() as u32).clamp(1, source.height() - sy);

        let cropped = imageops::crop_imm(&source, sx, sy, sw, sh).to_image();
        let scaled = imageops::resize(&cropped, width, height, FilterType::CatmullRom);
        drop(source);

        let canvas = surface.prepare(width, height, params.background);
        for (dst, src) in canvas.pixels_mut().zip(scaled.pixels()) {
            let alpha = src.0[3] as f32 / 255.0;
            for c in 0..3 {
                let blended = src.0[c] as f32 * alpha + dst.0[c] as f32 * (1.0 - alpha);
                dst.0[c] = blended.round() as u8;
            }
        }

        if params.marker {
            stamp_proxy_marker(canvas);
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, params.jpeg_quality)
            .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| TileError::Encode(e.to_string()))?;

        Ok(Tile {
            width,
            height,
            jpeg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn params() -> TileParams {
        TileParams {
            card_width_mm: 20.0,
            card_height_mm: 30.0,
            bleed_mm: 0.0,
            background: PageBackground::White,
            marker: false,
            pixels_per_mm: 4.0,
            jpeg_quality: 85,
        }
    }

    fn decode_tile(tile: &Tile) -> RgbImage {
        image::load_from_memory(&tile.jpeg).unwrap().to_rgb8()
    }

    #[test]
    fn test_tile_has_target_size() {
        let bitmap = DecodedImage::new(RgbaImage::from_pixel(300, 300, Rgba([200, 10, 10, 255])));
        let tile = JpegTranscoder
            .transcode(&mut Surface::new(), bitmap, &params())
            .unwrap();

        assert_eq!((tile.width, tile.height), (80, 120));
        let decoded = decode_tile(&tile);
        assert_eq!(decoded.dimensions(), (80, 120));
        let center = decoded.get_pixel(40, 60).0;
        assert!(center[0] > 150 && center[1] < 60);
    }

    #[test]
    fn test_bleed_enlarges_tile() {
        let bitmap = DecodedImage::new(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let params = TileParams {
            bleed_mm: 2.5,
            ..params()
        };
        let tile = JpegTranscoder
            .transcode(&mut Surface::new(), bitmap, &params)
            .unwrap();
        assert_eq!((tile.width, tile.height), (100, 140));
    }

    #[test]
    fn test_transparent_source_shows_background() {
        let bitmap = DecodedImage::new(RgbaImage::from_pixel(40, 60, Rgba([0, 0, 0, 0])));
        let params = TileParams {
            background: PageBackground::Custom { r: 0, g: 0, b: 255 },
            ..params()
        };
        let tile = JpegTranscoder
            .transcode(&mut Surface::new(), bitmap, &params)
            .unwrap();

        let pixel = decode_tile(&tile).get_pixel(40, 60).0;
        assert!(pixel[2] > 200 && pixel[0] < 50);
    }

    #[test]
    fn test_surface_is_reused_between_sizes() {
        let mut surface = Surface::new();
        let small = DecodedImage::new(RgbaImage::new(5, 5));
        JpegTranscoder.transcode(&mut surface, small, &params()).unwrap();
        assert_eq!(surface.dimensions(), (80, 120));

        let bigger = TileParams {
            pixels_per_mm: 8.0,
            ..params()
        };
        let bitmap = DecodedImage::new(RgbaImage::new(5, 5));
        JpegTranscoder.transcode(&mut surface, bitmap, &bigger).unwrap();
        assert_eq!(surface.dimensions(), (160, 240));
    }

    #[test]
    fn test_empty_source_is_a_decode_error() {
        let bitmap = DecodedImage::new(RgbaImage::new(0, 0));
        let result = JpegTranscoder.transcode(&mut Surface::new(), bitmap, &params());
        assert!(matches!(result, Err(TileError::Decode(_))));
    }

    #[test]
    fn test_from_settings_uses_scaled_card() {
        let settings = PrintSettings {
            card_scale_percent: 50.0,
            bleed_mm: 1.0,
            proxy_marker: true,
            ..Default::default()
        };
        let params = TileParams::from_settings(&settings, &PipelineConfig::default());
        assert_eq!(params.card_width_mm, 31.5);
        assert_eq!(params.card_height_mm, 44.0);
        assert!(params.marker);
        // (31.5 + 2) * 12 = 402, (44 + 2) * 12 = 552
        assert_eq!(params.target_size(), (402, 552));
    }
}
