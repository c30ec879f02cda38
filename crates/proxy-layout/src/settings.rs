use crate::constants::{DEFAULT_FOOTER_TEXT, DEFAULT_MARGIN_MM};
use crate::types::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Everything that controls how a deck is printed
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PrintSettings {
    // Paper
    pub paper_size: PaperSize,
    pub margin_mm: f32,

    // Card geometry
    pub card_preset: CardPreset,
    pub card_width_mm: f32,
    pub card_height_mm: f32,
    pub card_scale_percent: f32,
    pub gap_mm: f32,
    pub bleed_mm: f32,

    // Appearance
    pub cut_marks: CutMarkStyle,
    pub background: PageBackground,
    pub proxy_marker: bool,
    pub footer_text: Option<String>,

    // Backs
    pub duplex: bool,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            margin_mm: DEFAULT_MARGIN_MM,
            card_preset: CardPreset::Standard,
            card_width_mm: 63.0,
            card_height_mm: 88.0,
            card_scale_percent: 100.0,
            gap_mm: 0.0,
            bleed_mm: 0.0,
            cut_marks: CutMarkStyle::Lines,
            background: PageBackground::White,
            proxy_marker: false,
            footer_text: Some(DEFAULT_FOOTER_TEXT.to_string()),
            duplex: false,
        }
    }
}

impl PrintSettings {
    /// Load settings from JSON file
    #[cfg(feature = "serde")]
    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let mut settings: PrintSettings = serde_json::from_slice(&bytes)
            .map_err(|e| LayoutError::Config(format!("Failed to parse settings: {}", e)))?;
        settings.apply_preset();
        Ok(settings)
    }

    /// Save settings to JSON file
    #[cfg(feature = "serde")]
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LayoutError::Config(format!("Failed to serialize settings: {}", e)))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Switch to a preset, overwriting the card dimensions unless it is `Custom`
    pub fn with_preset(mut self, preset: CardPreset) -> Self {
        self.card_preset = preset;
        self.apply_preset();
        self
    }

    /// Re-sync card dimensions with the selected preset
    pub fn apply_preset(&mut self) {
        if let Some((width, height)) = self.card_preset.dimensions_mm() {
            self.card_width_mm = width;
            self.card_height_mm = height;
        }
    }

    /// Card size after applying the scale percentage
    pub fn effective_card_size(&self) -> (f32, f32) {
        let scale = self.card_scale_percent / 100.0;
        (self.card_width_mm * scale, self.card_height_mm * scale)
    }

    pub fn page_dimensions(&self) -> (f32, f32) {
        self.paper_size.dimensions_mm()
    }

    /// Whether a transition from `old` to `self` invalidates rendered tiles.
    ///
    /// Only fields that change the pixels of a tile count; paper size, gap,
    /// cut marks, footer and duplex only move tiles around.
    pub fn tile_settings_changed(&self, old: &PrintSettings) -> bool {
        self.card_preset != old.card_preset
            || self.card_width_mm != old.card_width_mm
            || self.card_height_mm != old.card_height_mm
            || self.card_scale_percent != old.card_scale_percent
            || self.bleed_mm != old.bleed_mm
            || self.background != old.background
            || self.proxy_marker != old.proxy_marker
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.card_scale_percent.is_nan() || self.card_scale_percent <= 0.0 {
            return Err(LayoutError::Config(
                "Card scale must be greater than zero".to_string(),
            ));
        }

        let (card_w, card_h) = self.effective_card_size();
        if card_w.is_nan() || card_h.is_nan() || card_w <= 0.0 || card_h <= 0.0 {
            return Err(LayoutError::Config(format!(
                "Card dimensions must be positive, got {}x{}mm",
                card_w, card_h
            )));
        }

        if self.gap_mm < 0.0 || self.bleed_mm < 0.0 || self.margin_mm < 0.0 {
            return Err(LayoutError::Config(
                "Gap, bleed and margin cannot be negative".to_string(),
            ));
        }

        let (paper_w, paper_h) = self.page_dimensions();
        if card_w > paper_w || card_h > paper_h {
            return Err(LayoutError::CardExceedsPaper {
                card_width_mm: card_w,
                card_height_mm: card_h,
                paper_width_mm: paper_w,
                paper_height_mm: paper_h,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_card_size_applies_scale() {
        let settings = PrintSettings {
            card_scale_percent: 50.0,
            ..Default::default()
        };
        assert_eq!(settings.effective_card_size(), (31.5, 44.0));
    }

    #[test]
    fn test_with_preset_overrides_dimensions() {
        let settings = PrintSettings::default().with_preset(CardPreset::Yugioh);
        assert_eq!(settings.card_width_mm, 59.0);
        assert_eq!(settings.card_height_mm, 86.0);

        let mut custom = PrintSettings {
            card_width_mm: 50.0,
            card_height_mm: 70.0,
            ..Default::default()
        }
        .with_preset(CardPreset::Custom);
        custom.apply_preset();
        assert_eq!(custom.card_width_mm, 50.0);
        assert_eq!(custom.card_height_mm, 70.0);
    }

    #[test]
    fn test_tile_settings_changed() {
        let base = PrintSettings::default();

        let moved_only = PrintSettings {
            gap_mm: 2.0,
            paper_size: PaperSize::Letter,
            cut_marks: CutMarkStyle::Crosshairs,
            duplex: true,
            footer_text: None,
            ..base.clone()
        };
        assert!(!moved_only.tile_settings_changed(&base));

        let bleed = PrintSettings {
            bleed_mm: 1.0,
            ..base.clone()
        };
        assert!(bleed.tile_settings_changed(&base));

        let marker = PrintSettings {
            proxy_marker: true,
            ..base.clone()
        };
        assert!(marker.tile_settings_changed(&base));

        let scale = PrintSettings {
            card_scale_percent: 95.0,
            ..base.clone()
        };
        assert!(scale.tile_settings_changed(&base));
    }

    #[test]
    fn test_validate_rejects_card_larger_than_paper() {
        let settings = PrintSettings {
            card_preset: CardPreset::Custom,
            card_width_mm: 400.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LayoutError::CardExceedsPaper { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_negative_values() {
        let settings = PrintSettings {
            gap_mm: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = PrintSettings {
            card_scale_percent: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
