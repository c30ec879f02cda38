use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(
        "Card {card_width_mm}x{card_height_mm}mm does not fit on {paper_width_mm}x{paper_height_mm}mm paper"
    )]
    CardExceedsPaper {
        card_width_mm: f32,
        card_height_mm: f32,
        paper_width_mm: f32,
        paper_height_mm: f32,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Standard paper sizes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaperSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom { width_mm: f32, height_mm: f32 },
}

impl PaperSize {
    /// Portrait dimensions (width, height) in millimeters
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            PaperSize::A3 => (297.0, 420.0),
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::Legal => (215.9, 355.6),
            PaperSize::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        }
    }
}

/// Card size presets for common games
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CardPreset {
    /// Magic / Pokemon, 63x88mm
    #[default]
    Standard,
    /// Japanese size (Yu-Gi-Oh), 59x86mm
    Yugioh,
    /// Mini American, 41x63mm
    MiniUs,
    /// Mini European, 44x68mm
    MiniEu,
    /// Tarot, 70x120mm
    Tarot,
    /// User supplied width and height
    Custom,
}

impl CardPreset {
    /// Card dimensions for the preset, `None` for `Custom`
    pub fn dimensions_mm(self) -> Option<(f32, f32)> {
        match self {
            CardPreset::Standard => Some((63.0, 88.0)),
            CardPreset::Yugioh => Some((59.0, 86.0)),
            CardPreset::MiniUs => Some((41.0, 63.0)),
            CardPreset::MiniEu => Some((44.0, 68.0)),
            CardPreset::Tarot => Some((70.0, 120.0)),
            CardPreset::Custom => None,
        }
    }
}

/// How cut guides are drawn around each card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CutMarkStyle {
    None,
    /// Solid rectangle around the card
    #[default]
    Lines,
    /// Dashed rectangle around the card
    Dotted,
    /// L-shaped marks at each corner, outside the gap
    Crosshairs,
}

/// Fill color behind each card tile and of the printed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageBackground {
    #[default]
    White,
    Black,
    Custom { r: u8, g: u8, b: u8 },
}

impl PageBackground {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            PageBackground::White => [255, 255, 255],
            PageBackground::Black => [0, 0, 0],
            PageBackground::Custom { r, g, b } => [r, g, b],
        }
    }

    /// Stable identifier used in cache keys. Never contains `_`.
    pub fn id(self) -> String {
        match self {
            PageBackground::White => "white".to_string(),
            PageBackground::Black => "black".to_string(),
            PageBackground::Custom { r, g, b } => format!("#{:02x}{:02x}{:02x}", r, g, b),
        }
    }

    pub fn is_dark(self) -> bool {
        let [r, g, b] = self.rgb();
        (r as u32 + g as u32 + b as u32) < 3 * 64
    }

    /// Gray level for cut guides (white on dark paper)
    pub fn guide_gray(self) -> u8 {
        if self.is_dark() { 255 } else { 150 }
    }

    /// Gray level for footer text
    pub fn footer_gray(self) -> u8 {
        if self.is_dark() { 100 } else { 150 }
    }
}

impl fmt::Display for PageBackground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl FromStr for PageBackground {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(PageBackground::White),
            "black" => Ok(PageBackground::Black),
            hex if hex.starts_with('#') && hex.len() == 7 => {
                let channel = |range: std::ops::Range<usize>| {
                    u8::from_str_radix(&hex[range], 16)
                        .map_err(|_| LayoutError::Config(format!("Invalid color: {}", s)))
                };
                Ok(PageBackground::Custom {
                    r: channel(1..3)?,
                    g: channel(3..5)?,
                    b: channel(5..7)?,
                })
            }
            _ => Err(LayoutError::Config(format!("Unknown background: {}", s))),
        }
    }
}
