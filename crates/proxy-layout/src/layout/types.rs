//! Layout data types
//!
//! These types sit between the deck the user assembled and the document
//! that gets rendered. They are generic over the image source so the layout
//! engine never needs to know where artwork comes from.

use crate::geometry::PageGrid;

/// A deck line: one artwork pair printed `quantity` times
#[derive(Debug, Clone, PartialEq)]
pub struct DeckCard<S> {
    pub front: S,
    pub back: Option<S>,
    pub name: String,
    pub quantity: u32,
}

/// One physical copy to print
#[derive(Debug, Clone, PartialEq)]
pub struct PrintEntry<S> {
    pub front: S,
    pub back: Option<S>,
    pub name: String,
}

/// Which physical side of the printed sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSide {
    /// Card faces, printed first
    Front,
    /// Card backs, printed on the reverse with mirrored columns
    Back,
}

/// A card placed on a page. Coordinates are millimeters from the top-left
/// corner of the paper and describe the trimmed card, not its bleed.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSlot<S> {
    /// Position of the entry within its batch
    pub slot_index: usize,
    pub col: usize,
    pub row: usize,
    pub source: S,
    pub name: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub w_mm: f32,
    pub h_mm: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPage<S> {
    pub side: PageSide,
    /// Index of the batch of entries this page was built from
    pub batch_index: usize,
    /// Back page without a single back image. Gets no footer and no guides.
    pub empty: bool,
    pub slots: Vec<LayoutSlot<S>>,
}

/// A fully paginated print job
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout<S> {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub grid: PageGrid,
    /// Number of physical copies in the queue
    pub entries: usize,
    pub pages: Vec<LayoutPage<S>>,
}

/// Statistics about a layout, for display before printing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSummary {
    pub entries: usize,
    pub cols: usize,
    pub rows: usize,
    pub slots_per_page: usize,
    pub front_pages: usize,
    pub back_pages: usize,
    pub empty_back_pages: usize,
}

impl LayoutSummary {
    pub fn total_pages(&self) -> usize {
        self.front_pages + self.back_pages
    }
}
