//! Final page assembly: layout plus resolved tiles.
//!
//! Pages are resolved one at a time. Each page does a single batched store
//! read, renders its misses concurrently (bounded by the processor's batch
//! size) and keeps slot order regardless of completion order. A slot that
//! cannot be rendered becomes a visible placeholder; only structural layout
//! errors abort assembly, and those surface before any page is resolved.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use proxy_layout::constants::PLACEHOLDER_NAME_CHARS;
use proxy_layout::{
    CutMarkStyle, GuideSegment, LayoutPage, PageBackground, PageSide, PrintEntry, PrintSettings,
    cut_guides, layout_document,
};
use tokio::sync::mpsc;

use crate::config::PipelineConfig;
use crate::loader::SourceLoader;
use crate::pool::TileProcessor;
use crate::source::SourceImage;
use crate::store::{TileStore, put_or_log};
use crate::transcode::TileParams;
use crate::types::{Result, Tile, TileError};

pub const PLACEHOLDER_LABEL: &str = "RENDER FAIL";
pub const PLACEHOLDER_BORDER_RGB: [u8; 3] = [255, 0, 0];

#[derive(Debug, Clone, PartialEq)]
pub enum SlotContent {
    Tile(Tile),
    /// Drawn in place of a card that could not be rendered
    Placeholder {
        label: String,
        /// Card name cut to a readable length
        name: String,
        border_rgb: [u8; 3],
    },
}

impl SlotContent {
    fn placeholder(card_name: &str) -> Self {
        SlotContent::Placeholder {
            label: PLACEHOLDER_LABEL.to_string(),
            name: card_name.chars().take(PLACEHOLDER_NAME_CHARS).collect(),
            border_rgb: PLACEHOLDER_BORDER_RGB,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SlotContent::Placeholder { .. })
    }
}

/// A placed card, trimmed rectangle in millimeters from the top-left corner
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSlot {
    pub slot_index: usize,
    pub name: String,
    pub x_mm: f32,
    pub y_mm: f32,
    pub w_mm: f32,
    pub h_mm: f32,
    pub content: SlotContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPage {
    pub side: PageSide,
    pub empty: bool,
    pub slots: Vec<AssembledSlot>,
    pub guides: Vec<GuideSegment>,
    pub footer: Option<String>,
}

/// A slot that fell back to a placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct SlotFailure {
    pub page_index: usize,
    pub slot_index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDocument {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub bleed_mm: f32,
    pub background: PageBackground,
    pub cut_marks: CutMarkStyle,
    pub pages: Vec<AssembledPage>,
    pub failures: Vec<SlotFailure>,
}

impl AssembledDocument {
    /// Short human readable failure summary: up to three names, then "..."
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.failures.iter().take(3).map(|f| f.name.as_str()).collect();
        let more = if self.failures.len() > 3 { "..." } else { "" };
        Some(format!(
            "Generated with {} errors: {}{}",
            self.failures.len(),
            names.join(", "),
            more
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyProgress {
    pub pages_done: usize,
    pub total_pages: usize,
}

pub struct PageAssembler {
    store: Arc<dyn TileStore>,
    loader: Arc<dyn SourceLoader>,
    processor: TileProcessor,
    config: PipelineConfig,
    progress: Option<mpsc::UnboundedSender<AssemblyProgress>>,
}

impl PageAssembler {
    pub fn new(
        store: Arc<dyn TileStore>,
        loader: Arc<dyn SourceLoader>,
        processor: TileProcessor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            loader,
            processor,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<AssemblyProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Lay out the queue and resolve every slot to a tile or placeholder
    pub async fn assemble(
        &self,
        queue: &[PrintEntry<SourceImage>],
        settings: &PrintSettings,
    ) -> Result<AssembledDocument> {
        let layout = layout_document(queue, settings)?;
        let params = TileParams::from_settings(settings, &self.config);
        let total_pages = layout.pages.len();

        log::info!(
            "Assembling {} pages for {} cards ({}x{} grid)",
            total_pages,
            layout.entries,
            layout.grid.cols,
            layout.grid.rows
        );

        let mut pages = Vec::with_capacity(total_pages);
        let mut failures = Vec::new();

        for (page_index, page) in layout.pages.iter().enumerate() {
            let resolved = self.resolve_page(page, &params).await;

            let mut slots = Vec::with_capacity(page.slots.len());
            for (slot, result) in page.slots.iter().zip(resolved) {
                let content = match result {
                    Ok(tile) => SlotContent::Tile(tile),
                    Err(reason) => {
                        log::warn!(
                            "Page {} slot {} ({}) replaced by placeholder: {}",
                            page_index + 1,
                            slot.slot_index,
                            slot.name,
                            reason
                        );
                        failures.push(SlotFailure {
                            page_index,
                            slot_index: slot.slot_index,
                            name: slot.name.clone(),
                            reason,
                        });
                        SlotContent::placeholder(&slot.name)
                    }
                };
                slots.push(AssembledSlot {
                    slot_index: slot.slot_index,
                    name: slot.name.clone(),
                    x_mm: slot.x_mm,
                    y_mm: slot.y_mm,
                    w_mm: slot.w_mm,
                    h_mm: slot.h_mm,
                    content,
                });
            }

            pages.push(AssembledPage {
                side: page.side,
                empty: page.empty,
                guides: page_guides(page, settings),
                footer: page_footer(page, settings),
                slots,
            });

            if let Some(tx) = &self.progress {
                let _ = tx.send(AssemblyProgress {
                    pages_done: page_index + 1,
                    total_pages,
                });
            }
        }

        Ok(AssembledDocument {
            page_width_mm: layout.page_width_mm,
            page_height_mm: layout.page_height_mm,
            bleed_mm: settings.bleed_mm,
            background: settings.background,
            cut_marks: settings.cut_marks,
            pages,
            failures,
        })
    }

    /// Resolve each slot of a page, in slot order. Errors are reported as
    /// strings since one failure may be shared by repeated artwork.
    async fn resolve_page(
        &self,
        page: &LayoutPage<SourceImage>,
        params: &TileParams,
    ) -> Vec<std::result::Result<Tile, String>> {
        let keys: Vec<String> = page
            .slots
            .iter()
            .map(|slot| params.key_for(&slot.source).into_string())
            .collect();

        // Repeated artwork on one page is rendered once
        let mut unique: Vec<(&str, &SourceImage)> = Vec::new();
        for (key, slot) in keys.iter().zip(&page.slots) {
            if !unique.iter().any(|(k, _)| *k == key.as_str()) {
                unique.push((key.as_str(), &slot.source));
            }
        }

        let unique_keys: Vec<String> = unique.iter().map(|(k, _)| k.to_string()).collect();
        let mut cached = match self.store.get_batch(&unique_keys).await {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Cache read failed, rendering page from scratch: {}", e);
                HashMap::new()
            }
        };

        let concurrency = self.processor.batch_size(&self.config);
        let resolved: HashMap<&str, std::result::Result<Tile, String>> = stream::iter(unique)
            .map(|(key, source)| {
                let hit = cached.remove(key);
                async move {
                    let result = self.resolve_slot(source, key, hit, params).await;
                    (key, result.map_err(|e| e.to_string()))
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        keys.iter()
            .map(|key| match resolved.get(key.as_str()) {
                Some(result) => result.clone(),
                None => Err("Slot was not resolved".to_string()),
            })
            .collect()
    }

    async fn resolve_slot(
        &self,
        source: &SourceImage,
        key: &str,
        cached: Option<Vec<u8>>,
        params: &TileParams,
    ) -> Result<Tile> {
        if let Some(bytes) = cached {
            match Tile::from_jpeg(bytes) {
                Ok(tile) => return Ok(tile),
                Err(e) => log::warn!("Re-rendering unreadable cached tile {}: {}", key, e),
            }
        }

        let bitmap = self.loader.load(source).await?;
        let tile = match self.processor.process(bitmap, params).await {
            Err(TileError::WorkerTimeout(after)) => {
                log::warn!(
                    "Worker timed out after {:?} on {}, rendering inline",
                    after,
                    key
                );
                let bitmap = self.loader.load(source).await?;
                self.processor.process_inline(bitmap, params).await?
            }
            other => other?,
        };

        put_or_log(self.store.as_ref(), key, tile.jpeg.clone()).await;
        Ok(tile)
    }
}

/// Cut guides for occupied slots. Empty back pages get none.
fn page_guides(page: &LayoutPage<SourceImage>, settings: &PrintSettings) -> Vec<GuideSegment> {
    if page.empty {
        return Vec::new();
    }
    page.slots
        .iter()
        .flat_map(|slot| {
            cut_guides(
                settings.cut_marks,
                slot.x_mm,
                slot.y_mm,
                slot.w_mm,
                slot.h_mm,
                settings.gap_mm,
            )
        })
        .collect()
}

fn page_footer(page: &LayoutPage<SourceImage>, settings: &PrintSettings) -> Option<String> {
    if page.empty {
        return None;
    }
    settings
        .footer_text
        .as_ref()
        .filter(|text| !text.trim().is_empty())
        .cloned()
}
