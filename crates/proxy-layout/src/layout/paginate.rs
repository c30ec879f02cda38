use crate::geometry::{PageGrid, compute_page_grid};
use crate::layout::types::*;
use crate::settings::PrintSettings;
use crate::types::Result;

/// Expand deck lines into one entry per physical copy, preserving order.
pub fn expand_print_queue<S: Clone>(deck: &[DeckCard<S>]) -> Vec<PrintEntry<S>> {
    deck.iter()
        .flat_map(|card| {
            (0..card.quantity).map(move |_| PrintEntry {
                front: card.front.clone(),
                back: card.back.clone(),
                name: card.name.clone(),
            })
        })
        .collect()
}

/// Split a print queue into pages.
///
/// Front pages take the queue in stable batches of `grid.capacity()`
/// entries. When `duplex` is set and at least one entry anywhere in the
/// queue has a back, every front page is followed by a back page built from
/// the same batch with mirrored columns, so each back lands behind its front
/// after a long-edge flip. Entries without a back leave their mirrored cell
/// empty.
pub fn paginate<S: Clone>(
    queue: &[PrintEntry<S>],
    grid: &PageGrid,
    duplex: bool,
) -> Vec<LayoutPage<S>> {
    let per_page = grid.capacity().max(1);
    let needs_back_pages = duplex && queue.iter().any(|entry| entry.back.is_some());

    let mut pages = Vec::new();
    for (batch_index, batch) in queue.chunks(per_page).enumerate() {
        let front_slots = batch
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let col = i % grid.cols;
                let row = i / grid.cols;
                place(grid, i, col, row, entry.front.clone(), &entry.name)
            })
            .collect();

        pages.push(LayoutPage {
            side: PageSide::Front,
            batch_index,
            empty: false,
            slots: front_slots,
        });

        if !needs_back_pages {
            continue;
        }

        let back_slots: Vec<_> = batch
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let back = entry.back.as_ref()?;
                let col = grid.mirrored_col(i % grid.cols);
                let row = i / grid.cols;
                Some(place(grid, i, col, row, back.clone(), &entry.name))
            })
            .collect();

        pages.push(LayoutPage {
            side: PageSide::Back,
            batch_index,
            empty: back_slots.is_empty(),
            slots: back_slots,
        });
    }

    pages
}

fn place<S>(
    grid: &PageGrid,
    slot_index: usize,
    col: usize,
    row: usize,
    source: S,
    name: &str,
) -> LayoutSlot<S> {
    let (x_mm, y_mm) = grid.cell_origin(col, row);
    LayoutSlot {
        slot_index,
        col,
        row,
        source,
        name: name.to_string(),
        x_mm,
        y_mm,
        w_mm: grid.card_width_mm,
        h_mm: grid.card_height_mm,
    }
}

/// Validate settings, compute the grid and paginate the queue.
///
/// Structural problems (a card that cannot fit the paper, non-positive
/// dimensions) are reported here, before any page exists.
pub fn layout_document<S: Clone>(
    queue: &[PrintEntry<S>],
    settings: &PrintSettings,
) -> Result<DocumentLayout<S>> {
    settings.validate()?;

    let (page_width_mm, page_height_mm) = settings.page_dimensions();
    let (card_w, card_h) = settings.effective_card_size();
    let grid = compute_page_grid(
        page_width_mm,
        page_height_mm,
        card_w,
        card_h,
        settings.gap_mm,
        settings.margin_mm,
    )?;

    Ok(DocumentLayout {
        page_width_mm,
        page_height_mm,
        grid,
        entries: queue.len(),
        pages: paginate(queue, &grid, settings.duplex),
    })
}

impl<S> DocumentLayout<S> {
    pub fn summary(&self) -> LayoutSummary {
        let back_pages = self
            .pages
            .iter()
            .filter(|p| p.side == PageSide::Back)
            .count();
        let empty_back_pages = self.pages.iter().filter(|p| p.empty).count();

        LayoutSummary {
            entries: self.entries,
            cols: self.grid.cols,
            rows: self.grid.rows,
            slots_per_page: self.grid.capacity(),
            front_pages: self.pages.len() - back_pages,
            back_pages,
            empty_back_pages,
        }
    }
}
