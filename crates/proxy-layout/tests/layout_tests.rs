use proxy_layout::*;

fn queue_of(count: usize, backs: impl Fn(usize) -> bool) -> Vec<PrintEntry<String>> {
    (0..count)
        .map(|i| PrintEntry {
            front: format!("front-{}", i),
            back: backs(i).then(|| format!("back-{}", i)),
            name: format!("Card {}", i),
        })
        .collect()
}

#[test]
fn test_a4_standard_cards_fill_three_by_three() {
    let grid = compute_page_grid(210.0, 297.0, 63.0, 88.0, 0.0, 5.0).unwrap();
    assert_eq!((grid.cols, grid.rows), (3, 3));
    assert!((grid.start_x_mm - 10.5).abs() < 1e-4);
    assert!((grid.start_y_mm - 16.5).abs() < 1e-4);
}

#[test]
fn test_ten_entries_make_two_front_pages() {
    let layout = layout_document(&queue_of(10, |_| false), &PrintSettings::default()).unwrap();

    assert_eq!(layout.pages.len(), 2);
    assert_eq!(layout.pages[0].slots.len(), 9);
    assert_eq!(layout.pages[1].slots.len(), 1);
    assert!(layout.pages.iter().all(|p| p.side == PageSide::Front));

    // Last slot of the first page sits at the bottom right of the grid
    let last = &layout.pages[0].slots[8];
    assert_eq!((last.col, last.row), (2, 2));
    assert!((last.x_mm - (10.5 + 2.0 * 63.0)).abs() < 1e-3);
    assert!((last.y_mm - (16.5 + 2.0 * 88.0)).abs() < 1e-3);
}

#[test]
fn test_duplex_mirrors_columns() {
    let settings = PrintSettings {
        duplex: true,
        ..Default::default()
    };
    let layout = layout_document(&queue_of(9, |_| true), &settings).unwrap();
    assert_eq!(layout.pages.len(), 2);

    let front = &layout.pages[0];
    let back = &layout.pages[1];
    for (f, b) in front.slots.iter().zip(&back.slots) {
        assert_eq!(f.slot_index, b.slot_index);
        assert_eq!(f.row, b.row);
        assert_eq!(b.col, 2 - f.col);
        assert_eq!(b.name, f.name);
    }
}

#[test]
fn test_partial_backs_leave_cells_empty() {
    let settings = PrintSettings {
        duplex: true,
        ..Default::default()
    };
    let layout = layout_document(&queue_of(3, |i| i == 1), &settings).unwrap();
    let back = &layout.pages[1];

    assert_eq!(back.side, PageSide::Back);
    assert!(!back.empty);
    assert_eq!(back.slots.len(), 1);
    assert_eq!(back.slots[0].source, "back-1");
    assert_eq!(back.slots[0].col, 1);
}

#[test]
fn test_empty_back_page_is_flagged() {
    let settings = PrintSettings {
        duplex: true,
        ..Default::default()
    };
    let layout = layout_document(&queue_of(12, |i| i < 2), &settings).unwrap();
    let summary = layout.summary();

    assert_eq!(summary.front_pages, 2);
    assert_eq!(summary.back_pages, 2);
    assert_eq!(summary.empty_back_pages, 1);
    assert!(layout.pages[3].empty);
}

#[test]
fn test_structural_failure_before_any_page() {
    let settings = PrintSettings {
        card_preset: CardPreset::Custom,
        card_width_mm: 250.0,
        ..Default::default()
    };
    let result = layout_document(&queue_of(5, |_| false), &settings);
    assert!(matches!(result, Err(LayoutError::CardExceedsPaper { .. })));
}

#[test]
fn test_scaled_cards_fit_more_per_page() {
    let settings = PrintSettings {
        card_scale_percent: 50.0,
        ..Default::default()
    };
    let layout = layout_document(&queue_of(1, |_| false), &settings).unwrap();
    // 200 / 31.5 = 6.3, 287 / 44 = 6.5
    assert_eq!((layout.grid.cols, layout.grid.rows), (6, 6));
    assert_eq!(layout.pages[0].slots[0].w_mm, 31.5);
}

#[test]
fn test_cut_guides_follow_slot() {
    let layout = layout_document(&queue_of(1, |_| false), &PrintSettings::default()).unwrap();
    let slot = &layout.pages[0].slots[0];
    let guides = cut_guides(
        CutMarkStyle::Lines,
        slot.x_mm,
        slot.y_mm,
        slot.w_mm,
        slot.h_mm,
        0.0,
    );
    assert_eq!(guides.len(), 4);
    assert_eq!(guides[0].x1, slot.x_mm);
    assert_eq!(guides[0].x2, slot.x_mm + slot.w_mm);
}
