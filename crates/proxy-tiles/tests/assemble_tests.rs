mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use proxy_layout::{CutMarkStyle, PageSide, PrintEntry, PrintSettings};
use proxy_tiles::*;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn assembler(
    store: Arc<dyn TileStore>,
    transcoder: Arc<dyn Transcode>,
    config: PipelineConfig,
) -> PageAssembler {
    let processor = TileProcessor::new(&config, transcoder);
    PageAssembler::new(store, Arc::new(DefaultLoader::new()), processor, config)
}

/// Decodes fine, then blows up on the worker
struct PanickingTranscoder;

impl Transcode for PanickingTranscoder {
    fn transcode(
        &self,
        _surface: &mut Surface,
        _bitmap: DecodedImage,
        _params: &TileParams,
    ) -> Result<Tile> {
        panic!("encoder exploded");
    }
}

fn queue(count: usize) -> Vec<PrintEntry<SourceImage>> {
    let a = local_source(10);
    let b = local_source(20);
    (0..count)
        .map(|i| {
            let source = if i % 2 == 0 { a.clone() } else { b.clone() };
            entry(source, None, &format!("Card {}", i))
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_assembles_pages_and_writes_pdf() {
    let store = RecordingStore::new();
    let transcoder = CountingTranscoder::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let assembler = assembler(store.clone(), transcoder.clone(), test_config(2)).with_progress(tx);

    let doc = assembler
        .assemble(&queue(10), &PrintSettings::default())
        .await
        .unwrap();

    assert_eq!(doc.pages.len(), 2);
    assert!(doc.failures.is_empty());
    assert_eq!(doc.pages[0].slots.len(), 9);
    assert_eq!(doc.pages[1].slots.len(), 1);
    assert!(
        doc.pages
            .iter()
            .flat_map(|p| &p.slots)
            .all(|s| matches!(s.content, SlotContent::Tile(_)))
    );
    // Slot order survives concurrent rendering
    let names: Vec<_> = doc.pages[0].slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names[0], "Card 0");
    assert_eq!(names[8], "Card 8");
    assert_eq!(doc.pages[1].slots[0].name, "Card 9");

    // Two distinct artworks; the second page reads its tile from the store
    assert_eq!(transcoder.calls(), 2);
    assert!(store.put_keys().iter().all(|k| k.contains("_white_")));

    let mut progress = Vec::new();
    while let Ok(p) = rx.try_recv() {
        progress.push(p);
    }
    assert_eq!(
        progress.last(),
        Some(&AssemblyProgress {
            pages_done: 2,
            total_pages: 2
        })
    );

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("proxies.pdf");
    write_pdf(&doc, &path).await.unwrap();

    let pdf = lopdf::Document::load(&path).unwrap();
    assert_eq!(pdf.get_pages().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_tiles_are_reused() {
    let store = RecordingStore::new();
    let settings = PrintSettings::default();

    let warm = assembler(store.clone(), CountingTranscoder::new(), test_config(0));
    warm.assemble(&queue(4), &settings).await.unwrap();

    let transcoder = CountingTranscoder::new();
    let cold = assembler(store.clone(), transcoder.clone(), test_config(0));
    let doc = cold.assemble(&queue(4), &settings).await.unwrap();

    assert_eq!(transcoder.calls(), 0);
    assert!(doc.failures.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_undecodable_card_becomes_placeholder() {
    let mut queue = queue(3);
    queue[1] = entry(
        SourceImage::local(b"garbage".to_vec()),
        None,
        "Black Lotus (Alpha Edition)",
    );

    let assembler = assembler(
        RecordingStore::new(),
        CountingTranscoder::new(),
        test_config(0),
    );
    let doc = assembler
        .assemble(&queue, &PrintSettings::default())
        .await
        .unwrap();

    assert_eq!(doc.failures.len(), 1);
    assert_eq!(doc.failures[0].slot_index, 1);
    match &doc.pages[0].slots[1].content {
        SlotContent::Placeholder { label, name, .. } => {
            assert_eq!(label, "RENDER FAIL");
            assert_eq!(name, "Black Lotus (Al");
        }
        other => panic!("Expected placeholder, got {:?}", other),
    }
    assert!(matches!(doc.pages[0].slots[0].content, SlotContent::Tile(_)));
    assert_eq!(
        doc.failure_summary().unwrap(),
        "Generated with 1 errors: Black Lotus (Alpha Edition)"
    );

    let pdf = lopdf::Document::load_mem(&render_pdf_bytes(&doc).unwrap()).unwrap();
    assert_eq!(pdf.get_pages().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_failure_becomes_placeholder() {
    let store = RecordingStore::new();
    let assembler = assembler(store.clone(), Arc::new(PanickingTranscoder), test_config(2));

    let doc = assembler
        .assemble(&queue(2), &PrintSettings::default())
        .await
        .unwrap();

    assert_eq!(doc.pages.len(), 1);
    assert_eq!(doc.failures.len(), 2);
    assert!(doc.pages[0].slots.iter().all(|s| s.content.is_placeholder()));
    assert!(store.put_keys().is_empty());

    let pdf = lopdf::Document::load_mem(&render_pdf_bytes(&doc).unwrap()).unwrap();
    assert_eq!(pdf.get_pages().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resolution_change_renders_fresh_tiles() {
    let store = RecordingStore::new();
    let settings = PrintSettings::default();

    let low = assembler(store.clone(), CountingTranscoder::new(), test_config(0));
    low.assemble(&queue(1), &settings).await.unwrap();

    let transcoder = CountingTranscoder::new();
    let config = PipelineConfig {
        pixels_per_mm: 4.0,
        ..test_config(0)
    };
    let expected = TileParams::from_settings(&settings, &config).target_size();
    let high = assembler(store.clone(), transcoder.clone(), config);
    let doc = high.assemble(&queue(1), &settings).await.unwrap();

    assert_eq!(transcoder.calls(), 1);
    assert_eq!(store.put_keys().len(), 2);
    match &doc.pages[0].slots[0].content {
        SlotContent::Tile(tile) => assert_eq!((tile.width, tile.height), expected),
        other => panic!("Expected tile, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_timeout_falls_back_inline() {
    let transcoder = CountingTranscoder::slow_on_workers(Duration::from_millis(500));
    let config = PipelineConfig {
        task_timeout: Duration::from_millis(50),
        ..test_config(1)
    };
    let store = RecordingStore::new();
    let assembler = assembler(store.clone(), transcoder.clone(), config);

    let doc = assembler
        .assemble(&queue(1), &PrintSettings::default())
        .await
        .unwrap();

    assert!(doc.failures.is_empty());
    assert!(matches!(doc.pages[0].slots[0].content, SlotContent::Tile(_)));
    // Once on the worker, once inline
    assert_eq!(transcoder.calls(), 2);
    assert_eq!(store.put_keys().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplex_with_empty_back_page() {
    let mut queue = queue(10);
    queue[0].back = Some(local_source(99));

    let settings = PrintSettings {
        duplex: true,
        cut_marks: CutMarkStyle::Crosshairs,
        ..PrintSettings::default()
    };
    let assembler = assembler(
        RecordingStore::new(),
        CountingTranscoder::new(),
        test_config(0),
    );
    let doc = assembler.assemble(&queue, &settings).await.unwrap();

    assert_eq!(doc.pages.len(), 4);
    assert_eq!(doc.pages[1].side, PageSide::Back);
    assert_eq!(doc.pages[1].slots.len(), 1);
    assert_eq!(doc.pages[1].guides.len(), 8);

    let empty_back = &doc.pages[3];
    assert!(empty_back.empty);
    assert!(empty_back.slots.is_empty());
    assert!(empty_back.guides.is_empty());
    assert_eq!(empty_back.footer, None);
    assert!(doc.pages[0].footer.is_some());

    let pdf = lopdf::Document::load_mem(&render_pdf_bytes(&doc).unwrap()).unwrap();
    assert_eq!(pdf.get_pages().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_card_aborts_before_rendering() {
    let settings = PrintSettings {
        card_scale_percent: 400.0,
        ..PrintSettings::default()
    };
    let transcoder = CountingTranscoder::new();
    let assembler = assembler(RecordingStore::new(), transcoder.clone(), test_config(0));

    let result = assembler.assemble(&queue(3), &settings).await;

    assert!(matches!(result, Err(TileError::Layout(_))));
    assert_eq!(transcoder.calls(), 0);
}
