//! Deck CSV loading
//!
//! Columns are `front,back,quantity,name` with a header row. Only `front` is
//! required. Image references starting with `http://` or `https://` are
//! fetched later; anything else is a file path, relative to the CSV.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use proxy_layout::DeckCard;
use proxy_tiles::SourceImage;

/// A parsed CSV row before any image is read
#[derive(Debug, Clone, PartialEq)]
struct DeckRow {
    front: String,
    back: Option<String>,
    quantity: u32,
    name: String,
}

pub async fn load_deck(path: impl AsRef<Path>) -> Result<Vec<DeckCard<SourceImage>>> {
    let path = path.as_ref().to_owned();
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read deck {}", path.display()))?;

    // CSV parsing is CPU-bound, spawn blocking
    let rows = tokio::task::spawn_blocking(move || parse_rows(&contents)).await??;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut deck = Vec::with_capacity(rows.len());
    for row in rows {
        let back = match &row.back {
            Some(back) => Some(resolve_source(back, &base).await?),
            None => None,
        };
        deck.push(DeckCard {
            front: resolve_source(&row.front, &base).await?,
            back,
            name: row.name,
            quantity: row.quantity,
        });
    }

    log::info!(
        "Loaded {} deck lines ({} cards) from {}",
        deck.len(),
        deck.iter().map(|c| c.quantity as usize).sum::<usize>(),
        path.display()
    );
    Ok(deck)
}

fn parse_rows(contents: &str) -> Result<Vec<DeckRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());
    let mut rows = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let field = |i: usize| record.get(i).filter(|s| !s.is_empty());

        let Some(front) = field(0) else {
            log::warn!("Skipping deck line {} without a front image", line + 2);
            continue;
        };
        let quantity = match field(2) {
            Some(q) => q
                .parse::<u32>()
                .with_context(|| format!("Invalid quantity {:?} on line {}", q, line + 2))?,
            None => 1,
        };
        let name = field(3)
            .map(str::to_string)
            .unwrap_or_else(|| default_name(front));

        rows.push(DeckRow {
            front: front.to_string(),
            back: field(1).map(str::to_string),
            quantity,
            name,
        });
    }

    if rows.is_empty() {
        bail!("Deck has no cards");
    }
    Ok(rows)
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Card name from the file stem or last URL segment
fn default_name(reference: &str) -> String {
    let tail = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches('/');
    let file = tail.rsplit('/').next().unwrap_or(tail);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

async fn resolve_source(reference: &str, base: &Path) -> Result<SourceImage> {
    if is_remote(reference) {
        return Ok(SourceImage::remote(reference));
    }

    let path: PathBuf = base.join(reference);
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(SourceImage::local(bytes))
}
