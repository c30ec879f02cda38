mod deck;
mod logger;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use proxy_async_runtime::{PrintSession, PrintUpdate};
use proxy_layout::{
    CardPreset, CutMarkStyle, PageBackground, PaperSize, PrintSettings, expand_print_queue,
    layout_document,
};
use proxy_tiles::{
    DefaultLoader, JpegTranscoder, LmdbTileStore, PipelineConfig, TileProcessor, TileStore,
    format_size,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::logger::CliLogger;

/// Log entries kept for the end-of-run summary
const LOG_HISTORY: usize = 500;

#[derive(Parser)]
#[command(name = "proxyp", about = "Print-ready card proxy sheets", version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a deck to a print-ready PDF
    Generate {
        /// Deck CSV (columns: front, back, quantity, name)
        #[arg(short, long)]
        deck: PathBuf,

        /// Output PDF file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Warm the tile cache for a deck without writing a PDF
    Prefetch {
        /// Deck CSV (columns: front, back, quantity, name)
        #[arg(short, long)]
        deck: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show the page layout for a deck
    Layout {
        /// Deck CSV (columns: front, back, quantity, name)
        #[arg(short, long)]
        deck: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Report the size of the tile cache
    CacheSize {
        #[command(flatten)]
        cache: CacheArgs,
    },

    /// Delete every cached tile
    ClearCache {
        #[command(flatten)]
        cache: CacheArgs,
    },
}

#[derive(Args)]
struct SettingsArgs {
    /// Settings JSON used as the base for the flags below
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Paper size
    #[arg(long, value_enum)]
    paper: Option<PaperArg>,

    /// Card size preset
    #[arg(long, value_enum)]
    card: Option<CardArg>,

    /// Card width in mm (implies a custom card size)
    #[arg(long, requires = "card_height")]
    card_width: Option<f32>,

    /// Card height in mm (implies a custom card size)
    #[arg(long, requires = "card_width")]
    card_height: Option<f32>,

    /// Card scale in percent
    #[arg(long)]
    scale: Option<f32>,

    /// Gap between cards in mm
    #[arg(long)]
    gap: Option<f32>,

    /// Bleed around each card in mm
    #[arg(long)]
    bleed: Option<f32>,

    /// Page margin in mm
    #[arg(long)]
    margin: Option<f32>,

    /// Cut guide style
    #[arg(long, value_enum)]
    cut_marks: Option<CutMarksArg>,

    /// Background: white, black or #rrggbb
    #[arg(long)]
    background: Option<PageBackground>,

    /// Stamp "PROXY" on every card
    #[arg(long)]
    marker: bool,

    /// Print back pages for double-sided printing
    #[arg(long)]
    duplex: bool,

    /// Footer text on every page
    #[arg(long, conflicts_with = "no_footer")]
    footer: Option<String>,

    /// Leave the footer off
    #[arg(long)]
    no_footer: bool,

    /// Write the resulting settings to this JSON file
    #[arg(long)]
    save_settings: Option<PathBuf>,
}

#[derive(Args)]
struct CacheArgs {
    /// Tile cache directory
    #[arg(long, default_value = ".proxyp-cache")]
    cache_dir: PathBuf,
}

#[derive(Args)]
struct PipelineArgs {
    #[command(flatten)]
    cache: CacheArgs,

    /// Worker threads (0 renders inline)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PaperArg {
    A3,
    A4,
    A5,
    Letter,
    Legal,
}

#[derive(Clone, Copy, ValueEnum)]
enum CardArg {
    Standard,
    Yugioh,
    MiniUs,
    MiniEu,
    Tarot,
}

#[derive(Clone, Copy, ValueEnum)]
enum CutMarksArg {
    None,
    Lines,
    Dotted,
    Crosshairs,
}

impl From<PaperArg> for PaperSize {
    fn from(arg: PaperArg) -> Self {
        match arg {
            PaperArg::A3 => Self::A3,
            PaperArg::A4 => Self::A4,
            PaperArg::A5 => Self::A5,
            PaperArg::Letter => Self::Letter,
            PaperArg::Legal => Self::Legal,
        }
    }
}

impl From<CardArg> for CardPreset {
    fn from(arg: CardArg) -> Self {
        match arg {
            CardArg::Standard => Self::Standard,
            CardArg::Yugioh => Self::Yugioh,
            CardArg::MiniUs => Self::MiniUs,
            CardArg::MiniEu => Self::MiniEu,
            CardArg::Tarot => Self::Tarot,
        }
    }
}

impl From<CutMarksArg> for CutMarkStyle {
    fn from(arg: CutMarksArg) -> Self {
        match arg {
            CutMarksArg::None => Self::None,
            CutMarksArg::Lines => Self::Lines,
            CutMarksArg::Dotted => Self::Dotted,
            CutMarksArg::Crosshairs => Self::Crosshairs,
        }
    }
}

impl SettingsArgs {
    /// Base settings (file or defaults) with every given flag applied
    async fn resolve(&self) -> Result<PrintSettings> {
        let mut settings = match &self.settings {
            Some(path) => PrintSettings::load(path)
                .await
                .with_context(|| format!("Failed to load settings {}", path.display()))?,
            None => PrintSettings::default(),
        };

        if let Some(paper) = self.paper {
            settings.paper_size = paper.into();
        }
        if let Some(card) = self.card {
            settings = settings.with_preset(card.into());
        }
        if let (Some(width), Some(height)) = (self.card_width, self.card_height) {
            settings.card_preset = CardPreset::Custom;
            settings.card_width_mm = width;
            settings.card_height_mm = height;
        }
        if let Some(scale) = self.scale {
            settings.card_scale_percent = scale;
        }
        if let Some(gap) = self.gap {
            settings.gap_mm = gap;
        }
        if let Some(bleed) = self.bleed {
            settings.bleed_mm = bleed;
        }
        if let Some(margin) = self.margin {
            settings.margin_mm = margin;
        }
        if let Some(cut_marks) = self.cut_marks {
            settings.cut_marks = cut_marks.into();
        }
        if let Some(background) = self.background {
            settings.background = background;
        }
        if self.marker {
            settings.proxy_marker = true;
        }
        if self.duplex {
            settings.duplex = true;
        }
        if self.footer.is_some() {
            settings.footer_text = self.footer.clone();
        }
        if self.no_footer {
            settings.footer_text = None;
        }

        settings.validate()?;

        if let Some(path) = &self.save_settings {
            settings.save(path).await?;
            log::info!("Saved settings to {}", path.display());
        }
        Ok(settings)
    }
}

impl PipelineArgs {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.workers.unwrap_or_else(PipelineConfig::default_workers),
            ..Default::default()
        }
    }

    fn open_session(&self, settings: PrintSettings) -> Result<PrintSession> {
        let store = self.cache.open()?;
        let config = self.config();
        let processor = TileProcessor::new(&config, Arc::new(JpegTranscoder));
        Ok(PrintSession::new(
            Arc::new(store),
            Arc::new(DefaultLoader::new()),
            processor,
            config,
            settings,
        ))
    }
}

impl CacheArgs {
    fn open(&self) -> Result<LmdbTileStore> {
        LmdbTileStore::open(&self.cache_dir)
            .with_context(|| format!("Failed to open cache {}", self.cache_dir.display()))
    }
}

/// Print progress updates on one stderr line until the session goes away
fn spawn_progress_printer(session: &mut PrintSession, quiet: bool) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.forward_progress(&tx);
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let PrintUpdate::Progress {
                operation,
                current,
                total,
            } = update
            {
                if !quiet && total > 0 {
                    eprint!("\r{} {}/{}   ", operation, current, total);
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logger = CliLogger::new(LOG_HISTORY, CliLogger::level_for(cli.verbose, cli.quiet));
    logger.clone().init()?;

    match cli.command {
        Commands::Generate {
            deck,
            output,
            settings,
            pipeline,
        } => {
            let settings = settings.resolve().await?;
            let deck = deck::load_deck(&deck).await?;

            let mut session = pipeline.open_session(settings)?;
            spawn_progress_printer(&mut session, cli.quiet);

            session.set_deck(&deck);
            session.wait_for_prefetch().await;
            let result = session.generate(&output).await;
            session.shutdown().await;
            eprintln!();

            let doc = result?;
            println!("Generated {} pages → {}", doc.pages.len(), output.display());

            if let Some(summary) = doc.failure_summary() {
                println!("{}", summary);
                for entry in logger.warnings() {
                    println!("  {}", entry.message);
                }
            }
        }

        Commands::Prefetch {
            deck,
            settings,
            pipeline,
        } => {
            let settings = settings.resolve().await?;
            let deck = deck::load_deck(&deck).await?;

            let mut session = pipeline.open_session(settings)?;
            spawn_progress_printer(&mut session, cli.quiet);

            session.set_deck(&deck);
            let report = session.wait_for_prefetch().await;
            let size = session.cache_size().await?;
            session.shutdown().await;
            eprintln!();

            if let Some(report) = report {
                println!("Prefetch:");
                println!("  Distinct images: {}", report.total_sources);
                println!("  Already cached: {}", report.already_cached);
                println!("  Rendered: {}", report.processed);
                println!("  Failed: {}", report.failed);
            }
            println!("  Cache size: {}", format_size(size));
        }

        Commands::Layout { deck, settings } => {
            let settings = settings.resolve().await?;
            let deck = deck::load_deck(&deck).await?;
            let queue = expand_print_queue(&deck);

            let layout = layout_document(&queue, &settings)?;
            let summary = layout.summary();
            let (card_w, card_h) = settings.effective_card_size();

            println!("Layout:");
            println!(
                "  Paper: {:.1}x{:.1}mm",
                layout.page_width_mm, layout.page_height_mm
            );
            println!("  Card: {:.1}x{:.1}mm", card_w, card_h);
            println!(
                "  Grid: {}x{} ({} per page)",
                summary.cols, summary.rows, summary.slots_per_page
            );
            println!("  Cards: {}", summary.entries);
            println!("  Front pages: {}", summary.front_pages);
            if summary.back_pages > 0 {
                println!(
                    "  Back pages: {} ({} empty)",
                    summary.back_pages, summary.empty_back_pages
                );
            }
            println!("  Total pages: {}", summary.total_pages());
        }

        Commands::CacheSize { cache } => {
            let bytes = cache.open()?.estimate_size_bytes().await?;
            println!("Tile cache: {} ({})", format_size(bytes), cache.cache_dir.display());
        }

        Commands::ClearCache { cache } => {
            cache.open()?.clear().await?;
            println!("Cleared {}", cache.cache_dir.display());
        }
    }

    Ok(())
}
