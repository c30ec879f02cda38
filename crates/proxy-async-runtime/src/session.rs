//! The session loop that owns the pipeline for one deck.
//!
//! Front ends push [`PrintCommand`]s; the session reacts to deck and
//! settings changes by restarting prefetch, and runs generation with the
//! sweep paused so both never compete for workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use proxy_layout::{DeckCard, PrintEntry, PrintSettings, expand_print_queue};
use proxy_tiles::{
    AssembledDocument, AssemblyProgress, PageAssembler, PipelineConfig, PrefetchEvent,
    PrefetchScheduler, SourceImage, SourceLoader, SweepReport, TileError, TileProcessor,
    TileStore, write_pdf,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{OPERATION_GENERATE, OPERATION_PREFETCH, PrintCommand, PrintUpdate};

/// Deck, settings and the pipeline pieces that act on them
pub struct PrintSession {
    store: Arc<dyn TileStore>,
    processor: TileProcessor,
    scheduler: Arc<PrefetchScheduler>,
    assembler: PageAssembler,
    settings: PrintSettings,
    queue: Vec<PrintEntry<SourceImage>>,
    prefetch: Option<JoinHandle<SweepReport>>,
    prefetch_events: Option<mpsc::UnboundedReceiver<PrefetchEvent>>,
    assembly_progress: Option<mpsc::UnboundedReceiver<AssemblyProgress>>,
}

impl PrintSession {
    pub fn new(
        store: Arc<dyn TileStore>,
        loader: Arc<dyn SourceLoader>,
        processor: TileProcessor,
        config: PipelineConfig,
        settings: PrintSettings,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        let scheduler = PrefetchScheduler::new(
            store.clone(),
            loader.clone(),
            processor.clone(),
            config.clone(),
        )
        .with_events(event_tx);
        let assembler = PageAssembler::new(store.clone(), loader, processor.clone(), config)
            .with_progress(progress_tx);

        Self {
            store,
            processor,
            scheduler: Arc::new(scheduler),
            assembler,
            settings,
            queue: Vec::new(),
            prefetch: None,
            prefetch_events: Some(event_rx),
            assembly_progress: Some(progress_rx),
        }
    }

    pub fn settings(&self) -> &PrintSettings {
        &self.settings
    }

    /// One entry per physical copy, in deck order
    pub fn queue(&self) -> &[PrintEntry<SourceImage>] {
        &self.queue
    }

    /// Forward prefetch and generation progress to `update_tx` as
    /// [`PrintUpdate::Progress`]. Only the first call has any effect.
    pub fn forward_progress(&mut self, update_tx: &mpsc::UnboundedSender<PrintUpdate>) {
        if let Some(mut events) = self.prefetch_events.take() {
            let tx = update_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let (current, total) = match event {
                        PrefetchEvent::Started { total, .. } => (0, total),
                        PrefetchEvent::Progress(p) => (p.current, p.total),
                        PrefetchEvent::Reset { .. } => (0, 0),
                        PrefetchEvent::Finished(_) => continue,
                    };
                    let _ = tx.send(PrintUpdate::Progress {
                        operation: OPERATION_PREFETCH.to_string(),
                        current,
                        total,
                    });
                }
            });
        }

        if let Some(mut progress) = self.assembly_progress.take() {
            let tx = update_tx.clone();
            tokio::spawn(async move {
                while let Some(p) = progress.recv().await {
                    let _ = tx.send(PrintUpdate::Progress {
                        operation: OPERATION_GENERATE.to_string(),
                        current: p.pages_done,
                        total: p.total_pages,
                    });
                }
            });
        }
    }

    /// Replace the deck and re-warm the store for it
    pub fn set_deck(&mut self, deck: &[DeckCard<SourceImage>]) {
        self.queue = expand_print_queue(deck);
        log::info!("Deck now has {} cards", self.queue.len());
        self.prefetch = Some(
            self.scheduler
                .on_deck_changed(&self.queue, &self.settings),
        );
    }

    /// Apply new settings. Returns whether prefetch was restarted.
    pub fn set_settings(&mut self, settings: PrintSettings) -> bool {
        let old = std::mem::replace(&mut self.settings, settings);
        match self
            .scheduler
            .on_settings_changed(&old, &self.settings, &self.queue)
        {
            Some(handle) => {
                self.prefetch = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Wait for the current sweep, if any
    pub async fn wait_for_prefetch(&mut self) -> Option<SweepReport> {
        let handle = self.prefetch.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("Prefetch task failed: {}", e);
                None
            }
        }
    }

    /// Stop prefetch, then assemble and write the document.
    ///
    /// Prefetch stays stopped; long-lived callers follow up with
    /// [`PrintSession::resume_prefetch`].
    pub async fn generate(&mut self, output_path: &Path) -> Result<AssembledDocument, TileError> {
        self.scheduler.cancel();
        self.prefetch = None;
        self.render(output_path).await
    }

    /// Start a fresh sweep over the current deck and settings
    pub fn resume_prefetch(&mut self) {
        self.prefetch = Some(self.scheduler.start(&self.queue, &self.settings));
    }

    /// Whether a sweep has been started and not yet awaited
    pub fn prefetch_pending(&self) -> bool {
        self.prefetch.is_some()
    }

    async fn render(&self, output_path: &Path) -> Result<AssembledDocument, TileError> {
        let doc = self.assembler.assemble(&self.queue, &self.settings).await?;
        write_pdf(&doc, output_path).await?;
        if let Some(summary) = doc.failure_summary() {
            log::warn!("{}", summary);
        }
        Ok(doc)
    }

    pub async fn cache_size(&self) -> Result<u64, TileError> {
        self.store.estimate_size_bytes().await
    }

    /// Stop prefetch and empty the store
    pub async fn clear_cache(&mut self) -> Result<(), TileError> {
        self.scheduler.cancel();
        self.prefetch = None;
        self.store.clear().await?;
        log::info!("Tile cache cleared");
        Ok(())
    }

    /// Cancel prefetch and stop the worker pool
    pub async fn shutdown(self) {
        self.scheduler.cancel();
        let processor = self.processor.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || processor.shutdown()).await {
            log::warn!("Worker pool shutdown failed: {}", e);
        }
    }
}

/// Run `session` until the command channel closes
pub async fn session_task(
    mut command_rx: mpsc::UnboundedReceiver<PrintCommand>,
    update_tx: mpsc::UnboundedSender<PrintUpdate>,
    mut session: PrintSession,
) {
    session.forward_progress(&update_tx);

    while let Some(first) = command_rx.recv().await {
        let mut queued = vec![first];
        while let Ok(next) = command_rx.try_recv() {
            queued.push(next);
        }

        for cmd in coalesce_settings(queued) {
            process_command(cmd, &mut session, &update_tx).await;
        }
    }

    session.shutdown().await;
}

/// Collapse each run of back-to-back settings changes into its last one
fn coalesce_settings(commands: Vec<PrintCommand>) -> Vec<PrintCommand> {
    let mut out: Vec<PrintCommand> = Vec::with_capacity(commands.len());
    for cmd in commands {
        if matches!(cmd, PrintCommand::SettingsChanged { .. })
            && matches!(out.last(), Some(PrintCommand::SettingsChanged { .. }))
        {
            log::debug!("Discarding queued settings change, using newer one");
            out.pop();
        }
        out.push(cmd);
    }
    out
}

async fn process_command(
    cmd: PrintCommand,
    session: &mut PrintSession,
    update_tx: &mpsc::UnboundedSender<PrintUpdate>,
) {
    match cmd {
        PrintCommand::DeckChanged { deck } => session.set_deck(&deck),
        PrintCommand::SettingsChanged { settings } => {
            if let Err(e) = settings.validate() {
                let _ = update_tx.send(PrintUpdate::Error {
                    message: format!("Invalid settings: {e}"),
                });
                return;
            }
            session.set_settings(settings);
        }
        PrintCommand::Generate { output_path } => {
            handle_generate(session, output_path, update_tx).await;
        }
        PrintCommand::EstimateCacheSize => match session.cache_size().await {
            Ok(bytes) => {
                let _ = update_tx.send(PrintUpdate::CacheSize { bytes });
            }
            Err(e) => {
                let _ = update_tx.send(PrintUpdate::Error {
                    message: format!("Failed to estimate cache size: {e}"),
                });
            }
        },
        PrintCommand::ClearCache => match session.clear_cache().await {
            Ok(()) => {
                let _ = update_tx.send(PrintUpdate::CacheCleared);
            }
            Err(e) => {
                let _ = update_tx.send(PrintUpdate::Error {
                    message: format!("Failed to clear cache: {e}"),
                });
            }
        },
    }
}

async fn handle_generate(
    session: &mut PrintSession,
    output_path: PathBuf,
    update_tx: &mpsc::UnboundedSender<PrintUpdate>,
) {
    if session.queue().is_empty() {
        let _ = update_tx.send(PrintUpdate::Error {
            message: "Nothing to print, the deck is empty".to_string(),
        });
        return;
    }

    let result = session.generate(&output_path).await;
    session.resume_prefetch();

    match result {
        Ok(doc) => {
            let _ = update_tx.send(PrintUpdate::Generated {
                path: output_path,
                pages: doc.pages.len(),
                failures: doc.failures,
            });
        }
        Err(e) => {
            let _ = update_tx.send(PrintUpdate::Error {
                message: format!("Failed to generate PDF: {e}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_gap(gap_mm: f32) -> PrintCommand {
        PrintCommand::SettingsChanged {
            settings: PrintSettings {
                gap_mm,
                ..Default::default()
            },
        }
    }

    fn gaps(commands: &[PrintCommand]) -> Vec<Option<f32>> {
        commands
            .iter()
            .map(|c| match c {
                PrintCommand::SettingsChanged { settings } => Some(settings.gap_mm),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_coalesce_keeps_last_of_each_run() {
        let commands = vec![
            settings_with_gap(1.0),
            settings_with_gap(2.0),
            PrintCommand::EstimateCacheSize,
            settings_with_gap(3.0),
            settings_with_gap(4.0),
            settings_with_gap(5.0),
        ];
        assert_eq!(
            gaps(&coalesce_settings(commands)),
            vec![Some(2.0), None, Some(5.0)]
        );
    }

    #[test]
    fn test_coalesce_leaves_other_commands_alone() {
        let commands = vec![PrintCommand::ClearCache, PrintCommand::EstimateCacheSize];
        assert_eq!(coalesce_settings(commands).len(), 2);
    }
}
