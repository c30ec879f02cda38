//! Background warming of the tile store.
//!
//! A sweep walks the deck, deduplicates artwork, asks the store which tiles
//! already exist and renders only the misses, a batch at a time. Every sweep
//! runs under an epoch; starting a new sweep (or cancelling) bumps the epoch
//! and any result produced for an older epoch is dropped instead of stored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::future::join_all;
use proxy_layout::{PrintEntry, PrintSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::loader::SourceLoader;
use crate::pool::TileProcessor;
use crate::source::SourceImage;
use crate::store::{TileStore, put_or_log};
use crate::transcode::TileParams;
use crate::types::TileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchState {
    Idle,
    Running(u64),
}

/// Snapshot of the current sweep. `total` is zero when nothing is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefetchProgress {
    pub epoch: u64,
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchEvent {
    Started { epoch: u64, total: usize },
    Progress(PrefetchProgress),
    Finished(SweepReport),
    /// Progress went back to zero after the grace delay
    Reset { epoch: u64 },
}

/// What happened to one miss
#[derive(Debug)]
pub enum SweepItemOutcome {
    Stored,
    /// Rendered, but the store refused the write
    Uncached,
    Failed(TileError),
    TimedOut,
    /// A newer sweep started while this item was in flight
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub epoch: u64,
    /// Distinct sources in the deck
    pub total_sources: usize,
    pub already_cached: usize,
    /// Misses rendered and stored
    pub processed: usize,
    /// Misses that failed, timed out or could not be stored
    pub failed: usize,
    /// Results discarded because the sweep was superseded
    pub stale: usize,
    /// The sweep stopped early because its epoch went stale
    pub cancelled: bool,
}

/// Distinct sources of a deck, fronts and backs, in first-seen order
pub fn collect_sources(deck: &[PrintEntry<SourceImage>]) -> Vec<SourceImage> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for entry in deck {
        for source in std::iter::once(&entry.front).chain(entry.back.as_ref()) {
            if seen.insert(source.clone()) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

/// Counters shared with detached reset tasks
#[derive(Default)]
struct Shared {
    epoch: AtomicU64,
    /// Epoch of the sweep currently running, zero when idle
    running: AtomicU64,
    current: AtomicUsize,
    total: AtomicUsize,
}

impl Shared {
    fn reset_progress(&self) {
        self.current.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
    }
}

pub struct PrefetchScheduler {
    store: Arc<dyn TileStore>,
    loader: Arc<dyn SourceLoader>,
    processor: TileProcessor,
    config: PipelineConfig,
    shared: Arc<Shared>,
    events: Option<mpsc::UnboundedSender<PrefetchEvent>>,
}

impl PrefetchScheduler {
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
            shared: Arc::new(Shared::default()),
            events: None,
        }
    }

    /// Publish progress events on `tx` in addition to the polled snapshot
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PrefetchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PrefetchState {
        match self.shared.running.load(Ordering::Acquire) {
            0 => PrefetchState::Idle,
            epoch => PrefetchState::Running(epoch),
        }
    }

    pub fn progress(&self) -> PrefetchProgress {
        PrefetchProgress {
            epoch: self.epoch(),
            current: self.shared.current.load(Ordering::Acquire),
            total: self.shared.total.load(Ordering::Acquire),
        }
    }

    /// Invalidate the running sweep without starting another
    pub fn cancel(&self) -> u64 {
        let epoch = self.bump_epoch();
        self.shared.running.store(0, Ordering::Release);
        self.shared.reset_progress();
        log::debug!("Prefetch cancelled, epoch now {}", epoch);
        epoch
    }

    /// Start a new sweep and run it to completion
    pub async fn trigger(
        &self,
        deck: &[PrintEntry<SourceImage>],
        settings: &PrintSettings,
    ) -> SweepReport {
        let epoch = self.begin_sweep();
        self.sweep(epoch, collect_sources(deck), settings).await
    }

    /// Start a new sweep on the runtime. The epoch is bumped and the state
    /// is `Running` before this returns, so older sweeps are already stale
    /// when the call completes.
    pub fn start(
        self: &Arc<Self>,
        deck: &[PrintEntry<SourceImage>],
        settings: &PrintSettings,
    ) -> JoinHandle<SweepReport> {
        let epoch = self.begin_sweep();
        let sources = collect_sources(deck);
        let settings = settings.clone();
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.sweep(epoch, sources, &settings).await })
    }

    /// Re-warm the store if the change affects tile pixels; otherwise no-op
    pub fn on_settings_changed(
        self: &Arc<Self>,
        old: &PrintSettings,
        new: &PrintSettings,
        deck: &[PrintEntry<SourceImage>],
    ) -> Option<JoinHandle<SweepReport>> {
        if !new.tile_settings_changed(old) {
            log::debug!("Settings change does not affect tiles, prefetch untouched");
            return None;
        }
        Some(self.start(deck, new))
    }

    pub fn on_deck_changed(
        self: &Arc<Self>,
        deck: &[PrintEntry<SourceImage>],
        settings: &PrintSettings,
    ) -> JoinHandle<SweepReport> {
        self.start(deck, settings)
    }

    fn bump_epoch(&self) -> u64 {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Bump the epoch and report it as running from the cache check onward
    fn begin_sweep(&self) -> u64 {
        let epoch = self.bump_epoch();
        self.shared.running.store(epoch, Ordering::Release);
        self.shared.reset_progress();
        epoch
    }

    /// Back to `Idle`, unless a newer sweep has taken over
    fn finish_running(&self, epoch: u64) {
        let _ = self
            .shared
            .running
            .compare_exchange(epoch, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn emit(&self, event: PrefetchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    async fn sweep(
        &self,
        epoch: u64,
        sources: Vec<SourceImage>,
        settings: &PrintSettings,
    ) -> SweepReport {
        let params = TileParams::from_settings(settings, &self.config);
        let mut report = SweepReport {
            epoch,
            total_sources: sources.len(),
            ..Default::default()
        };

        let keys: Vec<String> = sources
            .iter()
            .map(|s| params.key_for(s).into_string())
            .collect();
        let cached = match self.store.get_batch(&keys).await {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Prefetch cache check failed, treating all as misses: {}", e);
                HashMap::new()
            }
        };

        let misses: Vec<(SourceImage, String)> = sources
            .into_iter()
            .zip(keys)
            .filter(|(_, key)| !cached.contains_key(key))
            .collect();
        report.already_cached = report.total_sources - misses.len();

        if !self.is_current(epoch) {
            report.cancelled = true;
            self.finish_running(epoch);
            return report;
        }
        if misses.is_empty() {
            log::debug!("Prefetch sweep {}: all {} tiles cached", epoch, report.total_sources);
            self.finish_running(epoch);
            return report;
        }

        log::info!(
            "Prefetch sweep {}: {} of {} tiles missing",
            epoch,
            misses.len(),
            report.total_sources
        );
        self.shared.current.store(0, Ordering::Release);
        self.shared.total.store(misses.len(), Ordering::Release);
        self.emit(PrefetchEvent::Started {
            epoch,
            total: misses.len(),
        });

        let batch_size = self.processor.batch_size(&self.config);
        for (i, batch) in misses.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_yield).await;
            }
            if !self.is_current(epoch) {
                report.cancelled = true;
                break;
            }

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|(source, key)| self.process_item(epoch, source, key, &params)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    SweepItemOutcome::Stored => report.processed += 1,
                    SweepItemOutcome::Stale => report.stale += 1,
                    SweepItemOutcome::Uncached
                    | SweepItemOutcome::Failed(_)
                    | SweepItemOutcome::TimedOut => report.failed += 1,
                }
            }
        }

        if report.stale > 0 {
            report.cancelled = true;
        }

        log::info!(
            "Prefetch sweep {} finished: {} rendered, {} failed, {} stale",
            epoch,
            report.processed,
            report.failed,
            report.stale
        );

        self.finish_running(epoch);
        self.emit(PrefetchEvent::Finished(report));

        if self.is_current(epoch) {
            self.schedule_progress_reset(epoch);
        }

        report
    }

    async fn process_item(
        &self,
        epoch: u64,
        source: &SourceImage,
        key: &str,
        params: &TileParams,
    ) -> SweepItemOutcome {
        let work = async {
            let bitmap = self.loader.load(source).await?;
            self.processor.process(bitmap, params).await
        };

        let outcome = match tokio::time::timeout(self.config.task_timeout, work).await {
            Err(_) => {
                log::warn!("Prefetch skipped {} after {:?}", key, self.config.task_timeout);
                SweepItemOutcome::TimedOut
            }
            Ok(Err(e)) => {
                log::warn!("Prefetch skipped {}: {}", key, e);
                SweepItemOutcome::Failed(e)
            }
            Ok(Ok(tile)) => {
                if !self.is_current(epoch) {
                    log::debug!("Discarding stale tile {} from sweep {}", key, epoch);
                    return SweepItemOutcome::Stale;
                }
                let stored = put_or_log(self.store.as_ref(), key, tile.into_bytes()).await;
                if !self.is_current(epoch) {
                    // Superseded mid-write. The blob is a valid tile for its own
                    // key but the sweep does not count it.
                    log::debug!("Sweep {} superseded while storing {}", epoch, key);
                    return SweepItemOutcome::Stale;
                }
                if stored {
                    SweepItemOutcome::Stored
                } else {
                    SweepItemOutcome::Uncached
                }
            }
        };

        if self.is_current(epoch) {
            let current = self.shared.current.fetch_add(1, Ordering::AcqRel) + 1;
            self.emit(PrefetchEvent::Progress(PrefetchProgress {
                epoch,
                current,
                total: self.shared.total.load(Ordering::Acquire),
            }));
        }

        outcome
    }

    fn schedule_progress_reset(&self, epoch: u64) {
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let grace = self.config.progress_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if shared.epoch.load(Ordering::Acquire) == epoch {
                shared.reset_progress();
                if let Some(tx) = events {
                    let _ = tx.send(PrefetchEvent::Reset { epoch });
                }
            }
        });
    }
}
