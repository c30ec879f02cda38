//! Fixed pool of transcode workers.
//!
//! Each worker is an OS thread that owns its own [`Surface`] and job queue.
//! Bitmaps move into a job on submission and are dropped by the worker, so
//! nothing is shared between workers. Results come back over one-shot
//! channels registered in a pending map keyed by task id.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::PipelineConfig;
use crate::source::DecodedImage;
use crate::transcode::{Surface, TileParams, Transcode};
use crate::types::{Result, Tile, TileError};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Tile>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Job {
    task_id: u64,
    bitmap: DecodedImage,
    params: TileParams,
}

/// A single worker thread and the sending half of its job queue
struct Worker {
    id: usize,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(
        id: usize,
        transcoder: Arc<dyn Transcode>,
        pending: PendingMap,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("proxy-tile-worker-{}", id))
            .spawn(move || Self::run(id, rx, transcoder, pending))?;

        Ok(Self {
            id,
            jobs: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Worker loop. Runs until the job channel closes.
    ///
    /// Jobs whose submission is no longer pending (timed out, or failed by
    /// shutdown) are dropped unprocessed.
    fn run(
        id: usize,
        jobs: mpsc::Receiver<Job>,
        transcoder: Arc<dyn Transcode>,
        pending: PendingMap,
    ) {
        let mut surface = Surface::new();

        while let Ok(job) = jobs.recv() {
            let Job {
                task_id,
                bitmap,
                params,
            } = job;

            if !lock(&pending).contains_key(&task_id) {
                log::debug!("Worker {} skipping abandoned task {}", id, task_id);
                drop(bitmap);
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                transcoder.transcode(&mut surface, bitmap, &params)
            }));
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    // The surface may be half written; start over with a fresh one
                    surface = Surface::new();
                    let message = panic_message(payload.as_ref());
                    log::warn!("Worker {} panicked on task {}: {}", id, task_id, message);
                    Err(TileError::WorkerCrash(message))
                }
            };

            match lock(&pending).remove(&task_id) {
                Some(reply) => {
                    let _ = reply.send(result);
                }
                None => log::debug!("Worker {} dropping result of abandoned task {}", id, task_id),
            }
        }

        log::debug!("Worker {} stopped", id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bounded set of transcode threads with per-task timeouts
pub struct WorkerPool {
    workers: Vec<Worker>,
    pending: PendingMap,
    next_worker: AtomicUsize,
    next_task: AtomicU64,
    timeout: Duration,
    closed: AtomicBool,
    transcoder: Arc<dyn Transcode>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing one transcoder implementation.
    ///
    /// Fails only if not a single thread could be spawned; a partial pool is
    /// kept and logged.
    pub fn new(size: usize, timeout: Duration, transcoder: Arc<dyn Transcode>) -> Result<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let mut workers = Vec::with_capacity(size);
        let mut last_error = None;

        for id in 0..size {
            match Worker::spawn(id, transcoder.clone(), pending.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    log::warn!("Failed to spawn tile worker {}: {}", id, e);
                    last_error = Some(e);
                }
            }
        }

        if workers.is_empty() {
            return Err(match last_error {
                Some(e) => TileError::Io(e),
                None => {
                    TileError::WorkerCrash("Worker pool needs at least one worker".to_string())
                }
            });
        }

        log::debug!("Started {} tile workers", workers.len());

        Ok(Self {
            workers,
            pending,
            next_worker: AtomicUsize::new(0),
            next_task: AtomicU64::new(0),
            timeout,
            closed: AtomicBool::new(false),
            transcoder,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of submissions waiting on a worker
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Transcode `bitmap` on the next worker in round-robin order.
    ///
    /// The bitmap is moved into the job and never comes back. If the worker
    /// does not answer within the pool timeout the submission is abandoned
    /// with [`TileError::WorkerTimeout`]; the worker itself keeps running.
    pub async fn submit(&self, bitmap: DecodedImage, params: TileParams) -> Result<Tile> {
        if self.is_shut_down() {
            return Err(TileError::PoolDestroyed);
        }

        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(task_id, reply_tx);

        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = &self.workers[index];
        let sent = match lock(&worker.jobs).as_ref() {
            Some(jobs) => jobs
                .send(Job {
                    task_id,
                    bitmap,
                    params,
                })
                .is_ok(),
            None => false,
        };

        if !sent {
            lock(&self.pending).remove(&task_id);
            return Err(if self.is_shut_down() {
                TileError::PoolDestroyed
            } else {
                TileError::WorkerCrash(format!("Worker {} is not running", worker.id))
            });
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(if self.is_shut_down() {
                TileError::PoolDestroyed
            } else {
                TileError::WorkerCrash(format!("Worker {} dropped task {}", worker.id, task_id))
            }),
            Err(_) => {
                lock(&self.pending).remove(&task_id);
                log::warn!("Task {} timed out after {:?}", task_id, self.timeout);
                Err(TileError::WorkerTimeout(self.timeout))
            }
        }
    }

    /// Fail all pending submissions, close the queues and join the threads.
    ///
    /// Waits for jobs already running on a worker to finish; queued jobs are
    /// discarded without being transcoded. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending: Vec<_> = lock(&self.pending).drain().collect();
        if !pending.is_empty() {
            log::debug!("Failing {} pending tasks on shutdown", pending.len());
        }
        for (_, reply) in pending {
            let _ = reply.send(Err(TileError::PoolDestroyed));
        }

        for worker in &self.workers {
            lock(&worker.jobs).take();
        }
        for worker in &self.workers {
            let Some(thread) = lock(&worker.thread).take() else {
                continue;
            };
            if thread.join().is_err() {
                log::warn!("Worker {} exited with a panic", worker.id);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Where transcodes run: on the worker pool or inline on the blocking pool
#[derive(Clone)]
pub enum TileProcessor {
    Pool(Arc<WorkerPool>),
    Inline(Arc<dyn Transcode>),
}

impl TileProcessor {
    /// Start a pool per `config`, falling back to inline mode when workers
    /// are disabled or none can be spawned.
    pub fn new(config: &PipelineConfig, transcoder: Arc<dyn Transcode>) -> Self {
        if config.workers == 0 {
            return Self::Inline(transcoder);
        }
        match WorkerPool::new(config.workers, config.task_timeout, transcoder.clone()) {
            Ok(pool) => Self::Pool(Arc::new(pool)),
            Err(e) => {
                log::warn!("Worker pool unavailable, transcoding inline: {}", e);
                Self::Inline(transcoder)
            }
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::Pool(_))
    }

    /// How many items to run at once: one per worker, or the inline batch size
    pub fn batch_size(&self, config: &PipelineConfig) -> usize {
        match self {
            Self::Pool(pool) => pool.size(),
            Self::Inline(_) => config.inline_batch_size.max(1),
        }
    }

    pub async fn process(&self, bitmap: DecodedImage, params: &TileParams) -> Result<Tile> {
        match self {
            Self::Pool(pool) => pool.submit(bitmap, params.clone()).await,
            Self::Inline(transcoder) => {
                run_inline(transcoder.clone(), bitmap, params.clone()).await
            }
        }
    }

    /// Transcode on the blocking pool with a fresh surface, bypassing workers
    pub async fn process_inline(&self, bitmap: DecodedImage, params: &TileParams) -> Result<Tile> {
        run_inline(self.transcoder(), bitmap, params.clone()).await
    }

    fn transcoder(&self) -> Arc<dyn Transcode> {
        match self {
            Self::Pool(pool) => pool.transcoder.clone(),
            Self::Inline(transcoder) => transcoder.clone(),
        }
    }

    pub fn shutdown(&self) {
        if let Self::Pool(pool) = self {
            pool.shutdown();
        }
    }
}

async fn run_inline(
    transcoder: Arc<dyn Transcode>,
    bitmap: DecodedImage,
    params: TileParams,
) -> Result<Tile> {
    tokio::task::spawn_blocking(move || {
        let mut surface = Surface::new();
        transcoder.transcode(&mut surface, bitmap, &params)
    })
    .await
    .map_err(|e| {
        if e.is_panic() {
            TileError::WorkerCrash(panic_message(e.into_panic().as_ref()))
        } else {
            TileError::TaskJoin(e)
        }
    })?
}
