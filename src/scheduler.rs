//! Scheduler façade: owns the sync queue, worker pool, and timer service.

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::handle::TaskHandle;
use crate::job::Job;
use crate::sync_queue::SyncQueue;
use crate::timer::{FirePath, TimerService, TimerWork};
use crate::worker_pool::WorkerPool;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Shortest accepted repeat period; zero would re-fire in a hot loop.
const MIN_REPEAT_PERIOD: Duration = Duration::from_millis(1);

/// Handoff targets for routing work into the sync or async path.
///
/// This is the only capability the timer thread receives: it can enqueue,
/// never run. Submissions after shutdown are dropped.
#[derive(Clone)]
pub(crate) struct Dispatch {
    shutdown: Arc<AtomicBool>,
    next_job_id: Arc<AtomicU64>,
    sync_tx: Sender<Job>,
    pool: WorkerPool,
}

impl Dispatch {
    pub(crate) fn submit(&self, path: FirePath, work: Box<dyn FnOnce() + Send>) {
        match path {
            FirePath::Sync => self.submit_sync(work),
            FirePath::Async => self.submit_async(work),
        }
    }

    pub(crate) fn submit_sync(&self, work: Box<dyn FnOnce() + Send>) {
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("sync submission after shutdown; dropping");
            return;
        }
        let job = Job::new(self.next_job_id.fetch_add(1, Ordering::Relaxed), work);
        let _ = self.sync_tx.send(job);
    }

    pub(crate) fn submit_async(&self, work: Box<dyn FnOnce() + Send>) {
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("async submission after shutdown; dropping");
            return;
        }
        let job = Job::new(self.next_job_id.fetch_add(1, Ordering::Relaxed), work);
        self.pool.execute(job);
    }
}

/// Point-in-time scheduler diagnostics for host tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Sync callbacks waiting for the next drain.
    pub queued_sync: usize,
    /// Live worker threads.
    pub live_workers: usize,
    /// Async jobs waiting in the pool backlog.
    pub worker_backlog: usize,
    /// Whether shutdown has been requested.
    pub shut_down: bool,
}

/// The public entry point: routes submitted work to the host main loop or
/// the worker pool, immediately or via the timer.
///
/// One scheduler per host process, constructed at startup and shut down
/// exactly once at teardown. The host drives the sync path by calling
/// [`Scheduler::drain_tick`] from its main-loop thread at its own cadence.
pub struct Scheduler {
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    dispatch: Dispatch,
    sync: SyncQueue,
    pool: WorkerPool,
    timer: TimerService,
}

impl Scheduler {
    /// Build a scheduler, spawning the pool's core threads and the timer
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a thread cannot
    /// be spawned.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let sync = SyncQueue::new();
        let pool = WorkerPool::new(&config.workers, &config.thread_name_prefix)?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let dispatch = Dispatch {
            shutdown: Arc::clone(&shutdown),
            next_job_id: Arc::new(AtomicU64::new(0)),
            sync_tx: sync.sender(),
            pool: pool.clone(),
        };
        let timer = match TimerService::spawn(
            dispatch.clone(),
            format!("{}-timer", config.thread_name_prefix),
        ) {
            Ok(timer) => timer,
            Err(err) => {
                pool.shutdown(Duration::ZERO);
                return Err(err);
            }
        };
        info!(
            "scheduler started ({}..{} workers, backlog {})",
            config.workers.min_threads, config.workers.max_threads, config.workers.backlog_capacity
        );
        Ok(Self {
            config,
            shutdown,
            dispatch,
            sync,
            pool,
            timer,
        })
    }

    /// Queue `work` for the next main-loop drain. FIFO relative to other
    /// `run_sync` calls from the same thread.
    pub fn run_sync(&self, work: impl FnOnce() + Send + 'static) {
        self.dispatch.submit_sync(Box::new(work));
    }

    /// Run `work` on a pool worker thread. Under saturation the work runs
    /// synchronously on the calling thread instead (caller-runs
    /// backpressure).
    pub fn run_async(&self, work: impl FnOnce() + Send + 'static) {
        self.dispatch.submit_async(Box::new(work));
    }

    /// Hand `work` to the sync path after `delay`, unless the returned
    /// handle is cancelled first.
    pub fn run_sync_delayed(
        &self,
        work: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) -> TaskHandle {
        self.schedule_once(FirePath::Sync, Box::new(work), delay)
    }

    /// Hand `work` to the worker pool after `delay`, unless the returned
    /// handle is cancelled first.
    pub fn run_async_delayed(
        &self,
        work: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) -> TaskHandle {
        self.schedule_once(FirePath::Async, Box::new(work), delay)
    }

    /// Hand `work` to the sync path after `initial_delay`, then at
    /// fixed-rate cadence every `period` until the handle is cancelled.
    pub fn run_sync_repeating(
        &self,
        work: impl Fn() + Send + Sync + 'static,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        self.schedule_repeating(FirePath::Sync, Arc::new(work), initial_delay, period)
    }

    /// Hand `work` to the worker pool after `initial_delay`, then at
    /// fixed-rate cadence every `period` until the handle is cancelled.
    pub fn run_async_repeating(
        &self,
        work: impl Fn() + Send + Sync + 'static,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        self.schedule_repeating(FirePath::Async, Arc::new(work), initial_delay, period)
    }

    /// Run every sync callback currently queued, including callbacks those
    /// callbacks enqueue. Called once per tick from the host's main-loop
    /// thread. Callback panics are logged, never rethrown.
    pub fn drain_tick(&self) {
        let ran = self.sync.drain();
        if ran > 0 {
            trace!("drained {ran} sync task(s)");
        }
    }

    /// Shut down: stop the timer and the pool, wait a bounded interval for
    /// in-flight worker jobs, then flush the sync queue one final time.
    /// Idempotent; submissions arriving after this call are silently
    /// dropped.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("scheduler shutting down");
        self.timer.shutdown();
        self.pool.shutdown(self.config.shutdown_wait());
        let flushed = self.sync.drain();
        if flushed > 0 {
            debug!("ran {flushed} sync task(s) during shutdown flush");
        }
    }

    /// Current queue and pool occupancy.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued_sync: self.sync.len(),
            live_workers: self.pool.live_threads(),
            worker_backlog: self.pool.backlog_len(),
            shut_down: self.shutdown.load(Ordering::SeqCst),
        }
    }

    fn schedule_once(
        &self,
        path: FirePath,
        work: Box<dyn FnOnce() + Send>,
        delay: Duration,
    ) -> TaskHandle {
        let handle = TaskHandle::new(false);
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("delayed submission after shutdown; dropping");
            return handle;
        }
        self.timer
            .schedule(path, TimerWork::Once(work), delay, None, handle.clone());
        handle
    }

    fn schedule_repeating(
        &self,
        path: FirePath,
        work: Arc<dyn Fn() + Send + Sync>,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        let handle = TaskHandle::new(true);
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("repeating submission after shutdown; dropping");
            return handle;
        }
        let period = if period < MIN_REPEAT_PERIOD {
            warn!("repeat period {period:?} too small; clamping to {MIN_REPEAT_PERIOD:?}");
            MIN_REPEAT_PERIOD
        } else {
            period
        };
        self.timer.schedule(
            path,
            TimerWork::Repeating(work),
            initial_delay,
            Some(period),
            handle.clone(),
        );
        handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
