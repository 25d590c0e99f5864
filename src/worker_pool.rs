//! Bounded pool of background worker threads with caller-runs backpressure.

use crate::config::WorkerPoolConfig;
use crate::error::{Result, SchedulerError};
use crate::job::Job;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Handle to the worker pool. Clones share the same pool.
#[derive(Clone)]
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    name_prefix: String,
    /// Taken (and thereby disconnected) on shutdown.
    backlog_tx: Mutex<Option<Sender<Job>>>,
    backlog_rx: Receiver<Job>,
    state: Mutex<PoolState>,
    /// Signalled when the live-thread count reaches zero.
    drained: Condvar,
}

#[derive(Default)]
struct PoolState {
    live: usize,
    spawned_total: usize,
}

impl WorkerPool {
    pub(crate) fn new(config: &WorkerPoolConfig, name_prefix: &str) -> Result<Self> {
        let (tx, rx) = bounded(config.backlog_capacity);
        let pool = Self {
            inner: Arc::new(PoolInner {
                min_threads: config.min_threads,
                max_threads: config.max_threads,
                idle_timeout: config.idle_timeout(),
                name_prefix: name_prefix.to_owned(),
                backlog_tx: Mutex::new(Some(tx)),
                backlog_rx: rx,
                state: Mutex::new(PoolState::default()),
                drained: Condvar::new(),
            }),
        };
        // Core threads stay alive for the pool's whole lifetime.
        for _ in 0..config.min_threads {
            if let Err(err) = pool.spawn_core_worker() {
                pool.shutdown(Duration::ZERO);
                return Err(err);
            }
        }
        Ok(pool)
    }

    /// Submit a job. Hands it to an idle worker or a free backlog slot,
    /// grows the pool up to its ceiling, and otherwise runs the job
    /// synchronously on the calling thread (caller-runs backpressure).
    pub(crate) fn execute(&self, job: Job) {
        let tx = {
            let Ok(guard) = self.inner.backlog_tx.lock() else {
                return;
            };
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    debug!("worker pool is shut down; dropping task #{}", job.id());
                    return;
                }
            }
        };
        match tx.try_send(job) {
            Ok(()) => self.ensure_worker(),
            Err(TrySendError::Full(job)) => match self.try_spawn_worker(job) {
                Ok(()) => {}
                Err(job) => {
                    debug!(
                        "worker pool saturated; running task #{} on the submitting thread",
                        job.id()
                    );
                    job.run("caller");
                }
            },
            Err(TrySendError::Disconnected(job)) => {
                debug!("worker pool is shut down; dropping task #{}", job.id());
            }
        }
    }

    /// Stop accepting work, then wait up to `wait` for live workers to
    /// finish. Workers still busy after the wait are detached; Rust offers
    /// no way to terminate them.
    pub(crate) fn shutdown(&self, wait: Duration) {
        {
            let Ok(mut tx) = self.inner.backlog_tx.lock() else {
                return;
            };
            if tx.take().is_none() {
                return;
            }
        }
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        let deadline = Instant::now() + wait;
        while state.live > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    "{} worker thread(s) still busy after shutdown wait; detaching",
                    state.live
                );
                return;
            }
            state = match self.inner.drained.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return,
            };
        }
    }

    pub(crate) fn live_threads(&self) -> usize {
        self.inner.state.lock().map(|state| state.live).unwrap_or(0)
    }

    pub(crate) fn backlog_len(&self) -> usize {
        self.inner.backlog_rx.len()
    }

    fn spawn_core_worker(&self) -> Result<()> {
        let id = match self.reserve_worker_slot() {
            Some(id) => id,
            None => return Ok(()),
        };
        self.spawn_thread(id, Arc::new(Mutex::new(None)), true)
            .map_err(|err| {
                self.inner.note_worker_exit();
                SchedulerError::Spawn(format!("worker thread: {err}"))
            })
    }

    /// Spawn one extra worker seeded with `job`. Returns the job back to the
    /// caller when the pool is at its ceiling or the OS refuses a thread.
    fn try_spawn_worker(&self, job: Job) -> std::result::Result<(), Job> {
        let Some(id) = self.reserve_worker_slot() else {
            return Err(job);
        };
        let seed = Arc::new(Mutex::new(Some(job)));
        match self.spawn_thread(id, Arc::clone(&seed), false) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.note_worker_exit();
                error!("failed to spawn worker thread: {err}");
                match seed.lock() {
                    Ok(mut slot) => match slot.take() {
                        Some(job) => Err(job),
                        None => Ok(()),
                    },
                    Err(_) => Ok(()),
                }
            }
        }
    }

    /// Spawn an unseeded worker when a job was queued while no worker was
    /// live, so backlogged work never sits without a consumer.
    fn ensure_worker(&self) {
        let id = {
            let Ok(mut state) = self.inner.state.lock() else {
                return;
            };
            if state.live > 0 {
                return;
            }
            state.live += 1;
            state.spawned_total += 1;
            state.spawned_total
        };
        if let Err(err) = self.spawn_thread(id, Arc::new(Mutex::new(None)), false) {
            self.inner.note_worker_exit();
            error!("failed to spawn worker thread: {err}");
        }
    }

    /// Claim a live-thread slot under the ceiling, returning the worker id.
    fn reserve_worker_slot(&self) -> Option<usize> {
        let Ok(mut state) = self.inner.state.lock() else {
            return None;
        };
        if state.live >= self.inner.max_threads {
            return None;
        }
        state.live += 1;
        state.spawned_total += 1;
        Some(state.spawned_total)
    }

    fn spawn_thread(
        &self,
        id: usize,
        seed: Arc<Mutex<Option<Job>>>,
        keep_alive: bool,
    ) -> std::io::Result<()> {
        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name(format!("{}-worker-{id}", self.inner.name_prefix))
            .spawn(move || {
                if let Some(job) = seed.lock().ok().and_then(|mut slot| slot.take()) {
                    job.run("worker");
                }
                inner.worker_loop(keep_alive);
            })
            .map(|_| ())
    }
}

impl PoolInner {
    fn worker_loop(&self, keep_alive: bool) {
        loop {
            let job = if keep_alive {
                match self.backlog_rx.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            } else {
                match self.backlog_rx.recv_timeout(self.idle_timeout) {
                    Ok(job) => job,
                    Err(RecvTimeoutError::Timeout) => {
                        if self.try_retire() {
                            return;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };
            job.run("worker");
        }
        self.note_worker_exit();
    }

    /// Retire an idle thread above the pool minimum. The decision and the
    /// live-count decrement happen under one lock, so concurrent timeouts
    /// cannot shrink the pool below the minimum.
    fn try_retire(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if !self.backlog_rx.is_empty() {
            return false;
        }
        if state.live > self.min_threads {
            state.live -= 1;
            debug!("idle worker retired ({} live)", state.live);
            if state.live == 0 {
                self.drained.notify_all();
            }
            true
        } else {
            false
        }
    }

    fn note_worker_exit(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.live = state.live.saturating_sub(1);
            if state.live == 0 {
                self.drained.notify_all();
            }
        }
    }
}
