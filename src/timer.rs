//! Timekeeping thread for delayed and repeating handoffs.
//!
//! The timer thread never executes submitted work itself: every fire hands
//! the callback to the sync queue or the worker pool through [`Dispatch`],
//! and repeating entries re-arm at fixed-rate cadence from the scheduled
//! instant of the previous firing.

use crate::error::{Result, SchedulerError};
use crate::handle::TaskHandle;
use crate::scheduler::Dispatch;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Which execution context a fired task is handed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FirePath {
    Sync,
    Async,
}

/// The work carried by a timer entry.
pub(crate) enum TimerWork {
    Once(Box<dyn FnOnce() + Send>),
    Repeating(Arc<dyn Fn() + Send + Sync>),
}

struct TimerEntry {
    /// Scheduled instant of this firing.
    deadline: Instant,
    period: Option<Duration>,
    path: FirePath,
    handle: TaskHandle,
    work: TimerWork,
    /// Insertion order, used to break ties between equal deadlines.
    seq: u64,
}

impl TimerEntry {
    /// The follow-up entry for a repeating task, armed at fixed-rate cadence
    /// from this firing's scheduled instant. One-shot entries have none.
    fn re_armed(&self) -> Option<TimerEntry> {
        let period = self.period?;
        match &self.work {
            TimerWork::Once(_) => None,
            TimerWork::Repeating(work) => Some(TimerEntry {
                deadline: self.deadline + period,
                period: Some(period),
                path: self.path,
                handle: self.handle.clone(),
                work: TimerWork::Repeating(Arc::clone(work)),
                seq: self.seq,
            }),
        }
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // BinaryHeap is a max-heap; invert so the earliest deadline pops first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Fire one due entry: check cancellation immediately before handing off,
/// then hand the work to its path and return the re-armed follow-up entry
/// for repeating tasks.
fn fire(entry: TimerEntry, dispatch: &Dispatch) -> Option<TimerEntry> {
    if entry.handle.is_cancelled() {
        debug!("dropping cancelled timer entry");
        return None;
    }
    let next = entry.re_armed();
    match entry.work {
        TimerWork::Once(work) => dispatch.submit(entry.path, work),
        TimerWork::Repeating(work) => {
            dispatch.submit(entry.path, Box::new(move || (*work)()));
        }
    }
    next
}

/// Handle to the timekeeping thread.
pub(crate) struct TimerService {
    shared: Arc<TimerShared>,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

struct TimerState {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

impl TimerService {
    pub(crate) fn spawn(dispatch: Dispatch, thread_name: String) -> Result<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });
        let loop_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || timer_loop(&loop_shared, &dispatch))
            .map_err(|err| SchedulerError::Spawn(format!("timer thread: {err}")))?;
        Ok(Self { shared })
    }

    /// Arm a new entry. Dropped silently when the timer is shut down.
    pub(crate) fn schedule(
        &self,
        path: FirePath,
        work: TimerWork,
        delay: Duration,
        period: Option<Duration>,
        handle: TaskHandle,
    ) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if state.shutdown {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(TimerEntry {
            deadline: Instant::now() + delay,
            period,
            path,
            handle,
            work,
            seq,
        });
        self.shared.wakeup.notify_one();
    }

    /// Stop the timekeeping thread. Armed entries are discarded; the thread
    /// exits at its next wakeup and is not joined.
    pub(crate) fn shutdown(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
            state.heap.clear();
        }
        self.shared.wakeup.notify_all();
    }
}

fn timer_loop(shared: &TimerShared, dispatch: &Dispatch) {
    let Ok(mut state) = shared.state.lock() else {
        return;
    };
    loop {
        if state.shutdown {
            break;
        }
        match state.heap.peek().map(|entry| entry.deadline) {
            None => {
                state = match shared.wakeup.wait(state) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            Some(deadline) => {
                let until = deadline.saturating_duration_since(Instant::now());
                if until.is_zero() {
                    let Some(entry) = state.heap.pop() else {
                        continue;
                    };
                    // Hand off with the lock released; under a saturated
                    // pool the async handoff degrades to running the job on
                    // this thread.
                    drop(state);
                    let next = fire(entry, dispatch);
                    state = match shared.state.lock() {
                        Ok(guard) => guard,
                        Err(_) => return,
                    };
                    if let Some(next) = next {
                        if !state.shutdown {
                            state.heap.push(next);
                        }
                    }
                } else {
                    state = match shared.wakeup.wait_timeout(state, until) {
                        Ok((guard, _)) => guard,
                        Err(_) => return,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn repeating_entry(deadline: Instant, period: Duration, seq: u64) -> TimerEntry {
        TimerEntry {
            deadline,
            period: Some(period),
            path: FirePath::Sync,
            handle: TaskHandle::new(true),
            work: TimerWork::Repeating(Arc::new(|| {})),
            seq,
        }
    }

    #[test]
    fn re_arm_follows_fixed_rate_cadence() {
        let start = Instant::now();
        let period = Duration::from_millis(50);
        let mut entry = repeating_entry(start, period, 0);
        // Firing instants are start + k * period, independent of how long
        // each handed-off task takes.
        for k in 1..=8u32 {
            entry = entry.re_armed().unwrap();
            assert_eq!(entry.deadline, start + period * k);
        }
    }

    #[test]
    fn one_shot_entries_do_not_re_arm() {
        let entry = TimerEntry {
            deadline: Instant::now(),
            period: None,
            path: FirePath::Async,
            handle: TaskHandle::new(false),
            work: TimerWork::Once(Box::new(|| {})),
            seq: 0,
        };
        assert!(entry.re_armed().is_none());
    }

    #[test]
    fn re_armed_entries_share_the_same_handle() {
        let entry = repeating_entry(Instant::now(), Duration::from_millis(10), 0);
        let next = entry.re_armed().unwrap();
        entry.handle.cancel();
        assert!(next.handle.is_cancelled());
    }

    #[test]
    fn heap_pops_the_earliest_deadline_first() {
        let start = Instant::now();
        let period = Duration::from_millis(10);
        let mut heap = BinaryHeap::new();
        heap.push(repeating_entry(start + Duration::from_millis(30), period, 0));
        heap.push(repeating_entry(start + Duration::from_millis(10), period, 1));
        heap.push(repeating_entry(start + Duration::from_millis(20), period, 2));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn equal_deadlines_pop_in_insertion_order() {
        let deadline = Instant::now() + Duration::from_millis(5);
        let mut heap = BinaryHeap::new();
        for seq in 0..4 {
            heap.push(repeating_entry(deadline, Duration::from_millis(10), seq));
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
