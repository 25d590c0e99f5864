//! Unbounded multi-producer queue feeding the host main loop.

use crate::job::Job;
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Ready-to-run callbacks destined for the host main loop.
///
/// Any thread may push; draining is single-consumer by contract (the host's
/// main-loop thread). The drain loop re-checks emptiness on every pop, so
/// callbacks enqueued while draining (including by an executing callback)
/// run within the same drain.
pub(crate) struct SyncQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl SyncQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A producer handle for routing work into this queue from any thread.
    pub(crate) fn sender(&self) -> Sender<Job> {
        self.tx.clone()
    }

    /// Callbacks currently waiting for the next drain.
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    /// Pop and run every queued callback, isolating failures per callback.
    /// Returns how many callbacks ran.
    pub(crate) fn drain(&self) -> usize {
        let mut ran = 0usize;
        while let Ok(job) = self.rx.try_recv() {
            job.run("sync");
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn push(queue: &SyncQueue, id: u64, work: impl FnOnce() + Send + 'static) {
        queue.sender().send(Job::new(id, Box::new(work))).unwrap();
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = SyncQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = Arc::clone(&order);
            push(&queue, n, move || order.lock().unwrap().push(n));
        }
        assert_eq!(queue.drain(), 4);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reentrant_growth_drains_in_the_same_pass() {
        let queue = SyncQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let tx = queue.sender();

        let order_a = Arc::clone(&order);
        push(&queue, 0, move || {
            order_a.lock().unwrap().push("a");
            let order_c = Arc::clone(&order_a);
            let _ = tx.send(Job::new(
                2,
                Box::new(move || order_c.lock().unwrap().push("c")),
            ));
        });
        let order_b = Arc::clone(&order);
        push(&queue, 1, move || order_b.lock().unwrap().push("b"));

        assert_eq!(queue.drain(), 3);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_producers_all_land() {
        let queue = SyncQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let tx = queue.sender();
                let count = Arc::clone(&count);
                thread::spawn(move || {
                    for n in 0..50 {
                        let count = Arc::clone(&count);
                        let _ = tx.send(Job::new(
                            t * 50 + n,
                            Box::new(move || {
                                count.fetch_add(1, Ordering::SeqCst);
                            }),
                        ));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(queue.drain(), 200);
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn a_panicking_callback_does_not_stop_the_drain() {
        let queue = SyncQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        push(&queue, 0, || panic!("boom"));
        let count_in = Arc::clone(&count);
        push(&queue, 1, move || {
            count_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(queue.drain(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
