//! Worker-pool saturation behavior observed through the scheduler API.

use sprocket::{Scheduler, SchedulerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_pool() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.workers.min_threads = 0;
    config.workers.max_threads = 1;
    config.workers.backlog_capacity = 0;
    config
}

fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn async_tasks_run_on_a_worker_thread() {
    init_logs();
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    scheduler.run_async(move || {
        let _ = tx.send(thread::current().id());
    });
    let worker = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_ne!(worker, thread::current().id());
}

#[test]
fn worker_threads_carry_the_configured_name_prefix() {
    init_logs();
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    scheduler.run_async(move || {
        let _ = tx.send(thread::current().name().map(str::to_owned));
    });
    let name = rx
        .recv_timeout(Duration::from_secs(2))
        .unwrap()
        .unwrap_or_default();
    assert!(
        name.starts_with("sprocket-worker-"),
        "unexpected worker name: {name}"
    );
}

#[test]
fn a_saturated_pool_runs_the_task_on_the_submitting_thread() {
    init_logs();
    let scheduler = Scheduler::new(small_pool()).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    let first_started = Arc::new(AtomicBool::new(false));
    let started = Arc::clone(&first_started);
    scheduler.run_async(move || {
        started.store(true, Ordering::SeqCst);
        let _ = gate_rx.recv();
    });
    assert!(wait_for(
        || first_started.load(Ordering::SeqCst),
        Duration::from_secs(2)
    ));

    let caller = thread::current().id();
    let second_ran_on = Arc::new(Mutex::new(None));
    let ran_on = Arc::clone(&second_ran_on);
    scheduler.run_async(move || {
        *ran_on.lock().unwrap() = Some(thread::current().id());
    });
    // caller-runs: the side effect is already visible when the call returns
    assert_eq!(*second_ran_on.lock().unwrap(), Some(caller));

    gate_tx.send(()).unwrap();
}

#[test]
fn a_panicking_async_task_does_not_kill_its_worker() {
    init_logs();
    let scheduler = Scheduler::new(small_pool()).unwrap();
    scheduler.run_async(|| panic!("boom"));
    thread::sleep(Duration::from_millis(100));

    let (tx, rx) = mpsc::channel();
    scheduler.run_async(move || {
        let _ = tx.send(thread::current().id());
    });
    let worker = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_ne!(worker, thread::current().id());
}

#[test]
fn caller_run_tasks_are_panic_isolated_too() {
    init_logs();
    let scheduler = Scheduler::new(small_pool()).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let first_started = Arc::new(AtomicBool::new(false));
    let started = Arc::clone(&first_started);
    scheduler.run_async(move || {
        started.store(true, Ordering::SeqCst);
        let _ = gate_rx.recv();
    });
    assert!(wait_for(
        || first_started.load(Ordering::SeqCst),
        Duration::from_secs(2)
    ));

    // runs on this thread under saturation; the panic must not escape
    scheduler.run_async(|| panic!("boom"));

    gate_tx.send(()).unwrap();
}
