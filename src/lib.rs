//! sprocket: a task-scheduling core for host-driven applications.
//!
//! Splits submitted work between two execution contexts:
//! - **Sync path**: callbacks queued for the host's single-threaded main
//!   loop and drained once per tick via [`Scheduler::drain_tick`]
//! - **Async path**: callbacks run on a bounded pool of background worker
//!   threads with caller-runs backpressure
//!
//! A single timekeeping thread fires delayed and repeating submissions into
//! either path at fixed-rate cadence; it never executes work itself.
//!
//! The host drives the scheduler: construct one [`Scheduler`] at startup,
//! call [`Scheduler::drain_tick`] from the main loop at whatever cadence the
//! host runs, and call [`Scheduler::shutdown`] exactly once at teardown.
//! Delayed and repeating submissions return a cancellable [`TaskHandle`].

pub mod actor;
pub mod config;
pub mod error;
pub mod handle;
pub mod scheduler;

mod job;
mod sync_queue;
mod timer;
mod worker_pool;

pub use actor::{ActorRegistry, SafeActorDispatch};
pub use config::{SchedulerConfig, WorkerPoolConfig};
pub use error::{Result, SchedulerError};
pub use handle::TaskHandle;
pub use scheduler::{Scheduler, SchedulerStats};
