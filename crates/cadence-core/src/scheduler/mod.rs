//! Task scheduler
//!
//! Runs named shell-level commands on a schedule, in priority order, with
//! retry backoff and durable per-task state:
//!
//! - **Once**: a single run at a fixed instant
//! - **Daily**: every day at a wall-clock time (UTC)
//! - **Interval**: every N seconds, minutes, hours, days or weeks
//! - **Condition**: re-armed every minute; the executor evaluates the predicate
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ SchedulerEngine │  Dispatch loop, lifecycle API
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  ScheduledTask  │  State machine, retry bookkeeping
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Schedule     │  Next-run calculation
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ SchedulerStore  │  One JSON file per task
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::scheduler::{
//!     IntervalUnit, Schedule, SchedulerConfig, SchedulerEngine, SchedulerStore, TaskSpec,
//! };
//!
//! let store = SchedulerStore::from_path(&tasks_dir)?;
//! let engine = Arc::new(
//!     SchedulerEngine::builder()
//!         .store(store)
//!         .config(SchedulerConfig::new().with_check_interval(10))
//!         .executor(executor)
//!         .build()?,
//! );
//!
//! engine
//!     .create_task(TaskSpec::new(
//!         "rotate_logs",
//!         "logrotate /etc/logrotate.conf",
//!         Schedule::interval(6, IntervalUnit::Hours),
//!     ))
//!     .await?;
//!
//! engine.start();
//! // ...
//! engine.stop().await;
//! ```

mod backoff;
mod engine;
mod store;
mod triggers;
mod types;

pub use backoff::{RetryPolicy, DEFAULT_BASE_DELAY_SECS};
pub use engine::{
    SchedulerConfig, SchedulerEngine, SchedulerEngineBuilder, SchedulerStatus, TaskExecutionFuture,
    TaskExecutor, TaskFilter,
};
pub use store::SchedulerStore;
pub use triggers::{
    ConditionTrigger, CronTrigger, DailyTrigger, IntervalTrigger, IntervalUnit, OnceTrigger,
    Schedule, CONDITION_POLL_SECS,
};
pub use types::{
    validate_task_id, Result as SchedulerResult, RunOutcome, RunRecord, ScheduledTask,
    SchedulerError, TaskPriority, TaskSpec, TaskStatus, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS,
};
