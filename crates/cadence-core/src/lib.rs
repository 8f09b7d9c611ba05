//! Cadence Core - Task Scheduling Engine
//!
//! This crate provides the scheduling core used by the `cadence` binary:
//! - Schedules: one-shot, daily, interval and condition triggers
//! - Engine: a single background worker dispatching due tasks by priority
//! - Store: durable JSON task records that survive restarts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scheduler;

pub use scheduler::{
    RetryPolicy, Schedule, ScheduledTask, SchedulerConfig, SchedulerEngine, SchedulerError,
    SchedulerResult, SchedulerStatus, SchedulerStore, TaskExecutor, TaskFilter, TaskPriority,
    TaskSpec, TaskStatus,
};
