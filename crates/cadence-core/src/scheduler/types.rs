//! Scheduler task types and error definitions
//!
//! Contains the task record, its lifecycle state machine, and the error type
//! shared by the scheduler modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backoff::RetryPolicy;
use super::triggers::Schedule;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Default retry budget for new tasks
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default execution timeout for new tasks
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// A task with the same ID already exists
    #[error("task already exists: {0}")]
    DuplicateTask(String),
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Declared but unimplemented feature
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Operation not allowed in the task's current state
    #[error("cannot {action} task {id} while {from}")]
    InvalidTransition {
        /// Task ID
        id: String,
        /// Current status
        from: TaskStatus,
        /// Requested operation
        action: &'static str,
    },
    /// Task execution error
    #[error("execution error: {0}")]
    Execution(String),
    /// Task execution exceeded its deadline
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Task priority; lower value dispatches first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskPriority {
    /// Run immediately
    Critical = 1,
    /// Run soon
    High = 2,
    /// Normal priority
    #[default]
    Medium = 3,
    /// Run when idle
    Low = 4,
}

impl From<TaskPriority> for u8 {
    fn from(priority: TaskPriority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for TaskPriority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Medium),
            4 => Ok(Self::Low),
            other => Err(format!("invalid priority {} (expected 1-4)", other)),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "1" => Ok(Self::Critical),
            "high" | "2" => Ok(Self::High),
            "medium" | "3" => Ok(Self::Medium),
            "low" | "4" => Ok(Self::Low),
            other => Err(SchedulerError::InvalidConfig(format!(
                "unknown priority: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for `next_run`
    Pending,
    /// Currently executing
    Running,
    /// One-shot task finished successfully
    Completed,
    /// Retries exhausted
    Failed,
    /// Cancelled by a caller
    Cancelled,
    /// Paused by a caller
    Paused,
}

impl TaskStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [TaskStatus; 6] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Paused,
    ];

    /// No automatic transitions leave a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "paused" => Ok(Self::Paused),
            other => Err(SchedulerError::InvalidConfig(format!(
                "unknown status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Outcome of a single execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Executor returned a result
    Completed,
    /// Executor returned an error
    Failed,
    /// Executor exceeded the task timeout
    TimedOut,
}

/// Run history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// When the execution finished
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub outcome: RunOutcome,
    /// Result or error message
    pub detail: String,
    /// Retry count after a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Request to create a task
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Caller-assigned ID; generated when `None`
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Command handed to the executor
    pub command: String,
    /// When to run
    pub schedule: Schedule,
    /// Dispatch priority
    pub priority: TaskPriority,
    /// Opaque external reference
    pub correlation_id: Option<String>,
    /// Retry budget
    pub max_retries: u32,
    /// Execution deadline in seconds (0 = none)
    pub timeout_seconds: u64,
}

impl TaskSpec {
    /// Create a spec with default priority and bounds
    pub fn new(name: impl Into<String>, command: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            id: None,
            name: name.into(),
            command: command.into(),
            schedule,
            priority: TaskPriority::default(),
            correlation_id: None,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set task ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set task priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Reject specs that would fail later at dispatch time
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.id {
            validate_task_id(id)?;
        }
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "task name must not be empty".to_string(),
            ));
        }
        if self.command.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "task command must not be empty".to_string(),
            ));
        }
        self.schedule.validate()
    }
}

/// IDs double as record file names
pub fn validate_task_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id.len() > 128
        || id.starts_with('.')
        || id.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(SchedulerError::InvalidConfig(format!(
            "invalid task id: {:?}",
            id
        )));
    }
    Ok(())
}

/// Scheduled task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    /// Unique task ID
    pub id: String,
    /// Human-readable task name
    pub name: String,
    /// Opaque command handed to the executor
    pub command: String,
    /// Schedule kind and config
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Dispatch priority
    #[serde(default)]
    pub priority: TaskPriority,
    /// Opaque external reference
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Retry budget
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Execution deadline in seconds (0 = none)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Consecutive failures since the last success
    #[serde(default)]
    pub retry_count: u32,
    /// Last execution start
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Next due instant; `None` means never again
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    /// Last successful result
    #[serde(default)]
    pub last_result: Option<String>,
    /// Last error
    #[serde(default)]
    pub last_error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Execution history, oldest first
    #[serde(default)]
    pub run_history: Vec<RunRecord>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ScheduledTask {
    /// Build a pending task from a spec and compute its first `next_run`
    pub fn new(spec: TaskSpec, now: DateTime<Utc>) -> Self {
        let next_run = spec.schedule.next_run(None, now);
        Self {
            id: spec
                .id
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            name: spec.name,
            command: spec.command,
            schedule: spec.schedule,
            priority: spec.priority,
            correlation_id: spec.correlation_id,
            max_retries: spec.max_retries,
            timeout_seconds: spec.timeout_seconds,
            status: TaskStatus::Pending,
            retry_count: 0,
            last_run: None,
            next_run,
            last_result: None,
            last_error: None,
            created_at: now,
            run_history: Vec::new(),
        }
    }

    /// Pending with `next_run` at or before `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.next_run.is_some_and(|next| next <= now)
    }

    /// `Pending → Running`
    pub fn mark_started(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid("start"));
        }
        self.status = TaskStatus::Running;
        self.last_run = Some(now);
        Ok(())
    }

    /// `Running → Pending` (recurring) or `Running → Completed`
    pub fn mark_completed(&mut self, result: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let result = result.into();
        self.ensure_finishable("complete")?;

        self.run_history.push(RunRecord {
            timestamp: now,
            outcome: RunOutcome::Completed,
            detail: result.clone(),
            retry_count: None,
        });
        self.last_result = Some(result);
        self.retry_count = 0;

        // Cancelled mid-flight: keep the outcome, not the reschedule
        if self.status == TaskStatus::Cancelled {
            return Ok(());
        }

        if self.schedule.is_recurring() {
            self.status = TaskStatus::Pending;
            self.next_run = self.schedule.next_run(self.last_run, now);
        } else {
            self.status = TaskStatus::Completed;
            self.next_run = None;
        }
        Ok(())
    }

    /// `Running → Pending` after backoff, or `Running → Failed` once `retry_count` reaches `max_retries`
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<()> {
        self.record_failure(error.into(), RunOutcome::Failed, now, policy)
    }

    /// Same as [`mark_failed`](Self::mark_failed), recorded as a timeout
    pub fn mark_timed_out(
        &mut self,
        limit_secs: u64,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<()> {
        let error = SchedulerError::Timeout(limit_secs).to_string();
        self.record_failure(error, RunOutcome::TimedOut, now, policy)
    }

    fn record_failure(
        &mut self,
        error: String,
        outcome: RunOutcome,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<()> {
        self.ensure_finishable("fail")?;

        // The failure that reaches the budget is the last one
        self.retry_count = self.retry_count.saturating_add(1);
        let retrying = self.retry_count < self.max_retries;

        self.run_history.push(RunRecord {
            timestamp: now,
            outcome,
            detail: error.clone(),
            retry_count: Some(self.retry_count),
        });
        self.last_error = Some(error);

        if self.status == TaskStatus::Cancelled {
            return Ok(());
        }

        if retrying {
            self.status = TaskStatus::Pending;
            self.next_run = now.checked_add_signed(policy.delay(self.retry_count));
        } else {
            self.status = TaskStatus::Failed;
            self.next_run = None;
        }
        Ok(())
    }

    /// Any non-terminal status → `Cancelled`; no-op when already cancelled
    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            TaskStatus::Cancelled => Ok(()),
            TaskStatus::Completed | TaskStatus::Failed => Err(self.invalid("cancel")),
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Paused => {
                self.status = TaskStatus::Cancelled;
                Ok(())
            }
        }
    }

    /// `Pending → Paused`; no-op when already paused
    pub fn pause(&mut self) -> Result<()> {
        match self.status {
            TaskStatus::Paused => Ok(()),
            TaskStatus::Pending => {
                self.status = TaskStatus::Paused;
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// `Paused → Pending` with a freshly computed `next_run`; no-op when pending
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            TaskStatus::Pending => Ok(()),
            TaskStatus::Paused => {
                self.status = TaskStatus::Pending;
                self.next_run = self.schedule.next_run(self.last_run, now);
                Ok(())
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// Drop the oldest history entries beyond `limit`
    pub fn trim_history(&mut self, limit: usize) {
        if self.run_history.len() > limit {
            let excess = self.run_history.len() - limit;
            self.run_history.drain(..excess);
        }
    }

    fn ensure_finishable(&self, action: &'static str) -> Result<()> {
        match self.status {
            TaskStatus::Running | TaskStatus::Cancelled => Ok(()),
            _ => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> SchedulerError {
        SchedulerError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests;
