//! Scheduler execution engine
//!
//! Owns the task collection and runs the dispatch loop:
//! - Polls for due tasks on a fixed interval
//! - Dispatches them one at a time in priority order
//! - Applies retry backoff and optional execution timeouts
//! - Persists every state change
//!
//! All access to the task collection goes through a single `RwLock`. The
//! lock is never held while the executor runs, so API calls stay responsive
//! during long tasks. Dispatch is strictly sequential: a slow task delays
//! every task queued behind it.

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::RetryPolicy;
use super::store::SchedulerStore;
use super::types::{
    Result, ScheduledTask, SchedulerError, TaskPriority, TaskSpec, TaskStatus,
};

/// Callback type for executing task commands
pub type TaskExecutor = Arc<dyn Fn(String) -> TaskExecutionFuture + Send + Sync>;

/// Future type for task execution
pub type TaskExecutionFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send>>;

/// Result recorded when no executor is wired up
const NO_EXECUTOR_RESULT: &str = "no execution callback configured";

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between dispatch passes
    pub check_interval_secs: u64,
    /// Pause after a dispatch pass blows up
    pub error_cooldown_secs: u64,
    /// Backoff applied to failed executions
    pub retry: RetryPolicy,
    /// Run history entries kept per task
    pub history_limit: usize,
    /// Abort executions that exceed the task's `timeout_seconds`
    pub enforce_timeouts: bool,
    /// How long `stop()` waits for the in-flight task
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            error_cooldown_secs: 30,
            retry: RetryPolicy::default(),
            history_limit: 100,
            enforce_timeouts: true,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set check interval
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    /// Set loop error cooldown
    pub fn with_error_cooldown(mut self, secs: u64) -> Self {
        self.error_cooldown_secs = secs;
        self
    }

    /// Set retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set history limit
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Enable or disable timeout enforcement
    pub fn with_enforce_timeouts(mut self, enforce: bool) -> Self {
        self.enforce_timeouts = enforce;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

/// Filter for [`SchedulerEngine::list_tasks`]
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks in this status
    pub status: Option<TaskStatus>,
    /// Only tasks with this correlation ID
    pub correlation_id: Option<String>,
    /// Only tasks with this priority
    pub priority: Option<TaskPriority>,
}

impl TaskFilter {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by status
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Filter by priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    fn matches(&self, task: &ScheduledTask) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self
                .correlation_id
                .as_deref()
                .is_none_or(|c| task.correlation_id.as_deref() == Some(c))
            && self.priority.is_none_or(|p| task.priority == p)
    }
}

/// Snapshot returned by [`SchedulerEngine::status`]
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether the dispatch loop is running
    pub running: bool,
    /// Total number of tasks
    pub total: usize,
    /// Task count for every status
    pub by_status: BTreeMap<TaskStatus, usize>,
    /// Next pending tasks by due time
    pub upcoming: Vec<ScheduledTask>,
}

/// What came back from one executor call
#[derive(Debug)]
enum ExecutionOutcome {
    Completed(String),
    Failed(String),
    TimedOut(u64),
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Task the dispatcher has marked `Running` and not yet settled
struct Claim {
    task_id: String,
    execution: Option<AbortHandle>,
}

/// Scheduler engine for executing scheduled tasks
pub struct SchedulerEngine {
    store: SchedulerStore,
    config: SchedulerConfig,
    tasks: RwLock<HashMap<String, ScheduledTask>>,
    executor: Option<TaskExecutor>,
    worker: Mutex<Option<Worker>>,
    claim: Mutex<Option<Claim>>,
}

impl SchedulerEngine {
    /// Open an engine over `store`, loading every persisted task.
    ///
    /// Tasks persisted as `Running` were interrupted by a restart; they go
    /// back to `Pending` and run again on the next pass.
    pub fn open(store: SchedulerStore, config: SchedulerConfig) -> Result<Self> {
        let now = Utc::now();
        let mut tasks = HashMap::new();

        for mut task in store.load_all()? {
            if recover_task(&mut task, now) {
                if let Err(e) = store.save(&task) {
                    warn!(task_id = %task.id, "Failed to persist recovered task: {}", e);
                }
            }
            tasks.insert(task.id.clone(), task);
        }

        info!(
            "Loaded {} scheduled tasks from {}",
            tasks.len(),
            store.dir().display()
        );

        Ok(Self {
            store,
            config,
            tasks: RwLock::new(tasks),
            executor: None,
            worker: Mutex::new(None),
            claim: Mutex::new(None),
        })
    }

    /// Start building an engine
    pub fn builder() -> SchedulerEngineBuilder {
        SchedulerEngineBuilder::new()
    }

    /// Set the task executor callback
    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate, schedule and persist a new task
    pub async fn create_task(&self, spec: TaskSpec) -> Result<ScheduledTask> {
        spec.validate()?;
        let task = ScheduledTask::new(spec, Utc::now());

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }

        self.persist(&task);
        tasks.insert(task.id.clone(), task.clone());
        drop(tasks);

        match task.next_run {
            Some(next) => info!(
                task_id = %task.id,
                "Created task {} ({}), next run {}",
                task.name,
                task.schedule,
                next.to_rfc3339()
            ),
            None => warn!(
                task_id = %task.id,
                "Created task {} but it will never run ({})",
                task.name,
                task.schedule
            ),
        }
        Ok(task)
    }

    /// Get task by ID
    pub async fn get_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))
    }

    /// List tasks matching `filter`, in dispatch order
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        tasks.sort_by(dispatch_order);
        tasks
    }

    /// Cancel a task; in-flight executions are not interrupted
    pub async fn cancel_task(&self, task_id: &str) -> Result<ScheduledTask> {
        let task = self.update_task(task_id, |task| task.cancel()).await?;
        info!(task_id = %task_id, "Task cancelled");
        Ok(task)
    }

    /// Pause a pending task
    pub async fn pause_task(&self, task_id: &str) -> Result<ScheduledTask> {
        let task = self.update_task(task_id, |task| task.pause()).await?;
        info!(task_id = %task_id, "Task paused");
        Ok(task)
    }

    /// Resume a paused task
    pub async fn resume_task(&self, task_id: &str) -> Result<ScheduledTask> {
        let now = Utc::now();
        let task = self.update_task(task_id, |task| task.resume(now)).await?;
        info!(task_id = %task_id, "Task resumed");
        Ok(task)
    }

    /// Remove a task from memory and from the store
    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(task_id) {
            return Err(SchedulerError::TaskNotFound(task_id.to_string()));
        }
        self.store.delete(task_id)?;
        tasks.remove(task_id);
        info!(task_id = %task_id, "Task deleted");
        Ok(())
    }

    /// Counts by status plus the next `upcoming` pending tasks
    pub async fn status(&self, upcoming: usize) -> SchedulerStatus {
        let tasks = self.tasks.read().await;

        let mut by_status: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in tasks.values() {
            *by_status.entry(task.status).or_default() += 1;
        }

        let mut pending: Vec<&ScheduledTask> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.next_run.is_some())
            .collect();
        pending.sort_by(|a, b| a.next_run.cmp(&b.next_run).then_with(|| dispatch_order(a, b)));

        SchedulerStatus {
            running: self.is_running(),
            total: tasks.len(),
            by_status,
            upcoming: pending.into_iter().take(upcoming).cloned().collect(),
        }
    }

    /// Whether the background worker is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Spawn the dispatch loop on the current tokio runtime.
    ///
    /// Calling `start` while the loop is running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("Scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { engine.run(token).await });
        *worker = Some(Worker { shutdown, handle });
    }

    /// Stop the dispatch loop.
    ///
    /// Waits up to `shutdown_timeout_secs` for the task in flight, then aborts
    /// the worker and its execution. An aborted task goes back to `Pending`.
    /// Calling `stop` when not running does nothing.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Worker { shutdown, mut handle }) = worker else {
            return;
        };

        shutdown.cancel();
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Scheduler worker ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Timed out after {}s waiting for the running task; aborting worker",
                    self.config.shutdown_timeout_secs
                );
                handle.abort();
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("Scheduler worker ended abnormally: {}", e);
                    }
                }
                self.requeue_claimed().await;
            }
        }
    }

    /// Abort the execution of an interrupted claim and requeue its task
    async fn requeue_claimed(&self) {
        let claim = self
            .claim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(claim) = claim else {
            return;
        };
        if let Some(execution) = claim.execution {
            execution.abort();
        }

        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&claim.task_id) {
            if recover_task(task, Utc::now()) {
                self.persist(task);
            }
        }
    }

    /// Run the dispatch loop until `shutdown` is cancelled.
    ///
    /// The first pass happens immediately. A panic escaping a pass is logged
    /// and followed by `error_cooldown_secs` before polling resumes.
    pub async fn run(&self, shutdown: CancellationToken) {
        let token = &shutdown;
        self.drive(token, move |now| self.dispatch_pass(now, Some(token)))
            .await;
    }

    /// Poll loop around `pass`
    async fn drive<F, Fut>(&self, shutdown: &CancellationToken, mut pass: F)
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = usize>,
    {
        info!(
            "Scheduler engine starting (check interval: {}s)",
            self.config.check_interval_secs
        );

        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = AssertUnwindSafe(pass(Utc::now())).catch_unwind().await;

            match outcome {
                Ok(0) => debug!("No tasks due for execution"),
                Ok(count) => debug!("Dispatch pass executed {} tasks", count),
                Err(panic) => {
                    error!(
                        "Scheduler pass failed: {}; resuming in {}s",
                        panic_message(panic.as_ref()),
                        self.config.error_cooldown_secs
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(self.config.error_cooldown_secs)) => {}
                    }
                    ticker.reset();
                }
            }
        }

        info!("Scheduler engine stopped");
    }

    /// Run one dispatch pass as of `now`; returns how many tasks executed
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> usize {
        self.dispatch_pass(now, None).await
    }

    async fn dispatch_pass(&self, now: DateTime<Utc>, shutdown: Option<&CancellationToken>) -> usize {
        let due = self.collect_due(now).await;
        if due.is_empty() {
            return 0;
        }

        debug!("Dispatching {} due tasks", due.len());
        let pass_started = Instant::now();
        let mut executed = 0;

        for task_id in due {
            if shutdown.is_some_and(|token| token.is_cancelled()) {
                info!("Stop requested; remaining due tasks wait for the next start");
                break;
            }
            let started_at = now + elapsed_since(pass_started);
            if self.execute_task(&task_id, now, started_at).await {
                executed += 1;
            }
        }

        executed
    }

    /// Due task IDs in dispatch order
    async fn collect_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let tasks = self.tasks.read().await;
        let mut due: Vec<&ScheduledTask> = tasks.values().filter(|t| t.is_due(now)).collect();
        due.sort_by(|a, b| dispatch_order(a, b));
        due.into_iter().map(|t| t.id.clone()).collect()
    }

    /// Execute a single task; returns false if it was no longer due
    async fn execute_task(&self, task_id: &str, now: DateTime<Utc>, started_at: DateTime<Utc>) -> bool {
        // Claim under the lock: a cancel or pause since the scan wins
        let (name, command, timeout_secs) = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else {
                return false;
            };
            if !task.is_due(now) {
                debug!(task_id = %task_id, "Task no longer due, skipping");
                return false;
            }
            if let Err(e) = task.mark_started(started_at) {
                warn!(task_id = %task_id, "Failed to start task: {}", e);
                return false;
            }
            self.persist(task);
            (task.name.clone(), task.command.clone(), task.timeout_seconds)
        };
        self.set_claim(Some(Claim {
            task_id: task_id.to_string(),
            execution: None,
        }));

        info!(task_id = %task_id, "Executing scheduled task: {}", name);
        let clock = Instant::now();
        let outcome = self.invoke(command, timeout_secs).await;
        let finished_at = started_at + elapsed_since(clock);
        self.set_claim(None);

        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(task_id) else {
            warn!(task_id = %task_id, "Task deleted while running; dropping its outcome");
            return true;
        };

        let applied = match outcome {
            ExecutionOutcome::Completed(result) => task.mark_completed(result, finished_at),
            ExecutionOutcome::Failed(err) => {
                warn!(task_id = %task_id, "Task {} failed: {}", name, err);
                task.mark_failed(err, finished_at, &self.config.retry)
            }
            ExecutionOutcome::TimedOut(secs) => {
                warn!(task_id = %task_id, "Task {} timed out after {}s", name, secs);
                task.mark_timed_out(secs, finished_at, &self.config.retry)
            }
        };
        if let Err(e) = applied {
            error!(task_id = %task_id, "Failed to record task outcome: {}", e);
        }
        task.trim_history(self.config.history_limit);
        self.persist(task);

        info!(
            task_id = %task_id,
            "Task {} finished: status {}, retries {}/{}",
            name,
            task.status,
            task.retry_count,
            task.max_retries
        );
        true
    }

    /// Call the executor with the task's deadline
    async fn invoke(&self, command: String, timeout_secs: u64) -> ExecutionOutcome {
        let Some(executor) = &self.executor else {
            warn!("No task executor configured");
            return ExecutionOutcome::Completed(NO_EXECUTOR_RESULT.to_string());
        };

        // Spawned so a panicking executor fails the task, not the loop
        let mut handle = tokio::spawn(executor(command));
        self.attach_execution(handle.abort_handle());

        let joined = if self.config.enforce_timeouts && timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return ExecutionOutcome::TimedOut(timeout_secs);
                }
            }
        } else {
            handle.await
        };

        match joined {
            Ok(Ok(result)) => ExecutionOutcome::Completed(result),
            Ok(Err(SchedulerError::Execution(message))) => ExecutionOutcome::Failed(message),
            Ok(Err(e)) => ExecutionOutcome::Failed(e.to_string()),
            Err(e) if e.is_panic() => ExecutionOutcome::Failed(format!(
                "executor panicked: {}",
                panic_message(e.into_panic().as_ref())
            )),
            Err(e) => ExecutionOutcome::Failed(format!("executor cancelled: {}", e)),
        }
    }

    fn set_claim(&self, claim: Option<Claim>) {
        *self.claim.lock().unwrap_or_else(PoisonError::into_inner) = claim;
    }

    fn attach_execution(&self, execution: AbortHandle) {
        if let Some(claim) = self
            .claim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            claim.execution = Some(execution);
        }
    }

    /// Apply `f` to one task under the lock and persist the result
    async fn update_task<F>(&self, task_id: &str, f: F) -> Result<ScheduledTask>
    where
        F: FnOnce(&mut ScheduledTask) -> Result<()>,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        f(task)?;
        self.persist(task);
        Ok(task.clone())
    }

    /// Save failures are logged; memory stays authoritative
    fn persist(&self, task: &ScheduledTask) {
        if let Err(e) = self.store.save(task) {
            warn!(task_id = %task.id, "Failed to persist task: {}", e);
        }
    }
}

/// Priority first, then earliest `next_run` (unscheduled last), then ID
fn dispatch_order(a: &ScheduledTask, b: &ScheduledTask) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.next_run, b.next_run) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Bring a freshly loaded task back to a dispatchable state; true if changed
fn recover_task(task: &mut ScheduledTask, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    if task.status == TaskStatus::Running {
        warn!(task_id = %task.id, "Task was running at shutdown; requeueing");
        task.status = TaskStatus::Pending;
        changed = true;
    }

    if task.status == TaskStatus::Pending && task.next_run.is_none() && task.schedule.is_recurring()
    {
        task.next_run = task.schedule.next_run(task.last_run, now);
        changed = true;
    }

    changed
}

fn elapsed_since(start: Instant) -> TimeDelta {
    TimeDelta::from_std(start.elapsed()).unwrap_or_else(|_| TimeDelta::zero())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for creating SchedulerEngine
pub struct SchedulerEngineBuilder {
    store: Option<SchedulerStore>,
    config: SchedulerConfig,
    executor: Option<TaskExecutor>,
}

impl SchedulerEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            store: None,
            config: SchedulerConfig::default(),
            executor: None,
        }
    }

    /// Set the store
    pub fn store(mut self, store: SchedulerStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the executor
    pub fn executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Build the engine, loading persisted tasks
    pub fn build(self) -> Result<SchedulerEngine> {
        let store = self
            .store
            .ok_or_else(|| SchedulerError::InvalidConfig("Store is required".to_string()))?;

        let mut engine = SchedulerEngine::open(store, self.config)?;
        if let Some(executor) = self.executor {
            engine = engine.with_executor(executor);
        }

        Ok(engine)
    }
}

impl Default for SchedulerEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
