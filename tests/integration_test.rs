//! Integration tests for Cadence
//!
//! Exercise the scheduler through its public API only:
//! - Engine lifecycle with a background worker
//! - Durable state across engine instances

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::scheduler::{IntervalUnit, TaskExecutionFuture};
use cadence_core::{
    Schedule, SchedulerConfig, SchedulerEngine, SchedulerError, SchedulerStore, TaskExecutor,
    TaskFilter, TaskPriority, TaskSpec, TaskStatus,
};
use chrono::{TimeDelta, Utc};
use tempfile::TempDir;

fn recording_executor(log: Arc<Mutex<Vec<String>>>) -> TaskExecutor {
    Arc::new(move |command: String| -> TaskExecutionFuture {
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(command.clone());
            if command == "false" {
                Err(SchedulerError::Execution("exit status 1".to_string()))
            } else {
                Ok(format!("{} ok", command))
            }
        })
    })
}

fn open(dir: &TempDir, log: &Arc<Mutex<Vec<String>>>) -> SchedulerEngine {
    let store = SchedulerStore::from_path(dir.path()).unwrap();
    SchedulerEngine::builder()
        .store(store)
        .config(SchedulerConfig::new().with_check_interval(1))
        .executor(recording_executor(log.clone()))
        .build()
        .unwrap()
}

// ============================================================================
// Worker lifecycle
// ============================================================================

#[tokio::test]
async fn test_worker_runs_due_tasks_in_priority_order() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let engine = Arc::new(open(&dir, &log));

    let at = Utc::now() + TimeDelta::milliseconds(200);
    engine
        .create_task(
            TaskSpec::new("low", "low", Schedule::once(at)).with_priority(TaskPriority::Low),
        )
        .await
        .unwrap();
    engine
        .create_task(
            TaskSpec::new("critical", "critical", Schedule::once(at + TimeDelta::milliseconds(10)))
                .with_priority(TaskPriority::Critical),
        )
        .await
        .unwrap();

    engine.start();
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if log.lock().unwrap().len() == 2 {
            break;
        }
    }
    engine.stop().await;

    assert_eq!(*log.lock().unwrap(), vec!["critical", "low"]);
    let completed = engine
        .list_tasks(&TaskFilter::new().with_status(TaskStatus::Completed))
        .await;
    assert_eq!(completed.len(), 2);
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_state_survives_engine_restart() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = open(&dir, &log);
    let flaky = first
        .create_task(TaskSpec::new("flaky", "false", Schedule::interval(1, IntervalUnit::Hours)))
        .await
        .unwrap();
    let paused = first
        .create_task(TaskSpec::new("idle", "true", Schedule::daily(6, 0)))
        .await
        .unwrap();
    first.pause_task(&paused.id).await.unwrap();
    first.dispatch_due(flaky.next_run.unwrap()).await;
    let before = first.get_task(&flaky.id).await.unwrap();
    drop(first);

    let second = open(&dir, &log);
    let after = second.get_task(&flaky.id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Pending);
    assert_eq!(after.retry_count, 1);
    assert_eq!(after.next_run, before.next_run);
    assert_eq!(after.last_error.as_deref(), Some("exit status 1"));

    let idle = second.get_task(&paused.id).await.unwrap();
    assert_eq!(idle.status, TaskStatus::Paused);

    let status = second.status(10).await;
    assert_eq!(status.total, 2);
    assert_eq!(status.upcoming.len(), 1);
}
