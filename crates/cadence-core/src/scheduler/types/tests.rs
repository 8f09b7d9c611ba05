    use super::*;
    use crate::scheduler::triggers::IntervalUnit;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn interval_task() -> ScheduledTask {
        let spec = TaskSpec::new("tick", "echo tick", Schedule::interval(5, IntervalUnit::Minutes))
            .with_id("tick");
        ScheduledTask::new(spec, t0())
    }

    fn once_task(at: DateTime<Utc>) -> ScheduledTask {
        let spec = TaskSpec::new("once", "echo once", Schedule::once(at)).with_id("once");
        ScheduledTask::new(spec, t0())
    }

    #[test]
    fn test_new_task_defaults() {
        let task = interval_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(task.timeout_seconds, DEFAULT_TIMEOUT_SECS);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.created_at, t0());
        assert_eq!(task.next_run, Some(t0() + Duration::seconds(300)));
    }

    #[test]
    fn test_generated_id() {
        let spec = TaskSpec::new("a", "b", Schedule::daily(1, 0));
        let task = ScheduledTask::new(spec, t0());
        assert_eq!(task.id.len(), 32);
        assert!(validate_task_id(&task.id).is_ok());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::Low);
        assert_eq!(u8::from(TaskPriority::Low), 4);
        assert_eq!("critical".parse::<TaskPriority>().unwrap(), TaskPriority::Critical);
        assert_eq!("2".parse::<TaskPriority>().unwrap(), TaskPriority::High);
        assert!("urgent".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_priority_serializes_as_number() {
        assert_eq!(serde_json::to_string(&TaskPriority::High).unwrap(), "2");
        let p: TaskPriority = serde_json::from_str("4").unwrap();
        assert_eq!(p, TaskPriority::Low);
        assert!(serde_json::from_str::<TaskPriority>("9").is_err());
    }

    #[test]
    fn test_recurring_completion_rearms() {
        let mut task = interval_task();
        let start = t0() + Duration::seconds(300);

        task.mark_started(start).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.last_run, Some(start));

        task.mark_completed("ok", start + Duration::seconds(3)).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.next_run, Some(start + Duration::seconds(300)));
        assert_eq!(task.last_result.as_deref(), Some("ok"));
        assert_eq!(task.run_history.len(), 1);
        assert_eq!(task.run_history[0].outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_once_completion_is_terminal() {
        let mut task = once_task(t0() + Duration::hours(1));
        let start = t0() + Duration::hours(1);

        task.mark_started(start).unwrap();
        task.mark_completed("done", start).unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.next_run, None);
        assert!(!task.is_due(start + Duration::days(1)));
    }

    #[test]
    fn test_once_in_past_never_due() {
        let task = once_task(t0() - Duration::hours(1));
        assert_eq!(task.next_run, None);
        assert!(!task.is_due(t0() + Duration::days(365)));
    }

    #[test]
    fn test_retry_backoff_sequence() {
        let policy = RetryPolicy::default();
        let mut task = interval_task();
        task.max_retries = 4;

        let mut now = t0();
        let mut delays = Vec::new();
        for _ in 0..3 {
            task.mark_started(now).unwrap();
            task.mark_failed("boom", now, &policy).unwrap();
            assert_eq!(task.status, TaskStatus::Pending);
            let next = task.next_run.unwrap();
            delays.push((next - now).num_seconds());
            now = next;
        }
        assert_eq!(delays, vec![60, 120, 240]);
        assert_eq!(task.retry_count, 3);

        task.mark_started(now).unwrap();
        task.mark_failed("boom", now, &policy).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.next_run, None);
        assert_eq!(task.retry_count, task.max_retries);
        assert!(task.mark_started(now).is_err());
        assert_eq!(task.run_history.len(), 4);
        assert_eq!(task.run_history[3].retry_count, Some(4));
    }

    #[test]
    fn test_single_retry_budget_fails_on_first_error() {
        let mut task = interval_task();
        task.max_retries = 1;
        task.mark_started(t0()).unwrap();
        task.mark_failed("once is enough", t0(), &RetryPolicy::default())
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let mut task = interval_task();
        task.max_retries = 0;
        task.mark_started(t0()).unwrap();
        task.mark_failed("nope", t0(), &RetryPolicy::default())
            .unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some("nope"));
    }

    #[test]
    fn test_success_resets_retry_count() {
        let policy = RetryPolicy::default();
        let mut task = interval_task();

        task.mark_started(t0()).unwrap();
        task.mark_failed("flaky", t0(), &policy).unwrap();
        assert_eq!(task.retry_count, 1);

        let retry_at = task.next_run.unwrap();
        task.mark_started(retry_at).unwrap();
        task.mark_completed("fine", retry_at).unwrap();
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.next_run, Some(retry_at + Duration::seconds(300)));
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let mut task = interval_task();
        task.mark_started(t0()).unwrap();
        task.mark_timed_out(30, t0(), &RetryPolicy::default())
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.run_history[0].outcome, RunOutcome::TimedOut);
        assert_eq!(task.last_error.as_deref(), Some("timed out after 30s"));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut task = interval_task();
        task.cancel().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        task.cancel().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(!task.is_due(t0() + Duration::days(1)));
    }

    #[test]
    fn test_cancel_terminal_rejected() {
        let mut task = once_task(t0() + Duration::seconds(1));
        task.mark_started(t0()).unwrap();
        task.mark_completed("done", t0()).unwrap();

        let err = task.cancel().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition {
                from: TaskStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_while_running_keeps_cancelled() {
        let mut task = interval_task();
        task.mark_started(t0()).unwrap();
        task.cancel().unwrap();

        task.mark_completed("late result", t0()).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.last_result.as_deref(), Some("late result"));
        assert_eq!(task.run_history.len(), 1);
    }

    #[test]
    fn test_pause_resume() {
        let mut task = interval_task();
        task.pause().unwrap();
        assert_eq!(task.status, TaskStatus::Paused);
        assert!(!task.is_due(t0() + Duration::days(1)));

        task.pause().unwrap();
        assert_eq!(task.status, TaskStatus::Paused);

        let later = t0() + Duration::hours(2);
        task.resume(later).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.next_run, Some(later + Duration::seconds(300)));

        task.resume(later).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_pause_running_rejected() {
        let mut task = interval_task();
        task.mark_started(t0()).unwrap();
        assert!(task.pause().is_err());
        assert!(task.resume(t0()).is_err());
    }

    #[test]
    fn test_trim_history() {
        let mut task = interval_task();
        for i in 0..5 {
            task.mark_started(t0()).unwrap();
            task.mark_completed(format!("run {}", i), t0()).unwrap();
        }
        task.trim_history(2);
        let details: Vec<&str> = task.run_history.iter().map(|r| r.detail.as_str()).collect();
        assert_eq!(details, vec!["run 3", "run 4"]);
    }

    #[test]
    fn test_spec_validation() {
        let ok = TaskSpec::new("n", "c", Schedule::daily(9, 0));
        assert!(ok.validate().is_ok());

        assert!(ok.clone().with_id("../etc").validate().is_err());
        assert!(ok.clone().with_id(".hidden").validate().is_err());
        assert!(ok.clone().with_id("").validate().is_err());
        assert!(TaskSpec::new(" ", "c", Schedule::daily(9, 0)).validate().is_err());
        assert!(TaskSpec::new("n", "", Schedule::daily(9, 0)).validate().is_err());
        assert!(TaskSpec::new("n", "c", Schedule::cron("* * * * *"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let mut task = interval_task();
        task.correlation_id = Some("mission-7".to_string());
        let json = serde_json::to_value(&task).unwrap();

        for key in [
            "id",
            "name",
            "command",
            "scheduleKind",
            "scheduleConfig",
            "priority",
            "correlationId",
            "maxRetries",
            "timeoutSeconds",
            "status",
            "retryCount",
            "lastRun",
            "nextRun",
            "lastResult",
            "lastError",
            "createdAt",
            "runHistory",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json["scheduleKind"], "interval");
        assert_eq!(json["scheduleConfig"]["unit"], "minutes");
        assert_eq!(json["priority"], 3);
        assert_eq!(json["status"], "pending");

        let restored: ScheduledTask = serde_json::from_value(json).unwrap();
        assert_eq!(restored, task);
    }
