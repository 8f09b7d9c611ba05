//! Scheduler triggers - how a task's next run is computed
//!
//! Supports five schedule kinds:
//! - Once: single execution at a specific instant
//! - Daily: every day at a fixed wall-clock time (UTC)
//! - Interval: repeating at a fixed interval measured from the last run
//! - Condition: re-armed every minute so the executor can re-check a condition
//! - Cron: declared for record compatibility, rejected at creation

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Result, SchedulerError};

/// Re-arm delay for condition triggers
pub const CONDITION_POLL_SECS: i64 = 60;

/// Schedule for a task, persisted as `scheduleKind` + `scheduleConfig`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "scheduleKind",
    content = "scheduleConfig",
    rename_all = "snake_case"
)]
pub enum Schedule {
    /// One-time execution at a specific instant
    Once(OnceTrigger),
    /// Daily execution at `hour:minute` UTC
    Daily(DailyTrigger),
    /// Fixed interval execution
    Interval(IntervalTrigger),
    /// Polled condition
    Condition(ConditionTrigger),
    /// Cron expression (not supported)
    Cron(CronTrigger),
}

impl Schedule {
    /// Create a one-time schedule
    pub fn once(datetime: DateTime<Utc>) -> Self {
        Self::Once(OnceTrigger { datetime })
    }

    /// Create a daily schedule
    pub fn daily(hour: u32, minute: u32) -> Self {
        Self::Daily(DailyTrigger { hour, minute })
    }

    /// Create an interval schedule
    pub fn interval(value: u64, unit: IntervalUnit) -> Self {
        Self::Interval(IntervalTrigger { value, unit })
    }

    /// Create a condition schedule
    pub fn condition(condition: impl Into<String>) -> Self {
        Self::Condition(ConditionTrigger {
            condition: condition.into(),
        })
    }

    /// Create a cron schedule
    pub fn cron(expression: impl Into<String>) -> Self {
        Self::Cron(CronTrigger {
            expression: expression.into(),
        })
    }

    /// Build a schedule from a loose kind name and JSON config object.
    ///
    /// Unknown kinds, missing fields and unknown fields are rejected, and the
    /// result is validated.
    pub fn from_parts(kind: &str, config: serde_json::Value) -> Result<Self> {
        let value = serde_json::json!({
            "scheduleKind": kind.trim().to_ascii_lowercase(),
            "scheduleConfig": config,
        });
        let schedule: Schedule = serde_json::from_value(value).map_err(|e| {
            SchedulerError::InvalidConfig(format!("invalid {} schedule: {}", kind, e))
        })?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Kind name as persisted
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Once(_) => "once",
            Self::Daily(_) => "daily",
            Self::Interval(_) => "interval",
            Self::Condition(_) => "condition",
            Self::Cron(_) => "cron",
        }
    }

    /// Whether the task returns to pending after a successful run
    pub fn is_recurring(&self) -> bool {
        match self {
            Self::Daily(_) | Self::Interval(_) | Self::Condition(_) => true,
            Self::Once(_) | Self::Cron(_) => false,
        }
    }

    /// Check the schedule parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Once(_) => Ok(()),
            Self::Daily(daily) => {
                if daily.hour > 23 {
                    return Err(SchedulerError::InvalidConfig(format!(
                        "daily hour out of range (0-23): {}",
                        daily.hour
                    )));
                }
                if daily.minute > 59 {
                    return Err(SchedulerError::InvalidConfig(format!(
                        "daily minute out of range (0-59): {}",
                        daily.minute
                    )));
                }
                Ok(())
            }
            Self::Interval(interval) => {
                if interval.value == 0 {
                    return Err(SchedulerError::InvalidConfig(
                        "interval value must be greater than zero".to_string(),
                    ));
                }
                if interval.duration().is_none() {
                    return Err(SchedulerError::InvalidConfig(format!(
                        "interval too large: {} {}",
                        interval.value, interval.unit
                    )));
                }
                Ok(())
            }
            Self::Condition(condition) => {
                if condition.condition.trim().is_empty() {
                    return Err(SchedulerError::InvalidConfig(
                        "condition must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Cron(cron) => Err(SchedulerError::Unsupported(format!(
                "cron schedules are not supported: {:?}",
                cron.expression
            ))),
        }
    }

    /// Calculate the next due instant.
    ///
    /// `last_run` only matters for interval schedules. Returns `None` when the
    /// task will never fire again.
    pub fn next_run(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Self::Once(once) => (once.datetime > now).then_some(once.datetime),
            Self::Daily(daily) => daily.next_after(now),
            Self::Interval(interval) => {
                let every = interval.duration()?;
                let from = last_run.unwrap_or(now);
                from.checked_add_signed(every)
            }
            Self::Condition(_) => Some(now + Duration::seconds(CONDITION_POLL_SECS)),
            Self::Cron(_) => None,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once(once) => write!(f, "once at {}", once.datetime.to_rfc3339()),
            Self::Daily(daily) => write!(f, "daily at {:02}:{:02} UTC", daily.hour, daily.minute),
            Self::Interval(interval) => write!(f, "every {} {}", interval.value, interval.unit),
            Self::Condition(c) => write!(f, "when {}", c.condition),
            Self::Cron(cron) => write!(f, "cron {}", cron.expression),
        }
    }
}

/// One-time trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnceTrigger {
    /// Execution instant (UTC)
    pub datetime: DateTime<Utc>,
}

/// Daily trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyTrigger {
    /// Hour of day (0-23, UTC)
    pub hour: u32,
    /// Minute of hour (0-59)
    pub minute: u32,
}

impl DailyTrigger {
    /// Today's occurrence, or tomorrow's if today's is not after `now`.
    /// Wall clock is UTC, so there are no DST gaps.
    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let today = now.date_naive().and_time(time).and_utc();
        if today <= now {
            today.checked_add_signed(Duration::days(1))
        } else {
            Some(today)
        }
    }
}

/// Interval trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalTrigger {
    /// Number of units
    pub value: u64,
    /// Unit of `value`
    pub unit: IntervalUnit,
}

impl IntervalTrigger {
    /// Interval length in seconds, `None` on overflow
    pub fn seconds(&self) -> Option<u64> {
        self.value.checked_mul(self.unit.multiplier())
    }

    fn duration(&self) -> Option<Duration> {
        let secs = i64::try_from(self.seconds()?).ok()?;
        Duration::try_seconds(secs)
    }
}

/// Interval units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
    /// Weeks
    Weeks,
}

impl IntervalUnit {
    /// Seconds per unit
    pub fn multiplier(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds => write!(f, "seconds"),
            Self::Minutes => write!(f, "minutes"),
            Self::Hours => write!(f, "hours"),
            Self::Days => write!(f, "days"),
            Self::Weeks => write!(f, "weeks"),
        }
    }
}

/// Condition trigger
///
/// The scheduler never evaluates `condition`; it only re-arms the task so the
/// executor can check it on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionTrigger {
    /// Application-defined condition
    pub condition: String,
}

/// Cron trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CronTrigger {
    /// Cron expression
    pub expression: String,
}
