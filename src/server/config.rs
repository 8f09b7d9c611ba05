//! Server configuration types

use anyhow::{Context, Result};
use cadence_core::{RetryPolicy, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerAppConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// Scheduler configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerAppConfig {
    /// Task record directory; unset means the platform data dir
    #[serde(default)]
    pub tasks_dir: Option<PathBuf>,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,
    #[serde(default)]
    pub retry_max_delay_secs: Option<u64>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_true")]
    pub enforce_timeouts: bool,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_check_interval() -> u64 {
    10
}

fn default_error_cooldown() -> u64 {
    30
}

fn default_retry_base_delay() -> u64 {
    60
}

fn default_history_limit() -> usize {
    100
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerAppConfig {
    fn default() -> Self {
        Self {
            tasks_dir: None,
            check_interval_secs: default_check_interval(),
            error_cooldown_secs: default_error_cooldown(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_max_delay_secs: None,
            history_limit: default_history_limit(),
            enforce_timeouts: true,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerAppConfig {
    /// Engine settings derived from this section
    pub fn engine_config(&self) -> SchedulerConfig {
        let retry = RetryPolicy::new()
            .with_base_delay(self.retry_base_delay_secs)
            .with_max_delay(self.retry_max_delay_secs);

        SchedulerConfig::new()
            .with_check_interval(self.check_interval_secs)
            .with_error_cooldown(self.error_cooldown_secs)
            .with_retry_policy(retry)
            .with_history_limit(self.history_limit)
            .with_enforce_timeouts(self.enforce_timeouts)
            .with_shutdown_timeout(self.shutdown_timeout_secs)
    }

    /// Configured task directory, or `<data dir>/cadence/schedules`
    pub fn resolve_tasks_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.tasks_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().context(
            "Could not determine a data directory; set scheduler.tasks_dir explicitly",
        )?;
        Ok(data_dir.join("cadence").join("schedules"))
    }
}

/// Shell executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Shell invoked as `<shell> -c <command>`
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            working_dir: None,
        }
    }
}
