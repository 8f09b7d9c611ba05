//! Configuration loading
//!
//! Sources, lowest priority first: embedded defaults, `config/local`, an
//! optional `--config` file, then `CADENCE_*` environment variables.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration, layering `extra` over the defaults when given
pub fn load_config(extra: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = extra {
        builder = builder.add_source(File::from(path).required(true));
    }

    // prefix_separator("_") makes CADENCE_SCHEDULER__X work with a single
    // underscore after the prefix.
    let config = builder
        .add_source(
            Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_defaults_parse() {
        let config = load_config(None).unwrap();
        assert_eq!(config.scheduler.check_interval_secs, 10);
        assert_eq!(config.scheduler.error_cooldown_secs, 30);
        assert_eq!(config.scheduler.retry_base_delay_secs, 60);
        assert_eq!(config.scheduler.history_limit, 100);
        assert!(config.scheduler.enforce_timeouts);
        assert_eq!(config.executor.shell, "sh");
    }

    #[test]
    fn test_extra_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(
            &path,
            r#"
[scheduler]
tasks_dir = "/srv/cadence"
check_interval_secs = 2

[executor]
shell = "bash"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.tasks_dir, Some(PathBuf::from("/srv/cadence")));
        assert_eq!(config.scheduler.check_interval_secs, 2);
        assert_eq!(config.scheduler.history_limit, 100);
        assert_eq!(config.executor.shell, "bash");
    }

    #[test]
    fn test_missing_extra_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
