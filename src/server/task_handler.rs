use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_core::scheduler::{SchedulerError, TaskExecutionFuture, TaskExecutor};
use tracing::{info, warn};

use super::config::ExecutorConfig;

/// Build the engine's execution callback: each command runs via `<shell> -c`
pub fn shell_executor(config: &ExecutorConfig) -> TaskExecutor {
    let shell = config.shell.clone();
    let working_dir = config.working_dir.clone();

    Arc::new(move |command: String| -> TaskExecutionFuture {
        let shell = shell.clone();
        let working_dir: Option<PathBuf> = working_dir.clone();
        Box::pin(async move { execute_command(&shell, working_dir.as_deref(), &command).await })
    })
}

/// Execute a scheduled shell command
pub async fn execute_command(
    shell: &str,
    cwd: Option<&Path>,
    command: &str,
) -> Result<String, SchedulerError> {
    info!("Executing scheduled shell command: {}", command);
    let mut cmd = tokio::process::Command::new(shell);
    cmd.arg("-c").arg(command);
    // A timed-out execution is dropped; take the child down with it
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    match cmd.output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.success() {
                Ok(stdout.trim_end().to_string())
            } else {
                warn!("Scheduled command failed: {}", output.status);
                Err(SchedulerError::Execution(format!(
                    "Command failed: {}\nStderr: {}",
                    output.status,
                    stderr.trim_end()
                )))
            }
        }
        Err(e) => Err(SchedulerError::Execution(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_command_output_returned() {
        let result = execute_command("sh", None, "echo hello").await.unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_error() {
        let err = execute_command("sh", None, "echo oops >&2; exit 3")
            .await
            .unwrap_err();
        match err {
            SchedulerError::Execution(msg) => {
                assert!(msg.starts_with("Command failed"));
                assert!(msg.contains("oops"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_shell_is_execution_error() {
        let result = execute_command("/nonexistent/shell", None, "true").await;
        assert!(matches!(result, Err(SchedulerError::Execution(_))));
    }

    #[tokio::test]
    async fn test_executor_uses_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let executor = shell_executor(&ExecutorConfig {
            shell: "sh".to_string(),
            working_dir: Some(dir.path().to_path_buf()),
        });
        let result = executor("cat marker.txt".to_string()).await.unwrap();
        assert_eq!(result, "here");
    }
}
