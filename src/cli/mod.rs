//! CLI module for Cadence
//!
//! Provides commands:
//! - `run`: Start the dispatcher until Ctrl-C
//! - `create`, `list`, `show`: Define and inspect tasks
//! - `cancel`, `pause`, `resume`, `delete`: Task lifecycle
//! - `status`: Counts by status and upcoming runs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cadence_core::{TaskPriority, TaskStatus};

pub mod tasks;

/// Cadence task scheduler CLI
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Priority task scheduler with durable state")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until Ctrl-C
    Run,
    /// Create a scheduled task
    Create(tasks::CreateArgs),
    /// List tasks in dispatch order
    List {
        /// Only tasks in this status
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Only tasks with this correlation ID
        #[arg(long)]
        correlation_id: Option<String>,
        /// Only tasks with this priority
        #[arg(long)]
        priority: Option<TaskPriority>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one task record
    Show {
        /// Task ID
        id: String,
    },
    /// Cancel a task
    Cancel {
        /// Task ID
        id: String,
    },
    /// Pause a pending task
    Pause {
        /// Task ID
        id: String,
    },
    /// Resume a paused task
    Resume {
        /// Task ID
        id: String,
    },
    /// Delete a task and its record
    Delete {
        /// Task ID
        id: String,
    },
    /// Show scheduler status
    Status {
        /// Number of upcoming tasks to show
        #[arg(long, default_value_t = 5)]
        upcoming: usize,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = crate::server::load_config(cli.config.as_deref())?;

    let engine = || crate::server::open_engine(&config);

    match command {
        Commands::Run => crate::server::run(config.clone()).await,
        Commands::Create(args) => tasks::create(&engine()?, args).await,
        Commands::List {
            status,
            correlation_id,
            priority,
            json,
        } => {
            let filter = tasks::build_filter(status, correlation_id, priority);
            tasks::list(&engine()?, &filter, json).await
        }
        Commands::Show { id } => tasks::show(&engine()?, &id).await,
        Commands::Cancel { id } => tasks::cancel(&engine()?, &id).await,
        Commands::Pause { id } => tasks::pause(&engine()?, &id).await,
        Commands::Resume { id } => tasks::resume(&engine()?, &id).await,
        Commands::Delete { id } => tasks::delete(&engine()?, &id).await,
        Commands::Status { upcoming, json } => tasks::status(&engine()?, upcoming, json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "cadence",
            "create",
            "--name",
            "backup",
            "--command",
            "tar czf /tmp/b.tgz /data",
            "--kind",
            "daily",
            "--schedule",
            r#"{"hour": 3, "minute": 0}"#,
            "--priority",
            "high",
            "--max-retries",
            "5",
        ])
        .unwrap();

        let Some(Commands::Create(args)) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.name, "backup");
        assert_eq!(args.kind, "daily");
        assert_eq!(args.priority, TaskPriority::High);
        assert_eq!(args.max_retries, Some(5));
    }

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::try_parse_from([
            "cadence",
            "--config",
            "/etc/cadence.toml",
            "list",
            "--status",
            "paused",
            "--priority",
            "1",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/cadence.toml")));
        match cli.command {
            Some(Commands::List {
                status, priority, json, ..
            }) => {
                assert_eq!(status, Some(TaskStatus::Paused));
                assert_eq!(priority, Some(TaskPriority::Critical));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["cadence", "list", "--status", "sleeping"]).is_err());
    }

    #[test]
    fn test_status_default_upcoming() {
        let cli = Cli::try_parse_from(["cadence", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Status {
                upcoming: 5,
                json: false
            })
        ));
    }
}
