//! Task administration commands

use anyhow::{Context, Result};
use cadence_core::scheduler::DEFAULT_MAX_RETRIES;
use cadence_core::{
    Schedule, ScheduledTask, SchedulerEngine, TaskFilter, TaskPriority, TaskSpec, TaskStatus,
};
use chrono::{DateTime, Utc};
use clap::Args;

/// Arguments for `cadence create`
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Human-readable task name
    #[arg(long)]
    pub name: String,
    /// Command handed to the shell executor
    #[arg(long)]
    pub command: String,
    /// Schedule kind: once, daily, interval or condition
    #[arg(long)]
    pub kind: String,
    /// Schedule config as JSON, e.g. '{"value": 5, "unit": "minutes"}'
    #[arg(long = "schedule", value_name = "JSON")]
    pub schedule_config: String,
    /// Explicit task ID (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,
    /// critical, high, medium, low or 1-4
    #[arg(long, default_value = "medium")]
    pub priority: TaskPriority,
    /// Opaque grouping tag
    #[arg(long)]
    pub correlation_id: Option<String>,
    /// Retries before the task is marked failed
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Execution timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl CreateArgs {
    /// Build the task spec these arguments describe
    pub fn into_spec(self) -> Result<TaskSpec> {
        let config: serde_json::Value = serde_json::from_str(&self.schedule_config)
            .context("Schedule config is not valid JSON")?;
        let schedule = Schedule::from_parts(&self.kind, config)?;

        let mut spec = TaskSpec::new(self.name, self.command, schedule)
            .with_priority(self.priority)
            .with_max_retries(self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES));
        if let Some(id) = self.id {
            spec = spec.with_id(id);
        }
        if let Some(correlation_id) = self.correlation_id {
            spec = spec.with_correlation_id(correlation_id);
        }
        if let Some(timeout) = self.timeout {
            spec = spec.with_timeout(timeout);
        }
        Ok(spec)
    }
}

pub fn build_filter(
    status: Option<TaskStatus>,
    correlation_id: Option<String>,
    priority: Option<TaskPriority>,
) -> TaskFilter {
    let mut filter = TaskFilter::new();
    if let Some(status) = status {
        filter = filter.with_status(status);
    }
    if let Some(correlation_id) = correlation_id {
        filter = filter.with_correlation_id(correlation_id);
    }
    if let Some(priority) = priority {
        filter = filter.with_priority(priority);
    }
    filter
}

pub async fn create(engine: &SchedulerEngine, args: CreateArgs) -> Result<()> {
    let spec = args.into_spec()?;
    let task = engine.create_task(spec).await?;

    println!("Created task {}", task.id);
    println!("  schedule: {}", task.schedule);
    println!("  next run: {}", format_time(task.next_run));
    if task.next_run.is_none() {
        println!("  warning: this task will never run");
    }
    Ok(())
}

pub async fn list(engine: &SchedulerEngine, filter: &TaskFilter, json: bool) -> Result<()> {
    let tasks = engine.list_tasks(filter).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    println!(
        "{:<34} {:<10} {:<9} {:<26} NAME",
        "ID", "STATUS", "PRIORITY", "NEXT RUN"
    );
    for task in &tasks {
        println!("{}", format_row(task));
    }
    Ok(())
}

pub async fn show(engine: &SchedulerEngine, id: &str) -> Result<()> {
    let task = engine.get_task(id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

pub async fn cancel(engine: &SchedulerEngine, id: &str) -> Result<()> {
    let task = engine.cancel_task(id).await?;
    println!("Task {} is {}", task.id, task.status);
    Ok(())
}

pub async fn pause(engine: &SchedulerEngine, id: &str) -> Result<()> {
    let task = engine.pause_task(id).await?;
    println!("Task {} is {}", task.id, task.status);
    Ok(())
}

pub async fn resume(engine: &SchedulerEngine, id: &str) -> Result<()> {
    let task = engine.resume_task(id).await?;
    println!(
        "Task {} is {}, next run {}",
        task.id,
        task.status,
        format_time(task.next_run)
    );
    Ok(())
}

pub async fn delete(engine: &SchedulerEngine, id: &str) -> Result<()> {
    engine.delete_task(id).await?;
    println!("Deleted task {}", id);
    Ok(())
}

pub async fn status(engine: &SchedulerEngine, upcoming: usize, json: bool) -> Result<()> {
    let status = engine.status(upcoming).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Tasks: {}", status.total);
    for (task_status, count) in &status.by_status {
        println!("  {:<10} {}", task_status.to_string(), count);
    }
    if !status.upcoming.is_empty() {
        println!();
        println!("Upcoming:");
        for task in &status.upcoming {
            println!("  {}  {} ({})", format_time(task.next_run), task.name, task.id);
        }
    }
    Ok(())
}

fn format_row(task: &ScheduledTask) -> String {
    format!(
        "{:<34} {:<10} {:<9} {:<26} {}",
        task.id,
        task.status.to_string(),
        task.priority.to_string(),
        format_time(task.next_run),
        task.name
    )
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}
