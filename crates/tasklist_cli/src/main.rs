//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `tasklist_core` linkage and the configured store without FFI.
//! - Print the current task list in position order.

use log::{error, info};
use std::process::ExitCode;
use tasklist_core::db::open_with_config;
use tasklist_core::{
    init_logging_with, LogConfig, SqliteTaskRepository, StoreConfig, TaskRepository,
};

fn main() -> ExitCode {
    println!("tasklist_core ping={}", tasklist_core::ping());
    println!("tasklist_core version={}", tasklist_core::core_version());

    if let Some(log_config) = LogConfig::from_env() {
        if let Err(err) = init_logging_with(&log_config) {
            eprintln!("logging disabled: {err}");
        }
    }

    match print_tasks(&StoreConfig::from_env_or_default_file()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_list module=cli status=error error={err}");
            eprintln!("tasklist_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_tasks(config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_with_config(config)?;
    let repo = SqliteTaskRepository::try_new(&conn)?.with_retry_policy(config.retry);
    let tasks = repo.list_tasks()?;
    info!("event=cli_list module=cli status=ok count={}", tasks.len());
    println!("tasks={}", tasks.len());
    for task in tasks {
        let mark = if task.completed { 'x' } else { ' ' };
        println!(
            "{:>4} {} [{mark}] {} ({})",
            task.position, task.id, task.title, task.tag
        );
    }
    Ok(())
}
