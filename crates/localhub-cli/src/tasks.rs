use color_eyre::Result;
use localhub_core::tasks::{NewTask, Task, TaskRepository};

use crate::{cli::TaskCommand, config::Settings, storage};

/// Execute a task subcommand against the task file.
pub async fn handle(cmd: TaskCommand, settings: &Settings) -> Result<()> {
    let repo = storage::task_repo(settings);
    run(cmd, &repo).await
}

async fn run(cmd: TaskCommand, repo: &dyn TaskRepository) -> Result<()> {
    match cmd {
        TaskCommand::List => {
            let tasks = repo.list().await?;
            if tasks.is_empty() {
                println!("No tasks yet. Add one with `localhub task add <title>`.");
                return Ok(());
            }
            for task in tasks {
                print_task(&task);
            }
        }
        TaskCommand::Add {
            title,
            description,
            due,
        } => {
            let task = repo
                .create(NewTask {
                    title,
                    description: description.unwrap_or_default(),
                    due_date: due.unwrap_or_default(),
                })
                .await?;
            println!("Created task {}: {}", task.id, task.title);
        }
        TaskCommand::Done { id } => {
            let task = repo.set_completed(id, true).await?;
            println!("Marked done: {}", task.title);
        }
        TaskCommand::Undo { id } => {
            let task = repo.set_completed(id, false).await?;
            println!("Reopened: {}", task.title);
        }
        TaskCommand::Rm { id } => {
            repo.delete(id).await?;
            println!("Deleted task {id}");
        }
    }
    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    println!("{} [{mark}] {}", task.id, task.title);
    if !task.due_date.is_empty() {
        println!("    due: {}", task.due_date);
    }
    if !task.description.is_empty() {
        println!("    {}", task.description);
    }
}
