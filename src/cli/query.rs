//! Query commands (list, tree, ready, blocked, stats, ...)

use anyhow::Result;

use super::app::Manager;
use super::output::Output;
use crate::domain::{TaskId, TaskStatus};

pub fn list(
    manager: &Manager,
    output: &Output,
    status: Option<TaskStatus>,
    roots: bool,
    parent: Option<&TaskId>,
) -> Result<()> {
    let mut tasks = match parent {
        Some(parent) => {
            if manager.get_task(parent).is_none() {
                anyhow::bail!("Task not found: {}", parent);
            }
            manager.child_tasks(parent)
        }
        None if roots => manager.parent_tasks(),
        None => manager.all_tasks(),
    };
    if let Some(status) = status {
        tasks.retain(|task| task.status == status);
    }

    output.tasks(&tasks, "No tasks");
    Ok(())
}

pub fn tree(manager: &Manager, output: &Output) -> Result<()> {
    if output.is_json() {
        println!("{}", manager.hierarchy_json()?);
        return Ok(());
    }

    let entries = manager.hierarchy_walk();
    if entries.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    for entry in entries {
        let marker = if entry.task.is_complete() { "[x]" } else { "[ ]" };
        println!(
            "{}{} {} ({})",
            "  ".repeat(entry.depth),
            marker,
            entry.task.title,
            entry.task.id
        );
    }

    Ok(())
}

/// Show tasks ready to work on
pub fn ready(manager: &Manager, output: &Output) -> Result<()> {
    let tasks = manager.executable_tasks();
    output.tasks(&tasks, "No tasks ready to work on.");
    Ok(())
}

/// Show blocked tasks
pub fn blocked(manager: &Manager, output: &Output) -> Result<()> {
    let tasks = manager.blocked_tasks();

    if output.is_json() || tasks.is_empty() {
        output.tasks(&tasks, "No blocked tasks.");
        return Ok(());
    }

    println!("Blocked tasks ({}):", tasks.len());
    for task in tasks {
        let waiting: Vec<String> = task
            .dependencies
            .iter()
            .filter(|dep| !manager.get_task(dep).is_some_and(|t| t.is_complete()))
            .map(|dep| dep.to_string())
            .collect();
        println!("{:<32} {}", task.id, task.title);
        println!("{:<32} waiting on: {}", "", waiting.join(", "));
    }

    Ok(())
}

pub fn overdue(manager: &Manager, output: &Output) -> Result<()> {
    let tasks = manager.overdue_tasks();
    output.tasks(&tasks, "No overdue tasks.");
    Ok(())
}

pub fn today(manager: &Manager, output: &Output) -> Result<()> {
    let tasks = manager.today_tasks();
    output.tasks(&tasks, "Nothing scheduled for today.");
    Ok(())
}

pub fn search(manager: &Manager, output: &Output, query: &str) -> Result<()> {
    let tasks = manager.search_tasks(query);
    output.tasks(&tasks, &format!("No results found for '{}'", query));
    Ok(())
}

pub fn stats(manager: &Manager, output: &Output) -> Result<()> {
    let stats = manager.statistics();

    if output.is_json() {
        output.data(&stats);
    } else {
        println!("Total:       {}", stats.total);
        println!("Completed:   {}", stats.completed);
        println!("In progress: {}", stats.in_progress);
        println!("Pending:     {}", stats.pending);
        println!("Overdue:     {}", stats.overdue);
        println!("Completion:  {:.1}%", stats.completion_rate);
    }

    Ok(())
}

/// Show every task with its dependencies first
pub fn order(manager: &Manager, output: &Output) -> Result<()> {
    let order = manager.execution_order()?;
    let tasks: Vec<_> = order.iter().filter_map(|id| manager.get_task(id)).collect();
    output.tasks(&tasks, "No tasks");
    Ok(())
}
