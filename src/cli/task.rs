//! Task CLI commands

use anyhow::{Context, Result};

use super::app::Manager;
use super::output::Output;
use crate::domain::{NewTask, TaskId, TaskPatch};

pub fn add(manager: &mut Manager, output: &Output, fields: NewTask) -> Result<()> {
    let requested_parent = fields.parent_id.clone();
    let task = manager.create_task(fields)?;

    if output.is_json() {
        output.data(&task);
    } else {
        match (&task.parent_id, requested_parent) {
            (Some(parent), _) => output.success(&format!(
                "Created task: {} - {} (under {})",
                task.id, task.title, parent
            )),
            (None, Some(missing)) => output.success(&format!(
                "Created task: {} - {} (parent {} not found, added at top level)",
                task.id, task.title, missing
            )),
            (None, None) => output.success(&format!("Created task: {} - {}", task.id, task.title)),
        }
    }

    Ok(())
}

pub fn edit(manager: &mut Manager, output: &Output, id: &TaskId, patch: TaskPatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("Nothing to change; pass at least one field to edit");
    }

    let task = manager.update_task(id, patch)?;

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!("Updated task: {} - {}", task.id, task.title));
    }

    Ok(())
}

pub fn remove(manager: &mut Manager, output: &Output, id: &TaskId) -> Result<()> {
    let deleted = manager.delete_task(id)?;

    if output.is_json() {
        output.data(&serde_json::json!({ "deleted": deleted }));
    } else if deleted.len() == 1 {
        output.success(&format!("Deleted task: {}", id));
    } else {
        output.success(&format!(
            "Deleted task: {} and {} subtask(s)",
            id,
            deleted.len() - 1
        ));
    }

    Ok(())
}

pub fn toggle(manager: &mut Manager, output: &Output, id: &TaskId) -> Result<()> {
    let task = manager.toggle_task_complete(id)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": task.id,
            "status": task.status,
            "completedAt": task.completed_at,
        }));
    } else if task.is_complete() {
        output.success(&format!("Completed task: {}", task.id));
    } else {
        output.success(&format!("Reopened task: {}", task.id));
    }

    Ok(())
}

pub fn move_to(
    manager: &mut Manager,
    output: &Output,
    id: &TaskId,
    parent: Option<&TaskId>,
) -> Result<()> {
    let task = manager.move_task(id, parent)?;

    if output.is_json() {
        output.data(&task);
    } else {
        match parent {
            Some(parent) => output.success(&format!("Moved {} under {}", task.id, parent)),
            None => output.success(&format!("Moved {} to the top level", task.id)),
        }
    }

    Ok(())
}

pub fn add_dependency(
    manager: &mut Manager,
    output: &Output,
    task_id: &TaskId,
    depends_on: &TaskId,
) -> Result<()> {
    manager.add_dependency(task_id, depends_on)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task_id,
            "dependsOn": depends_on,
        }));
    } else {
        output.success(&format!("{} now depends on {}", task_id, depends_on));
    }

    Ok(())
}

pub fn remove_dependency(
    manager: &mut Manager,
    output: &Output,
    task_id: &TaskId,
    depends_on: &TaskId,
) -> Result<()> {
    let removed = manager.remove_dependency(task_id, depends_on)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task_id,
            "removedDependency": depends_on,
            "removed": removed,
        }));
    } else if removed {
        output.success(&format!(
            "Removed dependency: {} no longer depends on {}",
            task_id, depends_on
        ));
    } else {
        output.success(&format!("{} did not depend on {}", task_id, depends_on));
    }

    Ok(())
}

pub fn show(manager: &Manager, output: &Output, id: &TaskId) -> Result<()> {
    let task = manager
        .get_task(id)
        .with_context(|| format!("Task not found: {}", id))?;

    let is_ready = manager.executable_tasks().iter().any(|t| t.id == task.id);
    let is_blocked = manager.blocked_tasks().iter().any(|t| t.id == task.id);

    if output.is_json() {
        let mut value = serde_json::to_value(task)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("isReady".to_string(), is_ready.into());
            object.insert("isBlocked".to_string(), is_blocked.into());
        }
        output.data(&value);
        return Ok(());
    }

    println!("Task: {}", task.id);
    println!("Title: {}", task.title);
    println!("Status: {}", task.status);
    println!("Priority: {}", task.priority);
    println!("Category: {}", task.category);
    match &task.parent_id {
        Some(parent) => println!("Parent: {} (level {})", parent, task.level),
        None => println!("Parent: none (top level)"),
    }
    println!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M"));
    if let Some(completed) = task.completed_at {
        println!("Completed: {}", completed.format("%Y-%m-%d %H:%M"));
    }
    if let Some(due) = task.due_date {
        println!("Due: {}", due.format("%Y-%m-%d %H:%M"));
    }
    if let Some(scheduled) = task.scheduled_date {
        println!("Scheduled: {}", scheduled);
    }
    if !task.tags.is_empty() {
        println!("Tags: {}", task.tags.join(", "));
    }

    if !task.child_ids.is_empty() {
        println!("\nSubtasks:");
        for child in &task.child_ids {
            let status = manager
                .get_task(child)
                .map(|t| t.status.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {} ({})", child, status);
        }
    }

    if !task.dependencies.is_empty() {
        println!("\nDepends on:");
        for dep in &task.dependencies {
            let status = manager
                .get_task(dep)
                .map(|t| t.status.to_string())
                .unwrap_or_else(|| "missing".to_string());
            println!("  {} ({})", dep, status);
        }
    }

    if !task.dependents.is_empty() {
        println!("\nBlocks:");
        for dependent in &task.dependents {
            println!("  {}", dependent);
        }
    }

    if !task.description.is_empty() {
        println!("\nDescription:");
        println!("{}", task.description);
    }

    println!();
    if is_ready {
        println!("Status: READY (all dependencies complete)");
    } else if is_blocked {
        println!("Status: BLOCKED (waiting on dependencies)");
    }

    Ok(())
}
