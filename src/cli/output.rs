//! Output formatting for CLI commands

use serde::Serialize;

use crate::domain::Task;
pub use crate::storage::OutputFormat;

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Prints a list of tasks as a table, or as a JSON array
    pub fn tasks(&self, tasks: &[&Task], empty_message: &str) {
        if self.is_json() {
            self.data(&tasks);
        } else if tasks.is_empty() {
            println!("{}", empty_message);
        } else {
            println!("{:<32} {:<12} {:<8} TITLE", "ID", "STATUS", "PRIORITY");
            println!("{}", "-".repeat(72));
            for task in tasks {
                println!(
                    "{:<32} {:<12} {:<8} {}",
                    task.id, task.status, task.priority, task.title
                );
            }
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
