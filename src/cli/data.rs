//! Data commands (export, import, settings, info, clear)

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

use super::app::Manager;
use super::output::Output;
use crate::storage::SettingsPatch;

pub fn export(manager: &Manager, output: &Output, path: Option<&Path>) -> Result<()> {
    let document = manager.export_data().context("Failed to export data")?;

    match path {
        Some(path) => {
            fs::write(path, &document)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            output.success(&format!(
                "Exported {} task(s) to {}",
                manager.len(),
                path.display()
            ));
        }
        None => println!("{}", document),
    }

    Ok(())
}

pub fn import(manager: &mut Manager, output: &Output, file: &Path) -> Result<()> {
    let text = if file.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        fs::read_to_string(file)
            .with_context(|| format!("Failed to read import file: {}", file.display()))?
    };

    let count = manager.import_data(&text).context("Import failed")?;

    if output.is_json() {
        output.data(&serde_json::json!({ "imported": count }));
    } else {
        output.success(&format!("Imported {} task(s)", count));
    }

    Ok(())
}

pub fn settings(manager: &mut Manager, output: &Output, patch: SettingsPatch) -> Result<()> {
    let settings = if patch == SettingsPatch::default() {
        manager.settings()
    } else {
        manager.update_settings(&patch)?
    };

    if output.is_json() {
        output.data(&settings);
    } else {
        println!("theme:            {}", settings.theme);
        println!("language:         {}", settings.language);
        println!("default priority: {}", settings.default_priority);
        println!("auto save:        {}", settings.auto_save);
    }

    Ok(())
}

pub fn info(manager: &Manager, output: &Output) -> Result<()> {
    let info = manager.storage_info()?;

    if output.is_json() {
        output.data(&info);
    } else {
        println!("Tasks:      {}", info.task_count);
        println!("Used:       {} bytes", info.used_space);
        println!("Capacity:   {} bytes", info.max_space);
        println!("Usage:      {:.2}%", info.usage_percentage);
    }

    Ok(())
}

pub fn clear(manager: &mut Manager, output: &Output, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!("Refusing to delete all data without --yes");
    }

    manager.clear_all_data()?;
    output.success("Deleted all stored data");
    Ok(())
}
