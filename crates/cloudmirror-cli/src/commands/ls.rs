//! Ls command - list a directory under the mount path

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use cloudmirror_core::domain::RelativePath;

use super::load_lenient;
use crate::output::{plural, OutputFormat};

#[derive(Debug, Args)]
pub struct LsCommand {
    /// Mount-relative directory (defaults to the mount root)
    pub subdir: Option<String>,
}

impl LsCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = format.formatter();
        let config = load_lenient(config_path)?;
        let entries = list_dir(&config.sync.mount_path, self.subdir.as_deref())?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "entries": entries }));
            return Ok(());
        }

        if entries.is_empty() {
            formatter.info("(empty)");
            return Ok(());
        }
        for entry in &entries {
            if entry.is_dir {
                formatter.info(&format!("{:>10}  {}/", "-", entry.name));
            } else {
                formatter.info(&format!("{:>10}  {}", entry.size, entry.name));
            }
        }
        formatter.info(&plural(entries.len() as u64, "item"));
        Ok(())
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ListEntry {
    name: String,
    is_dir: bool,
    size: u64,
}

/// Directories first, then files, each sorted by name
fn list_dir(mount: &Path, subdir: Option<&str>) -> Result<Vec<ListEntry>> {
    let relative: RelativePath = subdir
        .unwrap_or("")
        .trim_matches('/')
        .parse()
        .with_context(|| format!("Invalid directory '{}'", subdir.unwrap_or("")))?;
    let dir = relative.to_local(mount);

    let read = std::fs::read_dir(&dir).with_context(|| format!("Cannot list {}", dir.display()))?;
    let mut entries = Vec::new();
    for item in read {
        let item = item.with_context(|| format!("Cannot list {}", dir.display()))?;
        let metadata = item.metadata()?;
        entries.push(ListEntry {
            name: item.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}
