//! Pull command - print a file from the mount path
//!
//! Reads the local copy only. Files that exist solely in the remote store
//! are reported as missing; mirroring is one-way and nothing is downloaded.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use cloudmirror_core::domain::RelativePath;

use super::load_lenient;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct PullCommand {
    /// Mount-relative path of the file, e.g. `notes/todo.md`
    pub name: String,
}

impl PullCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let config = load_lenient(config_path)?;
        let (relative_path, content) = read_from_mount(&config.sync.mount_path, &self.name)?;

        if format.is_json() {
            let text = String::from_utf8(content).ok();
            format.formatter().print_json(&serde_json::json!({
                "relative_path": relative_path.as_str(),
                "utf8": text.is_some(),
                "content": text,
            }));
            return Ok(());
        }

        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&content)
            .and_then(|()| stdout.flush())
            .context("Failed to write to stdout")?;
        Ok(())
    }
}

fn read_from_mount(mount: &Path, name: &str) -> Result<(RelativePath, Vec<u8>)> {
    let relative_path: RelativePath = name
        .trim_start_matches('/')
        .parse()
        .with_context(|| format!("Invalid name '{name}'"))?;
    if relative_path.is_root() {
        anyhow::bail!("Name a file under the mount, not the mount itself");
    }

    let path = relative_path.to_local(mount);
    if !path.exists() {
        anyhow::bail!(
            "{relative_path} is not present under {}; remote-only files are not downloaded",
            mount.display()
        );
    }
    if !path.is_file() {
        anyhow::bail!("{relative_path} is not a regular file");
    }

    let content =
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((relative_path, content))
}
