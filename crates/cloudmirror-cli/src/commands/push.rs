//! Push command - place a file under the mount path
//!
//! `cloudmirror push report.pdf` copies the file to
//! `<mount>/notes/report.pdf`; `--dest` picks another directory and
//! `--dest /` the mount root. The next cycle (from `cloudmirror sync` or
//! the daemon) uploads it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use cloudmirror_core::domain::RelativePath;

use super::load_lenient;
use crate::output::OutputFormat;

/// Where pushed files land unless `--dest` says otherwise
pub const DEFAULT_PUSH_DIR: &str = "notes";

#[derive(Debug, Args)]
pub struct PushCommand {
    /// File to copy into the mount directory
    pub file: PathBuf,

    /// Mount-relative directory to place it in (created when missing)
    #[arg(long, default_value = DEFAULT_PUSH_DIR)]
    pub dest: String,

    /// Replace an existing file with the same name
    #[arg(long)]
    pub force: bool,
}

impl PushCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = format.formatter();
        let config = load_lenient(config_path)?;

        let placed = push_file(
            &config.sync.mount_path,
            &self.file,
            &self.dest,
            self.force,
        )?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "source": self.file.display().to_string(),
                "relative_path": placed.relative_path.as_str(),
                "bytes": placed.bytes,
            }));
        } else {
            formatter.success(&format!("Placed {}", placed.relative_path));
            formatter.info("It will be uploaded on the next sync cycle.");
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Placed {
    relative_path: RelativePath,
    bytes: u64,
}

fn push_file(mount: &Path, source: &Path, dest: &str, force: bool) -> Result<Placed> {
    if !mount.is_dir() {
        anyhow::bail!("Mount path {} is not a directory", mount.display());
    }
    if !source.is_file() {
        anyhow::bail!("{} is not a regular file", source.display());
    }

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", source.display()))?;

    let dir: RelativePath = dest
        .trim_matches('/')
        .parse()
        .with_context(|| format!("Invalid destination '{dest}'"))?;
    let relative_path = dir.join(file_name)?;

    let target = relative_path.to_local(mount);
    if target.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", relative_path);
    }

    let target_dir = dir.to_local(mount);
    std::fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;
    let bytes = std::fs::copy(source, &target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;

    info!(path = %relative_path, bytes, "Copied file into mount");
    Ok(Placed {
        relative_path,
        bytes,
    })
}
