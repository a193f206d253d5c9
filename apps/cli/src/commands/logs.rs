//! `markup merge-logs`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use markup_cli::{LogEntry, merge_logs};

fn read_log(path: &Path) -> anyhow::Result<Vec<LogEntry>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not an exported log", path.display()))
}

pub fn execute(first: &Path, second: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let merged = merge_logs(&read_log(first)?, &read_log(second)?);
    let json = serde_json::to_string_pretty(&merged)?;
    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Merged {} entries into {}", merged.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
