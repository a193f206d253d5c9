//! CLI command implementations.

pub mod edit;
pub mod generate;
pub mod health;
pub mod inpaint;
pub mod logs;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Utc;
use colored::Colorize;
use markup_abstraction::WireEvent;
use markup_cli::client::files::{default_output_path, write_image};
use markup_cli::render::{render_delta, render_entry, render_summary};
use markup_cli::{Change, MarkupClient, ProgressState};
use serde_json::Value;

/// Where a streamed operation writes its results.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// The source image, used to name the default output file.
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Export the activity log as JSON.
    pub log: Option<PathBuf>,
    /// Echo streamed thinking text as it arrives.
    pub verbose: bool,
}

/// Runs one streaming operation, rendering the log live, then saves the
/// resulting image. The log is exported even when the stream breaks off.
pub async fn run_operation(
    client: &MarkupClient,
    path: &str,
    body: &Value,
    options: OutputOptions,
) -> anyhow::Result<()> {
    let mut state = ProgressState::new();
    let mut mid_line = false;

    let outcome = client
        .stream(path, body, |event| match state.apply(&event, Utc::now()) {
            Change::Added(index) => {
                if mid_line {
                    println!();
                    mid_line = false;
                }
                println!("{}", render_entry(&state.log[index]));
            }
            Change::Extended(_) => {
                if let WireEvent::Progress(update) = &event {
                    if let Some(text) = render_delta(update, options.verbose) {
                        print!("{text}");
                        mid_line = true;
                    }
                }
            }
            Change::Unchanged => {}
        })
        .await;
    let stream_error = match outcome {
        Ok(()) => None,
        Err(err) if state.log.is_empty() => {
            return Err(anyhow::Error::new(err).context(format!("Request to {path} failed")));
        }
        Err(err) => Some(err),
    };

    if mid_line {
        println!();
    }
    println!("{}", render_summary(&state));

    if let Some(log_path) = &options.log {
        fs::write(log_path, serde_json::to_string_pretty(&state.log)?)
            .with_context(|| format!("Failed to write log to {}", log_path.display()))?;
        println!("{} {}", "Log written to".dimmed(), log_path.display());
    }

    if let Some(err) = stream_error {
        let reason = state.error.clone().unwrap_or_else(|| format!("Request to {path} failed"));
        return Err(anyhow::Error::new(err).context(reason));
    }
    if let Some(error) = &state.error {
        bail!("{error}");
    }
    let result = state.result.context("Server closed the stream without a result")?;
    let output =
        options.output.unwrap_or_else(|| default_output_path(&options.input, &result.image_data));
    write_image(&output, &result.image_data)?;
    println!("{} {}", "Saved".green(), output.display());
    Ok(())
}
