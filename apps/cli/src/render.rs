//! Terminal rendering of the activity log.

use colored::{ColoredString, Colorize};
use markup_abstraction::{ProgressUpdate, Step};

use crate::state::{LogEntry, ProgressState};

/// Longest prompt or raw output shown inline.
const PREVIEW_CHARS: usize = 160;

fn step_label(step: Step) -> ColoredString {
    let label = format!("[{}]", step.as_str());
    match step {
        Step::Idle => label.dimmed(),
        Step::Planning | Step::Iterating => label.cyan().bold(),
        Step::CallingApi => label.blue().bold(),
        Step::Processing => label.white().bold(),
        Step::SelfChecking => label.magenta().bold(),
        Step::Complete => label.green().bold(),
        Step::Error => label.red().bold(),
    }
}

pub fn format_elapsed(ms: u64) -> String {
    if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// A freshly added log entry: its header line plus indented details.
pub fn render_entry(entry: &LogEntry) -> String {
    let mut lines = vec![format!("{} {}", step_label(entry.step), entry.message)];
    if let Some(iteration) = entry.iteration {
        lines.push(format!("  {} {}/{}", "iteration".dimmed(), iteration.current, iteration.max));
    }
    if let Some(prompt) = entry.prompt.as_deref().filter(|p| !p.is_empty()) {
        lines.push(format!("  {} {}", "prompt".dimmed(), preview(prompt)));
    }
    if let Some(images) = entry.input_images.as_ref().filter(|images| !images.is_empty()) {
        let labels: Vec<&str> = images.iter().map(|image| image.label.as_str()).collect();
        lines.push(format!("  {} {}", "images".dimmed(), labels.join(", ")));
    }
    if let Some(output) = entry.raw_output.as_deref().filter(|o| !o.is_empty()) {
        lines.push(format!("  {} {}", "output".dimmed(), preview(output)));
    }
    if let Some(error) = &entry.error {
        lines.push(format!("  {} {}", "error".red(), error.message));
        if let Some(details) = &error.details {
            lines.push(format!("  {} {}", "details".dimmed(), details));
        }
    }
    if let Some(ms) = entry.duration_ms {
        lines.push(format!("  {} {}", "took".dimmed(), format_elapsed(ms)));
    }
    lines.join("\n")
}

/// Streamed text appended to the current entry.
pub fn render_delta(update: &ProgressUpdate, verbose: bool) -> Option<String> {
    if !verbose {
        return None;
    }
    let text: String = [update.thinking_text_delta.as_deref(), update.raw_output_delta.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    (!text.is_empty()).then(|| text.dimmed().to_string())
}

/// One-line result shown once the operation has finished.
pub fn render_summary(state: &ProgressState) -> String {
    let elapsed = format_elapsed(state.elapsed_ms);
    match (&state.error, &state.result) {
        (Some(error), _) => format!("{} {} ({})", "✗".red(), error.red(), elapsed),
        (None, Some(result)) => {
            let iterations =
                result.iterations.map(|n| format!(", {n} iteration(s)")).unwrap_or_default();
            format!("{} {}{} ({})", "✓".green(), state.message.green(), iterations, elapsed)
        }
        (None, None) => format!("{} {} ({})", "•".dimmed(), state.message, elapsed),
    }
}
