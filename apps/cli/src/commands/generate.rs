//! `markup generate`: one image generation call, no loop.

use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use markup_cli::MarkupClient;
use markup_cli::client::files::{default_output_path, read_image, write_image};
use serde_json::json;

pub async fn execute(
    client: &MarkupClient,
    image: PathBuf,
    prompt: String,
    model: String,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let body = json!({
        "model": model,
        "sourceImage": read_image(&image)?,
        "prompt": prompt,
        "logLabel": "cli",
    });
    println!("{} {}", "Generating with".dimmed(), model);
    let generated = client.generate_image(&body).await.context("Image generation failed")?;

    if let Some(text) = generated.text.as_deref().filter(|t| !t.trim().is_empty()) {
        println!("{}", text.trim());
    }
    let output = output.unwrap_or_else(|| default_output_path(&image, &generated.image_data));
    write_image(&output, &generated.image_data)?;
    println!("{} {}", "Saved".green(), output.display());
    Ok(())
}
