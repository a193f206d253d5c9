//! `markup inpaint`: edit only the masked region.

use std::path::PathBuf;

use markup_cli::MarkupClient;
use markup_cli::client::files::read_image;
use serde_json::json;

use super::{OutputOptions, run_operation};

pub async fn execute(
    client: &MarkupClient,
    image: PathBuf,
    mask: PathBuf,
    prompt: String,
    thinking_budget: Option<u32>,
    output: OutputOptions,
) -> anyhow::Result<()> {
    let mut body = json!({
        "sourceImage": read_image(&image)?,
        "maskImage": read_image(&mask)?,
        "prompt": prompt,
    });
    if let Some(budget) = thinking_budget {
        body["thinkingBudget"] = json!(budget);
    }
    run_operation(client, "/api/images/inpaint", &body, output).await
}
