//! `markup edit`: the agentic edit loop.

use std::path::PathBuf;

use markup_cli::MarkupClient;
use markup_cli::client::files::read_image;
use serde::Serialize;
use serde_json::json;

use super::{OutputOptions, run_operation};

/// A labeled point, given on the command line as `label@x,y`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferencePoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Parses `label@x,y`.
pub fn parse_point(value: &str) -> Result<ReferencePoint, String> {
    let (label, coords) =
        value.rsplit_once('@').ok_or_else(|| format!("expected label@x,y, got '{value}'"))?;
    let (x, y) =
        coords.split_once(',').ok_or_else(|| format!("expected x,y after '@', got '{coords}'"))?;
    let parse = |n: &str| n.trim().parse::<f64>().map_err(|_| format!("'{n}' is not a number"));
    if label.is_empty() {
        return Err("point label is empty".to_string());
    }
    Ok(ReferencePoint { label: label.to_string(), x: parse(x)?, y: parse(y)? })
}

#[derive(Debug, Clone)]
pub struct EditArgs {
    pub image: PathBuf,
    pub prompt: String,
    pub mask: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub points: Vec<ReferencePoint>,
}

pub async fn execute(
    client: &MarkupClient,
    args: EditArgs,
    output: OutputOptions,
) -> anyhow::Result<()> {
    let mut body = json!({
        "sourceImage": read_image(&args.image)?,
        "prompt": args.prompt,
    });
    if let Some(mask) = &args.mask {
        body["maskImage"] = json!(read_image(mask)?);
    }
    if let Some(max) = args.max_iterations {
        body["maxIterations"] = json!(max);
    }
    if !args.points.is_empty() {
        body["referencePoints"] = serde_json::to_value(&args.points)?;
    }
    run_operation(client, "/api/agentic/edit", &body, output).await
}
