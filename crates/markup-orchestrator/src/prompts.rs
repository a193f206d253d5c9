//! Prompt templates for planning and self-check.

use std::fmt::Write as _;

use markup_abstraction::FunctionDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name of the single tool the planner is asked to call.
pub const PAINTER_TOOL: &str = "image_painter";

/// A labeled point on the source image, used for spatial commands such as
/// "move A to B".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub label: String,
    /// Pixels from the left edge.
    pub x: f64,
    /// Pixels from the top edge.
    pub y: f64,
}

/// Declaration of the `image_painter(prompt: string)` tool.
pub fn image_painter_tool() -> FunctionDeclaration {
    FunctionDeclaration {
        name: PAINTER_TOOL.to_string(),
        description: "Edits the image. Provide a detailed prompt describing what to create/modify, \
                      including style and coherence details."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Detailed description of the edit, including how it should \
                                    fit naturally into the image."
                }
            },
            "required": ["prompt"]
        }),
    }
}

/// Builds the planning prompt.
pub fn build_planning_prompt(
    user_prompt: &str,
    has_mask: bool,
    reference_points: &[ReferencePoint],
) -> String {
    let mask_context = if has_mask {
        "The user has selected a specific area of the image (shown as a white mask). \
         Your edits should focus on this masked region."
    } else {
        "The user wants to edit the entire image."
    };

    let mut prompt = format!(
        "You are an expert image editing assistant working on a SCREENSHOT MODIFICATION task.\n\n\
         USER'S REQUEST: \"{user_prompt}\"\n\n\
         {mask_context}\n"
    );

    if !reference_points.is_empty() {
        prompt.push_str(
            "\nThe user has placed labeled reference points on the image. \
             Use them to resolve spatial instructions (e.g. \"move A to B\"):\n",
        );
        for point in reference_points {
            let _ = writeln!(
                prompt,
                "- Point {}: x={:.0}, y={:.0} (pixels)",
                point.label, point.x, point.y
            );
        }
    }

    prompt.push_str(&format!(
        "\nYour goal is to create an edit that:\n\
         1. Accomplishes exactly what the user wants\n\
         2. FITS NATURALLY into the existing image - the modification should look like it \
         belongs there\n\
         3. Matches the style, lighting, perspective, and aesthetic of the original screenshot\n\
         4. Unless the user explicitly asks for something that stands out, edits should be \
         SEAMLESS and COHERENT\n\n\
         Think deeply about:\n\
         - What is the user really trying to achieve?\n\
         - What visual details would make this edit look natural and integrated?\n\
         - How should lighting, shadows, and style match the surroundings?\n\
         - What would make someone looking at the final image NOT notice it was edited?\n\n\
         You have one powerful tool: {PAINTER_TOOL}, which edits images.\n\n\
         Call {PAINTER_TOOL} with a detailed prompt that achieves the goal while ensuring \
         visual coherence.\n\n\
         You MUST call the {PAINTER_TOOL} tool."
    ));
    prompt
}

/// Builds the self-check prompt.
pub fn build_evaluation_prompt(user_prompt: &str, edit_prompt: &str) -> String {
    format!(
        "Evaluate whether this image edit meets the user's request.\n\n\
         **User's request:** \"{user_prompt}\"\n\
         **Edit prompt used:** \"{edit_prompt}\"\n\n\
         You will see the original image (BEFORE) and edited result (AFTER).\n\n\
         Evaluate:\n\
         1. Does the edit match the user's request?\n\
         2. Is the edit visible and significant enough?\n\
         3. Does it look natural and coherent?\n\
         4. Are there quality issues or artifacts?\n\n\
         Respond with JSON in this exact format:\n\n\
         ```json\n\
         {{\n  \"satisfied\": true or false,\n  \"reasoning\": \"explanation\",\n  \
         \"revised_prompt\": \"improved prompt if not satisfied\"\n}}\n\
         ```"
    )
}
