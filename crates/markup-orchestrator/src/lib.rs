//! Agentic image-edit orchestrator for markup.
//!
//! Runs planning, generation and self-check in sequence for one edit request,
//! reporting every phase through a [`ProgressReporter`](markup_abstraction::ProgressReporter).

pub mod editor;
pub mod error;
pub mod prompts;
pub mod verdict;

pub use editor::{AgenticEditor, EditOutcome, EditRequest, EditorConfig};
pub use error::{OrchestrationError, Result};
pub use prompts::{
    PAINTER_TOOL, ReferencePoint, build_evaluation_prompt, build_planning_prompt,
    image_painter_tool,
};
pub use verdict::{Verdict, parse_verdict, refine_prompt};
