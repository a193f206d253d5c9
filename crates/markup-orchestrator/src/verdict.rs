//! Extraction from unstructured model output: the refined edit prompt and the
//! self-check verdict.

use std::sync::LazyLock;

use markup_abstraction::FunctionCall;
use regex::Regex;
use serde_json::Value;

static PAINTER_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"image_painter\s*\(\s*prompt\s*=\s*"([^"]+)""#)
        .expect("painter call pattern is valid")
});

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").expect("fenced block pattern is valid")
});

/// Picks the prompt to send to the image collaborator.
///
/// Priority: the tool call's `prompt` argument, then a textual
/// `image_painter(prompt="...")` expression, then the user's prompt unchanged.
pub fn refine_prompt(function_call: Option<&FunctionCall>, text: &str, original: &str) -> String {
    let from_call = function_call
        .and_then(|call| call.string_arg("prompt"))
        .filter(|p| !p.trim().is_empty());
    if let Some(prompt) = from_call {
        return prompt.to_string();
    }
    if let Some(captures) = PAINTER_CALL.captures(text) {
        return captures[1].to_string();
    }
    original.to_string()
}

/// Outcome of a self-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub satisfied: bool,
    pub reasoning: String,
    /// Present only when non-empty.
    pub revised_prompt: Option<String>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self { satisfied: true, reasoning: String::new(), revised_prompt: None }
    }
}

impl Verdict {
    fn from_object(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let satisfied = match object.get("satisfied") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.trim().eq_ignore_ascii_case("false"),
            _ => true,
        };
        let reasoning =
            object.get("reasoning").and_then(Value::as_str).unwrap_or_default().to_string();
        let revised_prompt = object
            .get("revised_prompt")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Some(Self { satisfied, reasoning, revised_prompt })
    }
}

/// Parses a self-check reply.
///
/// Looks at `thinking` followed by `text`: first a fenced code block, then any
/// brace-delimited JSON object. Anything unparseable yields a satisfied
/// verdict.
pub fn parse_verdict(thinking: &str, text: &str) -> Verdict {
    let combined = format!("{thinking}{text}");

    let fenced = FENCED_BLOCK
        .captures_iter(&combined)
        .filter_map(|captures| serde_json::from_str::<Value>(captures[1].trim()).ok())
        .find_map(|value| Verdict::from_object(&value));
    if let Some(verdict) = fenced {
        return verdict;
    }

    let objects: Vec<Value> = brace_objects(&combined).collect();
    objects
        .iter()
        .find(|value| value.get("satisfied").is_some())
        .or_else(|| objects.first())
        .and_then(Verdict::from_object)
        .unwrap_or_default()
}

/// Yields every balanced `{...}` span that parses as a JSON object, scanning
/// left to right and skipping past each match.
fn brace_objects(input: &str) -> impl Iterator<Item = Value> + '_ {
    let bytes = input.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            let start = pos + input[pos..].find('{')?;
            match balanced_end(&bytes[start..]) {
                Some(len) => {
                    let candidate = &input[start..start + len];
                    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                        pos = start + len;
                        return Some(value);
                    }
                    pos = start + 1;
                }
                None => pos = start + 1,
            }
        }
        None
    })
}

/// Length of the balanced object starting at `bytes[0] == b'{'`, honoring
/// JSON string escapes.
fn balanced_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    fn painter(prompt: &str) -> FunctionCall {
        let mut args = Map::new();
        args.insert("prompt".to_string(), json!(prompt));
        FunctionCall { name: "image_painter".to_string(), args }
    }

    #[test]
    fn test_tool_call_wins_over_text_pattern() {
        let call = painter("X");
        let refined = refine_prompt(Some(&call), r#"image_painter(prompt="Y")"#, "original");
        assert_eq!(refined, "X");
    }

    #[test]
    fn test_text_pattern_without_tool_call() {
        let text = r#"I will call image_painter( prompt = "Y" ) now"#;
        let refined = refine_prompt(None, text, "original");
        assert_eq!(refined, "Y");
    }

    #[test]
    fn test_original_prompt_when_nothing_matches() {
        assert_eq!(refine_prompt(None, "no tool here", "add a red hat"), "add a red hat");
    }

    #[test]
    fn test_tool_call_without_prompt_falls_through() {
        let call = FunctionCall { name: "image_painter".to_string(), args: Map::new() };
        assert_eq!(refine_prompt(Some(&call), r#"image_painter(prompt="Y")"#, "o"), "Y");
        let blank = painter("  ");
        assert_eq!(refine_prompt(Some(&blank), "", "o"), "o");
    }

    #[test]
    fn test_fenced_verdict() {
        let text = concat!(
            "Looks off.\n```json\n",
            r#"{"satisfied": false, "reasoning": "hat is blue", "#,
            r#""revised_prompt": "make the hat red"}"#,
            "\n```"
        );
        assert_eq!(
            parse_verdict("", text),
            Verdict {
                satisfied: false,
                reasoning: "hat is blue".to_string(),
                revised_prompt: Some("make the hat red".to_string()),
            }
        );
    }

    #[test]
    fn test_fence_without_language_tag() {
        let verdict = parse_verdict("", "```\n{\"satisfied\": true, \"reasoning\": \"good\"}\n```");
        assert!(verdict.satisfied);
        assert_eq!(verdict.reasoning, "good");
        assert_eq!(verdict.revised_prompt, None);
    }

    #[test]
    fn test_raw_brace_verdict_in_thinking() {
        let thinking = concat!(
            r#"Draft answer: {"satisfied": false, "reasoning": "too subtle {really}", "#,
            r#""revised_prompt": "bigger"} ok"#
        );
        let verdict = parse_verdict(thinking, "final words without json");
        assert!(!verdict.satisfied);
        assert_eq!(verdict.reasoning, "too subtle {really}");
        assert_eq!(verdict.revised_prompt.as_deref(), Some("bigger"));
    }

    #[test]
    fn test_raw_scan_prefers_verdict_shaped_object() {
        let text =
            r#"{"note": 1} then {"satisfied": false, "reasoning": "r", "revised_prompt": "p"}"#;
        assert!(!parse_verdict("", text).satisfied);
    }

    #[test]
    fn test_unparseable_reply_fails_open() {
        assert_eq!(parse_verdict("hmm", "I think it is fine {not json"), Verdict::default());
        assert!(parse_verdict("", "").satisfied);
    }

    #[test]
    fn test_broken_fence_falls_back_to_brace_scan() {
        let text = concat!(
            "```json\n{satisfied: nope}\n```\n",
            r#"Actually: {"satisfied": false, "revised_prompt": "again"}"#
        );
        let verdict = parse_verdict("", text);
        assert!(!verdict.satisfied);
        assert_eq!(verdict.revised_prompt.as_deref(), Some("again"));
    }

    #[test]
    fn test_empty_revised_prompt_is_none() {
        let text = r#"{"satisfied": false, "reasoning": "meh", "revised_prompt": "  "}"#;
        let verdict = parse_verdict("", text);
        assert!(!verdict.satisfied);
        assert_eq!(verdict.revised_prompt, None);
    }
}
