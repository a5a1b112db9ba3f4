// Legacy fallback: scan assistant text for tagged tool-call fragments when
// the model didn't populate structured `tool_calls` (spec.md §4.7 step 4b,
// §9 "ad-hoc tool-call parsing from model text").
//
// Recognizes `<tool_call>{"name": "...", "arguments": {...}}</tool_call>`,
// the convention used by several open-weight chat templates (Hermes/Qwen
// style). Malformed fragments are skipped rather than failing the whole
// parse — one bad tag shouldn't take down an otherwise-valid response.

use mlm_contracts::ToolCall;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use uuid::Uuid;

static TOOL_CALL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").expect("static pattern is valid")
});

#[derive(Deserialize)]
struct TaggedFragment {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Returns every well-formed tagged fragment found in `content`, synthesizing
/// a fresh call id for each since the legacy convention carries none.
pub fn parse_tagged_fragments(content: &str) -> Vec<ToolCall> {
    TOOL_CALL_TAG
        .captures_iter(content)
        .filter_map(|cap| {
            let json = cap.get(1)?.as_str();
            let fragment: TaggedFragment = serde_json::from_str(json).ok()?;
            Some(ToolCall {
                id: format!("legacy-{}", Uuid::new_v4()),
                name: fragment.name,
                arguments: fragment.arguments,
            })
        })
        .collect()
}
