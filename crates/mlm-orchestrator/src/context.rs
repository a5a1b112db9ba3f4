// Context-window safeguards (spec.md §4.7 "Context-size safeguards").
//
// The token estimator and the safe-output-tokens computation are both pure
// functions of the message list / declared limits so they're trivial to unit
// test without a model in the loop.

use mlm_contracts::{ChatRole, ChatTurn};

use crate::model_client::{ModelCaller, ToolSchema};
use crate::truncate::truncate_payload;

pub const COMPACTION_TRIGGER_RATIO: f64 = 0.7;
pub const KEEP_LAST_N_MESSAGES: usize = 6;
const CONFIGURED_OUTPUT_CAP: u32 = 4096;
const SAFETY_PAD_TOKENS: u32 = 256;
const MIN_OUTPUT_TOKENS: u32 = 256;
const CHARS_PER_TOKEN: usize = 4;

/// Deterministic, heuristic token estimate: total character count of all
/// message content (role and tool-call JSON included) divided by a fixed
/// chars-per-token ratio. Documented as a heuristic, not an exact count.
pub fn estimate_input_tokens(messages: &[ChatTurn]) -> u32 {
    let chars: usize = messages
        .iter()
        .map(|m| {
            let call_chars: usize = m
                .tool_calls
                .as_ref()
                .map(|calls| {
                    calls
                        .iter()
                        .map(|c| c.name.len() + c.arguments.to_string().len())
                        .sum()
                })
                .unwrap_or(0);
            m.content.len() + call_chars
        })
        .sum();
    ((chars / CHARS_PER_TOKEN) as u32).max(1)
}

pub fn needs_compaction(estimated_input_tokens: u32, max_context_tokens: u32) -> bool {
    if max_context_tokens == 0 {
        return false;
    }
    (estimated_input_tokens as f64) > COMPACTION_TRIGGER_RATIO * max_context_tokens as f64
}

/// `min(ConfiguredCap, floor(max_context * 0.4), max_context - estimated_input - SafetyPad)`,
/// floored at 256.
pub fn safe_max_output_tokens(max_context_tokens: u32, estimated_input_tokens: u32) -> u32 {
    if max_context_tokens == 0 {
        return CONFIGURED_OUTPUT_CAP.max(MIN_OUTPUT_TOKENS);
    }
    let quota = (max_context_tokens as f64 * 0.4).floor() as u32;
    let remaining = max_context_tokens
        .saturating_sub(estimated_input_tokens)
        .saturating_sub(SAFETY_PAD_TOKENS);
    CONFIGURED_OUTPUT_CAP
        .min(quota)
        .min(remaining)
        .max(MIN_OUTPUT_TOKENS)
}

/// Keep the system message and the last `KEEP_LAST_N_MESSAGES`, replacing the
/// middle with one summary message. Tries a short auxiliary request to the
/// same model first; falls back to a truncation-based summary if that call
/// fails.
pub async fn compact(
    messages: &[ChatTurn],
    model_client: &dyn ModelCaller,
    port: u16,
    model_id: &str,
) -> Vec<ChatTurn> {
    if messages.len() <= KEEP_LAST_N_MESSAGES + 1 {
        return messages.to_vec();
    }

    let system = messages
        .first()
        .filter(|m| m.role == ChatRole::System)
        .cloned();
    let head_len = if system.is_some() { 1 } else { 0 };
    let tail_start = messages.len().saturating_sub(KEEP_LAST_N_MESSAGES);
    let middle = &messages[head_len..tail_start.max(head_len)];
    let tail = &messages[tail_start..];

    let summary_text = summarize_middle(middle, model_client, port, model_id)
        .await
        .unwrap_or_else(|| fallback_summary(middle));

    let mut compacted = Vec::with_capacity(2 + tail.len());
    if let Some(sys) = system {
        compacted.push(sys);
    }
    compacted.push(ChatTurn {
        role: ChatRole::System,
        content: format!("[conversation summary]\n{summary_text}"),
        tool_calls: None,
        tool_call_id: None,
    });
    compacted.extend(tail.iter().cloned());
    compacted
}

async fn summarize_middle(
    middle: &[ChatTurn],
    model_client: &dyn ModelCaller,
    port: u16,
    model_id: &str,
) -> Option<String> {
    if middle.is_empty() {
        return Some(String::new());
    }
    let transcript = middle
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let request = vec![
        ChatTurn {
            role: ChatRole::System,
            content: "Summarize the following conversation excerpt in a few sentences, \
                      preserving any facts or decisions a later reply would need."
                .to_string(),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatTurn {
            role: ChatRole::User,
            content: transcript,
            tool_calls: None,
            tool_call_id: None,
        },
    ];

    let response = model_client
        .chat_completion(port, model_id, &request, &[] as &[ToolSchema], 512)
        .await
        .ok()?;
    Some(response.content)
}

fn fallback_summary(middle: &[ChatTurn]) -> String {
    let user_messages: Vec<&str> = middle
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .collect();
    let last_assistant = middle
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let mut summary = String::from("User asked about: ");
    summary.push_str(&user_messages.join("; "));
    summary.push_str("\nMost recent assistant reply: ");
    summary.push_str(last_assistant);
    truncate_payload(&summary, 2000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_tokens_from_content_length() {
        let messages = vec![ChatTurn {
            role: ChatRole::User,
            content: "a".repeat(400),
            tool_calls: None,
            tool_call_id: None,
        }];
        assert_eq!(estimate_input_tokens(&messages), 100);
    }

    #[test]
    fn triggers_compaction_past_seventy_percent() {
        assert!(needs_compaction(71, 100));
        assert!(!needs_compaction(70, 100));
    }

    #[test]
    fn safe_output_tokens_respects_floor() {
        let tokens = safe_max_output_tokens(1000, 990);
        assert_eq!(tokens, MIN_OUTPUT_TOKENS);
    }

    #[test]
    fn safe_output_tokens_respects_context_quota() {
        let tokens = safe_max_output_tokens(10_000, 100);
        assert_eq!(tokens, 4000);
    }
}
