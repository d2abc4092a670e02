//! Deterministic context truncation for tiny models.
//!
//! The system message always survives (clipped if it alone overflows), then
//! as many trailing user/assistant exchanges as fit the budget. Identical
//! inputs produce byte-identical output, so reruns are reproducible.

use std::collections::VecDeque;

use llm::ChatMessage;

/// Default per-model character budget.
pub const DEFAULT_CHAR_BUDGET: usize = 1_100;

/// Trim `messages` to at most `budget` content characters.
pub fn truncate_messages_for_fm(messages: &[ChatMessage], budget: usize) -> Vec<ChatMessage> {
    let system = messages.iter().find(|m| m.role == "system");
    let rest: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != "system").collect();

    let mut out: Vec<ChatMessage> = Vec::new();
    let mut used = 0usize;

    if let Some(system) = system {
        let len = system.content.chars().count();
        if len > budget {
            // Nothing else can fit; keep a clipped system message alone.
            let clipped: String = system.content.chars().take(budget).collect();
            return vec![ChatMessage {
                role: system.role.clone(),
                content: clipped,
            }];
        }
        out.push(system.clone());
        used += len;
    }

    // Take whole messages from the tail while they fit.
    let mut kept: VecDeque<&ChatMessage> = VecDeque::new();
    for message in rest.iter().rev() {
        let len = message.content.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        kept.push_front(message);
    }

    // Drop a leading assistant fragment so the tail starts on a user turn,
    // keeping complete user/assistant pairs.
    while kept
        .front()
        .map(|m| m.role == "assistant")
        .unwrap_or(false)
    {
        kept.pop_front();
    }

    out.extend(kept.into_iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_small_conversation_untouched() {
        let messages = vec![
            msg("system", "be brief"),
            msg("user", "hi"),
            msg("assistant", "hello"),
        ];
        let out = truncate_messages_for_fm(&messages, DEFAULT_CHAR_BUDGET);
        assert_eq!(out, messages);
    }

    #[test]
    fn test_system_always_kept() {
        let messages = vec![
            msg("system", "keep me"),
            msg("user", &"u".repeat(600)),
            msg("assistant", &"a".repeat(600)),
            msg("user", &"v".repeat(300)),
            msg("assistant", &"b".repeat(100)),
        ];
        let out = truncate_messages_for_fm(&messages, 600);
        assert_eq!(out[0].role, "system");
        // Only the last exchange fits next to the system message.
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].role, "user");
        assert!(out[1].content.starts_with('v'));
    }

    #[test]
    fn test_oversized_system_clipped_alone() {
        let messages = vec![msg("system", &"s".repeat(2000)), msg("user", "hi")];
        let out = truncate_messages_for_fm(&messages, 500);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, "system");
        assert_eq!(out[0].content.chars().count(), 500);
    }

    #[test]
    fn test_leading_assistant_fragment_dropped() {
        let messages = vec![
            msg("user", &"u".repeat(500)),
            msg("assistant", &"a".repeat(80)),
            msg("user", &"v".repeat(80)),
            msg("assistant", &"b".repeat(80)),
        ];
        // Budget admits the last three but not the first user turn.
        let out = truncate_messages_for_fm(&messages, 300);
        assert_eq!(out.first().unwrap().role, "user");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_truncation_is_deterministic() {
        let messages: Vec<ChatMessage> = (0..20)
            .flat_map(|i| {
                vec![
                    msg("user", &format!("question {i} {}", "x".repeat(i * 7))),
                    msg("assistant", &format!("answer {i} {}", "y".repeat(i * 5))),
                ]
            })
            .collect();

        let a = truncate_messages_for_fm(&messages, DEFAULT_CHAR_BUDGET);
        let b = truncate_messages_for_fm(&messages, DEFAULT_CHAR_BUDGET);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
