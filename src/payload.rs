use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::{ChatRequest, HistoryTurn};

/// Number of most recent history turns forwarded upstream
pub const HISTORY_WINDOW: usize = 6;

/// Gemini `contents` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

/// OpenAI-style chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

/// Both provider payload shapes for one request.
///
/// Built once so the history window is applied in a single place; the
/// dispatcher picks whichever shape the selected provider speaks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPayloads {
    pub gemini_contents: Vec<GeminiContent>,
    pub openai_messages: Vec<OpenAIMessage>,
}

/// Build the Gemini and OpenAI-style message lists for a validated request
pub fn build_payloads(request: &ChatRequest, system_prompt: &str) -> ChatPayloads {
    let window = recent_history(&request.history);

    let mut gemini_contents: Vec<GeminiContent> = window
        .iter()
        .map(|turn| gemini_content(gemini_role(&turn.role), &turn.text))
        .collect();
    gemini_contents.push(gemini_content("user", &request.prompt));

    let mut openai_messages = Vec::with_capacity(window.len() + 2);
    openai_messages.push(openai_message("system", system_prompt));
    openai_messages.extend(
        window
            .iter()
            .map(|turn| openai_message(openai_role(&turn.role), &turn.text)),
    );
    openai_messages.push(openai_message("user", &request.prompt));

    debug!(
        "🧾 Built payloads: {} of {} history turn(s) kept",
        window.len(),
        request.history.len()
    );

    ChatPayloads {
        gemini_contents,
        openai_messages,
    }
}

/// The trailing `HISTORY_WINDOW` turns, in their original order
fn recent_history(history: &[HistoryTurn]) -> &[HistoryTurn] {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    &history[start..]
}

fn is_assistant_role(role: &str) -> bool {
    matches!(role, "model" | "assistant")
}

// Anything that isn't the assistant is sent as the user.
fn gemini_role(role: &str) -> &'static str {
    if is_assistant_role(role) {
        "model"
    } else {
        "user"
    }
}

fn openai_role(role: &str) -> &'static str {
    if is_assistant_role(role) {
        "assistant"
    } else {
        "user"
    }
}

fn gemini_content(role: &str, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.to_string(),
        parts: vec![GeminiPart {
            text: text.to_string(),
        }],
    }
}

fn openai_message(role: &str, content: &str) -> OpenAIMessage {
    OpenAIMessage {
        role: role.to_string(),
        content: content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with_history(turns: usize) -> ChatRequest {
        ChatRequest {
            prompt: "latest".to_string(),
            history: (0..turns)
                .map(|i| {
                    let role = if i % 2 == 0 { "user" } else { "model" };
                    HistoryTurn::new(role, format!("turn {}", i))
                })
                .collect(),
        }
    }

    #[test]
    fn test_no_history() {
        let payloads = build_payloads(&request_with_history(0), "sys");

        assert_eq!(payloads.gemini_contents.len(), 1);
        assert_eq!(payloads.gemini_contents[0].role, "user");
        assert_eq!(payloads.gemini_contents[0].parts[0].text, "latest");

        assert_eq!(payloads.openai_messages.len(), 2);
        assert_eq!(payloads.openai_messages[0], openai_message("system", "sys"));
        assert_eq!(payloads.openai_messages[1], openai_message("user", "latest"));
    }

    #[test]
    fn test_keeps_last_six_turns_in_order() {
        let payloads = build_payloads(&request_with_history(10), "sys");

        let gemini_texts: Vec<&str> = payloads
            .gemini_contents
            .iter()
            .map(|c| c.parts[0].text.as_str())
            .collect();
        assert_eq!(
            gemini_texts,
            vec!["turn 4", "turn 5", "turn 6", "turn 7", "turn 8", "turn 9", "latest"]
        );

        let openai_texts: Vec<&str> = payloads
            .openai_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            openai_texts,
            vec!["sys", "turn 4", "turn 5", "turn 6", "turn 7", "turn 8", "turn 9", "latest"]
        );
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let payloads = build_payloads(&request_with_history(3), "sys");
        assert_eq!(payloads.gemini_contents.len(), 4);
        assert_eq!(payloads.openai_messages.len(), 5);
    }

    #[test]
    fn test_role_mapping() {
        let request = ChatRequest {
            prompt: "now".to_string(),
            history: vec![
                HistoryTurn::new("user", "a"),
                HistoryTurn::new("model", "b"),
                HistoryTurn::new("assistant", "c"),
                HistoryTurn::new("narrator", "d"),
            ],
        };
        let payloads = build_payloads(&request, "sys");

        let gemini_roles: Vec<&str> = payloads
            .gemini_contents
            .iter()
            .map(|c| c.role.as_str())
            .collect();
        assert_eq!(gemini_roles, vec!["user", "model", "model", "user", "user"]);

        let openai_roles: Vec<&str> = payloads
            .openai_messages
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(
            openai_roles,
            vec!["system", "user", "assistant", "assistant", "user", "user"]
        );
    }

    #[test]
    fn test_gemini_wire_shape() {
        let payloads = build_payloads(&request_with_history(0), "sys");
        assert_eq!(
            serde_json::to_value(&payloads.gemini_contents).unwrap(),
            json!([{ "role": "user", "parts": [{ "text": "latest" }] }])
        );
    }
}
