use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Upper bound on prompt length, in characters
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Upper bound on the raw request body read from the client
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Validated inbound chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

/// One prior exchange in the conversation as sent by the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Request body must be valid JSON")]
    MalformedBody,
    #[error("Prompt is required, must not be blank and must be at most 2000 characters")]
    InvalidPrompt,
    #[error("History must be a list of {{role, text}} entries")]
    InvalidHistory,
}

/// Parse and validate a raw request body
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ValidationError> {
    let json: Value = serde_json::from_slice(body).map_err(|_| ValidationError::MalformedBody)?;
    validate_chat_request(&json)
}

/// Validate an already-decoded request body.
///
/// Unknown fields are ignored. A `null` history is treated the same as a
/// missing one.
pub fn validate_chat_request(json: &Value) -> Result<ChatRequest, ValidationError> {
    let prompt = json
        .get("prompt")
        .and_then(|p| p.as_str())
        .ok_or(ValidationError::InvalidPrompt)?;

    if prompt.trim().is_empty() || prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ValidationError::InvalidPrompt);
    }

    let history = match json.get("history") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(turns)) => turns
            .iter()
            .map(parse_turn)
            .collect::<Option<Vec<_>>>()
            .ok_or(ValidationError::InvalidHistory)?,
        Some(_) => return Err(ValidationError::InvalidHistory),
    };

    Ok(ChatRequest {
        prompt: prompt.to_string(),
        history,
    })
}

fn parse_turn(turn: &Value) -> Option<HistoryTurn> {
    let role = turn.get("role")?.as_str()?;
    let text = turn.get("text")?.as_str()?;
    Some(HistoryTurn::new(role, text))
}
