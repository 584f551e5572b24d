use serde::{Deserialize, Serialize};

/// One role-tagged entry of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(format!("Unknown message role: {}", s)),
        }
    }
}

impl Message {
    /// Create a message without a role; it is sent as `user`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: None,
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Some(MessageRole::System),
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Some(MessageRole::User),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Some(MessageRole::Assistant),
        }
    }
}

/// Message as it appears on the chat-completions wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg
                .role
                .unwrap_or(MessageRole::User)
                .as_str()
                .to_string(),
            content: Some(msg.text.clone()),
        }
    }
}

/// Request to the chat-completions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// Create a request for `n` completions of the given transcript
    pub fn new(model: impl Into<String>, transcript: &[Message], n: usize) -> Self {
        Self {
            model: model.into(),
            messages: transcript.iter().map(ChatMessage::from).collect(),
            n: n.max(1),
            stop: None,
            temperature: None,
        }
    }

    /// Stop generation at any of the given markers
    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        if !stop.is_empty() {
            self.stop = Some(stop.iter().map(|s| s.to_string()).collect());
        }
        self
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from the chat-completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// One sampled continuation
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    /// Convert choices into transcript messages, in choice order
    pub fn into_messages(self) -> Vec<Message> {
        let mut choices = self.choices;
        choices.sort_by_key(|c| c.index);
        choices
            .into_iter()
            .map(|c| Message {
                text: c.message.content.unwrap_or_default(),
                role: c
                    .message
                    .role
                    .parse()
                    .ok()
                    .or(Some(MessageRole::Assistant)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, Some(MessageRole::System));
        assert_eq!(Message::user("u").role, Some(MessageRole::User));
        assert_eq!(Message::assistant("a").role, Some(MessageRole::Assistant));
        assert_eq!(Message::new("plain").role, None);
    }

    #[test]
    fn test_roleless_message_goes_out_as_user() {
        let wire = ChatMessage::from(&Message::new("hello"));
        assert_eq!(wire.role, "user");
        assert_eq!(wire.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_chat_request_serialization() {
        let req = ChatRequest::new("gpt-test", &[Message::user("hi")], 3)
            .with_stop(&["Observation"])
            .with_temperature(0.7);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gpt-test");
        assert_eq!(value["n"], 3);
        assert_eq!(value["stop"], json!(["Observation"]));
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_chat_request_omits_empty_stop() {
        let req = ChatRequest::new("m", &[], 0).with_stop(&[]);
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("stop").is_none());
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_response_into_messages_orders_by_index() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [
                {"index": 1, "message": {"role": "assistant", "content": "second"}},
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 2, "message": {"role": "assistant", "content": null}}
            ]
        }))
        .unwrap();
        let messages = response.into_messages();
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
        assert_eq!(messages[2].text, "");
        assert_eq!(messages[0].role, Some(MessageRole::Assistant));
    }
}
