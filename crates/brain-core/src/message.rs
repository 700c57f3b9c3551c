//! Inbound message types and conversation turn items.

use serde::{Deserialize, Serialize};

/// Text body of an inbound message.
///
/// Messaging webhooks are inconsistent about the shape of the text field:
/// some deliver a plain string, some an array of fragments, and some a
/// string that itself contains a JSON array. All three are accepted and
/// collapsed by [`MessageText::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageText {
    /// A single string.
    Text(String),
    /// A list of fragments.
    Parts(Vec<String>),
}

impl Default for MessageText {
    fn default() -> Self {
        MessageText::Text(String::new())
    }
}

impl From<&str> for MessageText {
    fn from(value: &str) -> Self {
        MessageText::Text(value.to_string())
    }
}

impl From<String> for MessageText {
    fn from(value: String) -> Self {
        MessageText::Text(value)
    }
}

impl MessageText {
    /// Collapse the text into a single trimmed string.
    pub fn normalize(&self) -> String {
        match self {
            MessageText::Parts(parts) => join_parts(parts),
            MessageText::Text(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with('[') && trimmed.ends_with(']') {
                    if let Ok(parts) = serde_json::from_str::<Vec<String>>(trimmed) {
                        return join_parts(&parts);
                    }
                }
                trimmed.to_string()
            }
        }
    }
}

fn join_parts(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A location shared by the citizen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Place name, when the channel provides one.
    #[serde(default)]
    pub name: Option<String>,
    /// Address text, when the channel provides one.
    #[serde(default)]
    pub address: Option<String>,
}

impl SharedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: None,
            address: None,
        }
    }
}

/// An audio clip (voice note) attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    /// MIME type (e.g., "audio/ogg").
    pub content_type: String,
    /// Remote location of the clip, if it was not delivered inline.
    #[serde(default)]
    pub url: Option<String>,
    /// Raw audio bytes, if delivered inline.
    #[serde(default)]
    pub data: Vec<u8>,
}

/// A message delivered by the messaging channel integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Conversation identifier (usually the citizen's phone number).
    pub conversation_id: String,
    /// Message text.
    #[serde(default)]
    pub text: MessageText,
    /// Reference to an attached image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Shared location, if any.
    #[serde(default)]
    pub location: Option<SharedLocation>,
    /// Voice note, if any.
    #[serde(default)]
    pub audio: Option<AudioClip>,
    /// Channel the message arrived on (e.g., "whatsapp").
    #[serde(default)]
    pub channel: Option<String>,
    /// Display name reported by the channel.
    #[serde(default)]
    pub sender_name: Option<String>,
}

impl InboundMessage {
    /// Create a plain text message.
    pub fn text(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: MessageText::Text(text.into()),
            image_url: None,
            location: None,
            audio: None,
            channel: None,
            sender_name: None,
        }
    }

    /// Attach an image reference.
    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Attach a shared location.
    pub fn with_location(mut self, location: SharedLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a voice note.
    pub fn with_audio(mut self, audio: AudioClip) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Set the channel name.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// True when the message carries neither text nor any side-channel content.
    pub fn is_empty(&self) -> bool {
        self.text.normalize().is_empty()
            && self.image_url.is_none()
            && self.location.is_none()
            && self.audio.is_none()
    }
}

/// Author of a message item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One item of a conversation's working history.
///
/// A persona turn produces a sequence of these: assistant messages, the
/// tool calls the model made, and the outputs those calls returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnItem {
    Message {
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    ToolOutput {
        call_id: String,
        name: String,
        success: bool,
        output: String,
    },
}

impl TurnItem {
    /// Create a user message item.
    pub fn user(content: impl Into<String>) -> Self {
        TurnItem::Message {
            role: Role::User,
            content: content.into(),
            image_url: None,
        }
    }

    /// Create a user message item carrying an image reference.
    pub fn user_with_image(content: impl Into<String>, image_url: Option<String>) -> Self {
        TurnItem::Message {
            role: Role::User,
            content: content.into(),
            image_url,
        }
    }

    /// Create an assistant message item.
    pub fn assistant(content: impl Into<String>) -> Self {
        TurnItem::Message {
            role: Role::Assistant,
            content: content.into(),
            image_url: None,
        }
    }

    /// Text of an assistant message, if this item is one.
    pub fn assistant_text(&self) -> Option<&str> {
        match self {
            TurnItem::Message {
                role: Role::Assistant,
                content,
                ..
            } => Some(content.as_str()),
            _ => None,
        }
    }

    /// Tool name, if this item is a tool call.
    pub fn tool_call_name(&self) -> Option<&str> {
        match self {
            TurnItem::ToolCall { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Render the item as a single line for prompts and logs.
    pub fn render(&self) -> String {
        match self {
            TurnItem::Message { role, content, .. } => format!("{}: {}", role.as_str(), content),
            TurnItem::ToolCall {
                name, arguments, ..
            } => format!("tool call {}({})", name, arguments),
            TurnItem::ToolOutput {
                name,
                success,
                output,
                ..
            } => {
                let status = if *success { "ok" } else { "error" };
                format!("tool result {} [{}]: {}", name, status, output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_text() {
        let text = MessageText::from("  hola  ");
        assert_eq!(text.normalize(), "hola");
    }

    #[test]
    fn test_normalize_parts() {
        let text = MessageText::Parts(vec!["my balance".into(), " ".into(), "please".into()]);
        assert_eq!(text.normalize(), "my balance please");
    }

    #[test]
    fn test_normalize_stringified_array() {
        let text = MessageText::from(r#"["contract", "123456"]"#);
        assert_eq!(text.normalize(), "contract 123456");
    }

    #[test]
    fn test_bracketed_text_that_is_not_json_is_kept() {
        let text = MessageText::from("[urgent] no water");
        assert_eq!(text.normalize(), "[urgent] no water");
    }

    #[test]
    fn test_deserialize_text_variants() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"conversation_id": "521", "text": ["a", "b"]}"#).unwrap();
        assert_eq!(msg.text.normalize(), "a b");

        let msg: InboundMessage =
            serde_json::from_str(r#"{"conversation_id": "521", "text": "hi"}"#).unwrap();
        assert_eq!(msg.text.normalize(), "hi");
    }

    #[test]
    fn test_empty_message() {
        assert!(InboundMessage::text("521", "   ").is_empty());
        assert!(!InboundMessage::text("521", "   ")
            .with_location(SharedLocation::new(20.59, -100.39))
            .is_empty());
    }

    #[test]
    fn test_turn_item_serialization_is_tagged() {
        let item = TurnItem::ToolCall {
            call_id: "c1".into(),
            name: "get_debt".into(),
            arguments: "{}".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(item.tool_call_name(), Some("get_debt"));
    }

    #[test]
    fn test_assistant_text() {
        assert_eq!(TurnItem::assistant("ok").assistant_text(), Some("ok"));
        assert_eq!(TurnItem::user("ok").assistant_text(), None);
    }
}
