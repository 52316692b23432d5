//! Inbound message types and text extraction.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Opaque, stable identifier of a conversation (a WhatsApp JID such as
/// `120363025246125888@g.us`). The string form is the map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(jid: impl Into<String>) -> Self {
        Self(jid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Group info looked up on demand from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMetadata {
    pub name: String,
}

/// Body of a message. Only the text-bearing variants matter to the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// Plain conversation text.
    Text(String),
    /// Extended text (links, quotes, mentions).
    ExtendedText(String),
    Image { caption: String },
    Video { caption: String },
    /// Stickers, audio, reactions, protocol messages...
    Other,
}

impl MessagePayload {
    /// Text carried by the payload, empty for non-text variants.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::ExtendedText(text) => text,
            Self::Image { caption } | Self::Video { caption } => caption,
            Self::Other => "",
        }
    }
}

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation: ConversationId,
    pub is_group: bool,
    /// Sent by the operator's own account (from another device).
    pub from_self: bool,
    pub timestamp: DateTime<Utc>,
    pub body: MessagePayload,
}

impl InboundMessage {
    pub fn text(&self) -> &str {
        self.body.text()
    }
}

/// Raw payload as the bridge forwards it. Several fields may be set at once;
/// the first non-empty one in precedence order wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<WireText>,
    #[serde(default)]
    pub image_message: Option<WireMedia>,
    #[serde(default)]
    pub video_message: Option<WireMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMedia {
    #[serde(default)]
    pub caption: Option<String>,
}

fn non_empty(s: Option<&String>) -> Option<String> {
    s.filter(|s| !s.is_empty()).cloned()
}

impl From<WirePayload> for MessagePayload {
    fn from(wire: WirePayload) -> Self {
        if let Some(text) = non_empty(wire.conversation.as_ref()) {
            return Self::Text(text);
        }
        if let Some(text) = non_empty(wire.extended_text_message.as_ref().and_then(|m| m.text.as_ref())) {
            return Self::ExtendedText(text);
        }
        if let Some(caption) = non_empty(wire.image_message.as_ref().and_then(|m| m.caption.as_ref())) {
            return Self::Image { caption };
        }
        if let Some(caption) = non_empty(wire.video_message.as_ref().and_then(|m| m.caption.as_ref())) {
            return Self::Video { caption };
        }

        // Nothing text-bearing, keep the kind for logging
        if wire.image_message.is_some() {
            Self::Image { caption: String::new() }
        } else if wire.video_message.is_some() {
            Self::Video { caption: String::new() }
        } else {
            Self::Other
        }
    }
}
