//! The transport seam: what the responder needs from the chat network.

use std::fmt;

use async_trait::async_trait;

use crate::message::{ConversationId, GroupMetadata, InboundMessage};

/// Events delivered by the transport, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(InboundMessage),
    /// Connected; carries the account's own JID when the transport knows it.
    Connected { jid: Option<String> },
    Disconnected,
    StreamReplaced,
    LoggedOut,
    /// Pairing progress. `event` is `code`, `success`, `timeout`, ...
    Pairing { event: String, code: Option<String> },
}

#[derive(Debug)]
pub enum TransportError {
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api { status, body } => write!(f, "bridge error {status}: {body}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound side of the transport. Implementations must be safe to call
/// from several tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn group_metadata(&self, conversation: &ConversationId) -> Result<GroupMetadata, TransportError>;

    /// Send a text message. Returns the new message id.
    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<String, TransportError>;
}
