//! Test doubles for the transport and completion seams.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::message::{ConversationId, GroupMetadata};
use crate::openai::{ChatRequest, Completion, Error};
use crate::transport::{Transport, TransportError};

/// Records sends; answers group lookups from a fixed table.
pub struct RecordingTransport {
    groups: HashMap<ConversationId, String>,
    fail_sends: bool,
    sent: Mutex<Vec<(ConversationId, String)>>,
    lookups: Mutex<Vec<ConversationId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
            fail_sends: false,
            sent: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    pub fn with_group(mut self, jid: &str, name: &str) -> Self {
        self.groups.insert(ConversationId::new(jid), name.to_string());
        self
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> Vec<ConversationId> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn group_metadata(&self, conversation: &ConversationId) -> Result<GroupMetadata, TransportError> {
        self.lookups.lock().unwrap().push(conversation.clone());
        self.groups
            .get(conversation)
            .map(|name| GroupMetadata { name: name.clone() })
            .ok_or_else(|| TransportError::Api {
                status: 404,
                body: "group not found".into(),
            })
    }

    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<String, TransportError> {
        if self.fail_sends {
            return Err(TransportError::Http("connection reset".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((conversation.clone(), text.to_string()));
        Ok(format!("3EB0{:04}", sent.len()))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
    pub max_tokens: u32,
}

/// Completion that returns a fixed reply (or fails) and records requests.
pub struct ScriptedCompletion {
    reply: Option<String>,
    calls: Mutex<Vec<RecordedChat>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedChat> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, Error> {
        self.calls.lock().unwrap().push(RecordedChat {
            model: request.model.to_string(),
            system_prompt: request.system_prompt.to_string(),
            user_text: request.user_text.to_string(),
            max_tokens: request.max_tokens,
        });
        self.reply.clone().ok_or(Error::Empty)
    }
}
