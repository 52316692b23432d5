//! HTTP client for the local WhatsApp Web bridge.
//!
//! The bridge process owns the WhatsApp session (pairing, encryption,
//! reconnects) and the device store. We long-poll it for events and call it
//! to look up groups and send text.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::message::{ConversationId, GroupMetadata, InboundMessage, WirePayload};
use crate::transport::{Transport, TransportError, TransportEvent};

/// Long-poll hold time requested from the bridge.
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_BUFFER: usize = 256;

#[derive(Deserialize)]
struct EventsResponse {
    /// Decoded one at a time so a single malformed event can't wedge the poll.
    events: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEventKind {
    Message {
        chat: String,
        is_group: bool,
        from_me: bool,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        message: Option<WirePayload>,
    },
    Connected {
        #[serde(default)]
        jid: Option<String>,
    },
    Disconnected,
    StreamReplaced,
    LoggedOut,
    Qr {
        event: String,
        #[serde(default)]
        code: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl WireEventKind {
    fn into_event(self) -> Option<TransportEvent> {
        let event = match self {
            Self::Message {
                chat,
                is_group,
                from_me,
                timestamp,
                message,
            } => TransportEvent::Message(InboundMessage {
                conversation: ConversationId::new(chat),
                is_group,
                from_self: from_me,
                timestamp,
                body: message.unwrap_or_default().into(),
            }),
            Self::Connected { jid } => TransportEvent::Connected { jid },
            Self::Disconnected => TransportEvent::Disconnected,
            Self::StreamReplaced => TransportEvent::StreamReplaced,
            Self::LoggedOut => TransportEvent::LoggedOut,
            Self::Qr { event, code } => TransportEvent::Pairing { event, code },
            Self::Unknown => return None,
        };
        Some(event)
    }
}

/// Parse a poll response into events plus the offset for the next poll.
/// Events that fail to decode are skipped, but still advance the offset.
fn parse_events(body: &str, offset: u64) -> Result<(Vec<TransportEvent>, u64), TransportError> {
    let response: EventsResponse = serde_json::from_str(body).map_err(|e| TransportError::Parse(e.to_string()))?;

    let mut next = offset;
    let mut events = Vec::with_capacity(response.events.len());
    for raw in response.events {
        let Some(id) = raw.get("id").and_then(serde_json::Value::as_u64) else {
            warn!("Dropping bridge event without id: {raw}");
            continue;
        };
        next = next.max(id.saturating_add(1));

        match serde_json::from_value::<WireEventKind>(raw) {
            Ok(kind) => match kind.into_event() {
                Some(event) => events.push(event),
                None => debug!("Skipping unknown bridge event {id}"),
            },
            Err(e) => warn!("Dropping malformed bridge event {id}: {e}"),
        }
    }
    Ok((events, next))
}

#[derive(Serialize)]
struct SendRequest<'a> {
    chat: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(TransportError::Api {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| TransportError::Parse(e.to_string()))
}

async fn expect_success(response: reqwest::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Api {
        status: status.as_u16(),
        body,
    })
}

pub struct BridgeClient {
    base_url: String,
    http: reqwest::Client,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT + Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            poller: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start receiving events. Message and lifecycle events arrive on the
    /// returned channel in delivery order.
    pub fn subscribe(&self) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(poll_loop(self.http.clone(), self.url("/v1/events"), tx));

        let mut poller = self.poller.lock().expect("poller lock poisoned");
        if let Some(old) = poller.replace(handle) {
            old.abort();
        }
        rx
    }

    pub async fn connect(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.url("/v1/connect"))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        expect_success(response).await
    }

    /// Stop polling and ask the bridge to disconnect.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.poller.lock().expect("poller lock poisoned").take() {
            handle.abort();
        }

        let response = self
            .http
            .post(self.url("/v1/disconnect"))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        expect_success(response).await
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

async fn poll_loop(http: reqwest::Client, url: String, tx: mpsc::Sender<TransportEvent>) {
    let mut offset = 0u64;
    loop {
        let result = http
            .get(&url)
            .query(&[("offset", offset), ("timeout", POLL_TIMEOUT.as_secs())])
            .send()
            .await;

        let body = match result {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.text().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                warn!("Bridge poll failed, retrying: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        let events = match parse_events(&body, offset) {
            Ok((events, next)) => {
                offset = next;
                events
            }
            Err(e) => {
                warn!("Failed to parse bridge events: {e}");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };

        for event in events {
            if tx.send(event).await.is_err() {
                info!("Event receiver closed, stopping bridge poll");
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for BridgeClient {
    async fn group_metadata(&self, conversation: &ConversationId) -> Result<GroupMetadata, TransportError> {
        let url = self.url(&format!("/v1/groups/{}", urlencoding::encode(conversation.as_str())));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        read_json(response).await
    }

    async fn send_text(&self, conversation: &ConversationId, text: &str) -> Result<String, TransportError> {
        let response = self
            .http
            .post(self.url("/v1/messages"))
            .json(&SendRequest {
                chat: conversation.as_str(),
                text,
            })
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let sent: SendResponse = read_json(response).await?;
        Ok(sent.id)
    }
}
