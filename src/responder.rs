//! Dispatch: classify each inbound message and act on the decision.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, needs_group_name, Decision};
use crate::message::{ConversationId, InboundMessage};
use crate::openai::Completion;
use crate::pending::{PendingReplies, STANDBY_DELAY};
use crate::reply;
use crate::store::DeviceStore;
use crate::transport::{Transport, TransportEvent};

pub struct Responder {
    transport: Arc<dyn Transport>,
    completion: Arc<dyn Completion>,
    pending: PendingReplies,
    store: Option<DeviceStore>,
    /// Operator's own JID, set on connect.
    own_jid: RwLock<Option<String>>,
}

impl Responder {
    pub fn new(transport: Arc<dyn Transport>, completion: Arc<dyn Completion>) -> Self {
        Self {
            pending: PendingReplies::new(transport.clone()),
            transport,
            completion,
            store: None,
            own_jid: RwLock::new(None),
        }
    }

    /// Fall back to the device store for the operator's JID when the
    /// connected event doesn't carry it.
    pub fn with_store(mut self, store: DeviceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn own_jid(&self) -> Option<String> {
        self.own_jid.read().expect("own_jid lock poisoned").clone()
    }

    pub fn pending(&self) -> &PendingReplies {
        &self.pending
    }

    /// Handle events until the transport closes the channel.
    pub async fn run(&self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Event stream closed");
    }

    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => self.handle_message(msg).await,
            TransportEvent::Connected { jid } => self.handle_connected(jid),
            TransportEvent::StreamReplaced => info!("🔄 Stream replaced, reconnecting..."),
            TransportEvent::Disconnected => warn!("❌ Disconnected from WhatsApp"),
            TransportEvent::LoggedOut => warn!("🚪 Logged out from WhatsApp"),
            TransportEvent::Pairing { event, .. } => debug!("Pairing event after startup: {event}"),
        }
    }

    fn handle_connected(&self, jid: Option<String>) {
        info!("✅ Connected to WhatsApp!");
        let jid = jid.or_else(|| {
            let store = self.store.as_ref()?;
            match store.device_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Failed to read own JID from store: {e}");
                    None
                }
            }
        });
        if let Some(ref jid) = jid {
            info!("📱 Our JID: {jid}");
        }
        *self.own_jid.write().expect("own_jid lock poisoned") = jid;
    }

    pub async fn handle_message(&self, msg: InboundMessage) {
        let group_name = if needs_group_name(&msg) {
            match self.transport.group_metadata(&msg.conversation).await {
                Ok(meta) => Some(meta.name),
                Err(e) => {
                    error!("Failed to get group info for {}: {e}", msg.conversation);
                    None
                }
            }
        } else {
            None
        };

        let decision = classify(&msg, group_name.as_deref());
        let text_preview: String = msg.text().chars().take(100).collect();
        info!(
            "Message in {} ({}) self={}: \"{text_preview}\" → {:?}",
            msg.conversation,
            group_name.as_deref().unwrap_or("-"),
            msg.from_self,
            decision
        );

        match decision {
            Decision::Ignore => {}
            Decision::AutoReply(text) => self.spawn_auto_reply(msg.conversation, text),
            Decision::ArmStandby => self.pending.arm(&msg.conversation, STANDBY_DELAY),
            Decision::DisarmStandby => self.pending.disarm(&msg.conversation),
        }
    }

    /// Generate and send off the event path so slow completions don't
    /// hold up later events.
    fn spawn_auto_reply(&self, conversation: ConversationId, text: String) {
        let transport = self.transport.clone();
        let completion = self.completion.clone();

        info!("🤖 Triggering auto-reply in {conversation}");
        tokio::spawn(async move {
            let reply = match reply::generate(completion.as_ref(), &text).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Completion failed, dropping reply: {e}");
                    return;
                }
            };

            match transport.send_text(&conversation, &reply).await {
                Ok(_) => info!("🤖 Auto-replied in {conversation}: {reply}"),
                Err(e) => warn!("Failed to send auto-reply to {conversation}: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessagePayload;
    use crate::pending::STANDBY_TEXT;
    use crate::testing::{RecordingTransport, ScriptedCompletion};
    use std::time::Duration;
    use tokio::time::sleep;

    const FAMILY: &str = "120363025246125888@g.us";
    const OUR_FAMILY: &str = "120363099999999999@g.us";
    const WORK: &str = "120363011111111111@g.us";

    struct Harness {
        transport: Arc<RecordingTransport>,
        completion: Arc<ScriptedCompletion>,
        responder: Responder,
    }

    fn harness_with(completion: ScriptedCompletion) -> Harness {
        let transport = Arc::new(
            RecordingTransport::new()
                .with_group(FAMILY, "Family ❤")
                .with_group(OUR_FAMILY, "Our Family")
                .with_group(WORK, "Work Chat"),
        );
        let completion = Arc::new(completion);
        let responder = Responder::new(transport.clone(), completion.clone());
        Harness {
            transport,
            completion,
            responder,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedCompletion::replying("Ja, sushi låter toppen!"))
    }

    fn message(chat: &str, is_group: bool, from_self: bool, text: &str) -> InboundMessage {
        InboundMessage {
            conversation: ConversationId::new(chat),
            is_group,
            from_self,
            timestamp: chrono::Utc::now(),
            body: MessagePayload::Text(text.to_string()),
        }
    }

    fn sent(chat: &str, text: &str) -> (ConversationId, String) {
        (ConversationId::new(chat), text.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_food_question_auto_replies() {
        let h = harness();
        h.responder
            .handle_message(message(FAMILY, true, false, "Should we do sushi tonight?"))
            .await;
        assert_eq!(h.responder.pending().size(), 0);

        sleep(Duration::from_millis(10)).await;
        let calls = h.completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_text, "Should we do sushi tonight?");
        assert_eq!(h.transport.sent(), vec![sent(FAMILY, "Ja, sushi låter toppen!")]);

        // No standby follows
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_sends_standby() {
        let h = harness();
        h.responder
            .handle_message(message(OUR_FAMILY, true, false, "Hey everyone"))
            .await;
        assert!(h.responder.pending().is_armed(&ConversationId::new(OUR_FAMILY)));

        sleep(Duration::from_millis(9_900)).await;
        assert!(h.transport.sent().is_empty());
        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.transport.sent(), vec![sent(OUR_FAMILY, STANDBY_TEXT)]);
        assert!(h.completion.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_reply_cancels_standby() {
        let h = harness();
        h.responder
            .handle_message(message(OUR_FAMILY, true, false, "Hey everyone"))
            .await;
        sleep(Duration::from_secs(3)).await;
        h.responder
            .handle_message(message(OUR_FAMILY, true, true, "Hi all!"))
            .await;
        assert_eq!(h.responder.pending().size(), 0);

        sleep(Duration::from_secs(30)).await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_private_message_ignored() {
        let h = harness();
        h.responder.handle_message(message("46701234567@s.whatsapp.net", false, false, "pizza?")).await;

        sleep(Duration::from_secs(30)).await;
        assert!(h.completion.calls().is_empty());
        assert!(h.transport.sent().is_empty());
        assert!(h.transport.lookups().is_empty());
        assert_eq!(h.responder.pending().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_family_group_ignored() {
        let h = harness();
        h.responder.handle_message(message(WORK, true, false, "pizza for lunch?")).await;

        sleep(Duration::from_secs(30)).await;
        assert!(h.completion.calls().is_empty());
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.responder.pending().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_sends_once_after_last_message() {
        let h = harness();
        h.responder.handle_message(message(FAMILY, true, false, "Hello")).await;
        sleep(Duration::from_secs(4)).await;
        h.responder.handle_message(message(FAMILY, true, false, "Anyone there?")).await;

        // t = 10.5s
        sleep(Duration::from_millis(6_500)).await;
        assert!(h.transport.sent().is_empty());

        // t = 14.5s
        sleep(Duration::from_secs(4)).await;
        assert_eq!(h.transport.sent(), vec![sent(FAMILY, STANDBY_TEXT)]);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_food_question_does_not_touch_armed_timer() {
        let h = harness();
        h.responder.handle_message(message(FAMILY, true, false, "Hello")).await;
        sleep(Duration::from_secs(2)).await;
        h.responder.handle_message(message(FAMILY, true, false, "pizza?")).await;

        // Standby still due at t = 10s, plus the auto-reply
        sleep(Duration::from_millis(8_100)).await;
        assert_eq!(
            h.transport.sent(),
            vec![sent(FAMILY, "Ja, sushi låter toppen!"), sent(FAMILY, STANDBY_TEXT)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_food_message_disarms() {
        let h = harness();
        h.responder.handle_message(message(FAMILY, true, false, "Hello")).await;
        h.responder.handle_message(message(FAMILY, true, true, "I'll order pizza")).await;

        sleep(Duration::from_secs(30)).await;
        assert!(h.completion.calls().is_empty());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_failure_drops_reply() {
        let h = harness_with(ScriptedCompletion::failing());
        h.responder.handle_message(message(FAMILY, true, false, "dinner?")).await;

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.completion.calls().len(), 1);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.responder.pending().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_lookup_failure_ignored() {
        let h = harness();
        h.responder
            .handle_message(message("120363000000000000@g.us", true, false, "Hello"))
            .await;

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.lookups().len(), 1);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.responder.pending().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_without_caption_skips_lookup() {
        let h = harness();
        let mut msg = message(FAMILY, true, false, "");
        msg.body = MessagePayload::Image { caption: String::new() };
        h.responder.handle_message(msg).await;

        assert!(h.transport.lookups().is_empty());
        assert_eq!(h.responder.pending().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_processes_events_in_order() {
        let h = harness();
        let (tx, rx) = mpsc::channel(8);
        tx.send(TransportEvent::Connected {
            jid: Some("46701234567.0:12@s.whatsapp.net".into()),
        })
        .await
        .unwrap();
        tx.send(TransportEvent::Message(message(FAMILY, true, false, "Hello")))
            .await
            .unwrap();
        tx.send(TransportEvent::Message(message(FAMILY, true, true, "hi")))
            .await
            .unwrap();
        tx.send(TransportEvent::StreamReplaced).await.unwrap();
        tx.send(TransportEvent::Disconnected).await.unwrap();
        tx.send(TransportEvent::LoggedOut).await.unwrap();
        drop(tx);

        h.responder.run(rx).await;
        assert_eq!(h.responder.own_jid().as_deref(), Some("46701234567.0:12@s.whatsapp.net"));
        assert_eq!(h.responder.pending().size(), 0);

        sleep(Duration::from_secs(30)).await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_connected_falls_back_to_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("whatsapp.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE whatsmeow_device (jid TEXT PRIMARY KEY);
             INSERT INTO whatsmeow_device (jid) VALUES ('46700000000.0:3@s.whatsapp.net');",
        )
        .unwrap();

        let h = harness();
        let responder = h.responder.with_store(DeviceStore::open(&path).unwrap());
        responder.handle_event(TransportEvent::Connected { jid: None }).await;
        assert_eq!(responder.own_jid().as_deref(), Some("46700000000.0:3@s.whatsapp.net"));
    }
}
