//! Pending standby replies, one timer per conversation.
//!
//! `arm` starts (or restarts) a conversation's timer. When it fires, the
//! entry is removed and the standby text is sent. `disarm` removes the
//! entry before it fires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::message::ConversationId;
use crate::transport::Transport;

/// How long the operator may stay silent before the standby goes out.
pub const STANDBY_DELAY: Duration = Duration::from_secs(10);

/// "I will answer soon".
pub const STANDBY_TEXT: &str = "Jag svarar snart.";

struct PendingEntry {
    /// Distinguishes this arm from later re-arms of the same conversation.
    generation: u64,
    armed_at: Instant,
    timer: AbortHandle,
}

struct Inner {
    entries: Mutex<HashMap<ConversationId, PendingEntry>>,
    transport: Arc<dyn Transport>,
    next_generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in entries.drain() {
            entry.timer.abort();
        }
    }
}

/// Registry of armed standby timers.
///
/// Timer tasks hold only a weak reference and the conversation key, so
/// dropping the registry cancels everything still pending.
pub struct PendingReplies {
    inner: Arc<Inner>,
}

impl PendingReplies {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                transport,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start the standby timer for `conversation`, replacing any running one.
    pub fn arm(&self, conversation: &ConversationId, delay: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.inner.entries.lock().expect("pending replies lock poisoned");

        if let Some(old) = entries.remove(conversation) {
            old.timer.abort();
            debug!("⏰ Re-arming standby for {} (was armed {:?} ago)", conversation, old.armed_at.elapsed());
        }

        let timer = tokio::spawn(expire(
            Arc::downgrade(&self.inner),
            conversation.clone(),
            generation,
            delay,
        ))
        .abort_handle();

        entries.insert(
            conversation.clone(),
            PendingEntry {
                generation,
                armed_at: Instant::now(),
                timer,
            },
        );
        info!("⏰ Standby armed for {} ({}s)", conversation, delay.as_secs());
    }

    /// Cancel the standby timer for `conversation`. No-op if none is armed.
    pub fn disarm(&self, conversation: &ConversationId) {
        let mut entries = self.inner.entries.lock().expect("pending replies lock poisoned");
        if let Some(entry) = entries.remove(conversation) {
            entry.timer.abort();
            info!("✅ Standby cancelled for {}", conversation);
        }
    }

    /// Number of armed timers.
    pub fn size(&self) -> usize {
        self.inner.entries.lock().expect("pending replies lock poisoned").len()
    }

    pub fn is_armed(&self, conversation: &ConversationId) -> bool {
        self.inner
            .entries
            .lock()
            .expect("pending replies lock poisoned")
            .contains_key(conversation)
    }
}

async fn expire(registry: Weak<Inner>, conversation: ConversationId, generation: u64, delay: Duration) {
    sleep(delay).await;

    let Some(inner) = registry.upgrade() else {
        return;
    };

    // Remove our own entry, but only if a later arm hasn't replaced it.
    let armed_at = {
        let mut entries = inner.entries.lock().expect("pending replies lock poisoned");
        let current = entries
            .get(&conversation)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            entries.remove(&conversation).map(|entry| entry.armed_at)
        } else {
            None
        }
    };
    let Some(armed_at) = armed_at else {
        return;
    };

    info!("⏰ Standby expired for {} after {:?}", conversation, armed_at.elapsed());
    match inner.transport.send_text(&conversation, STANDBY_TEXT).await {
        Ok(_) => info!("💬 Sent standby message to {}", conversation),
        Err(e) => warn!("Failed to send standby message to {}: {e}", conversation),
    }
}
