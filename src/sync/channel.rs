//! Cross-Tab Channel
//!
//! Transport for "another process wrote the durable key" notifications.
//! Each store stamps its messages with its origin id so receivers can drop
//! their own echoes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::hash::{document_digest, DocumentDigest};

/// Default buffered message count for [`LocalBroadcastChannel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A whole-document write announced to other instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTabMessage {
    /// Store that performed the write
    pub origin: Uuid,
    /// Durable key written
    pub key: String,
    /// Serialized document, exactly as persisted
    pub document: String,
    /// Send time
    pub sent_at: DateTime<Utc>,
}

impl CrossTabMessage {
    /// Message stamped now.
    pub fn new(origin: Uuid, key: impl Into<String>, document: String) -> Self {
        Self {
            origin,
            key: key.into(),
            document,
            sent_at: Utc::now(),
        }
    }

    /// Digest of the carried document.
    pub fn digest(&self) -> DocumentDigest {
        document_digest(&self.document)
    }
}

/// Broadcast transport between store instances.
pub trait CrossTabChannel: Send + Sync {
    /// Announce a write to every subscriber, including the sender's own.
    fn publish(&self, message: CrossTabMessage);

    /// Receive subsequent announcements.
    fn subscribe(&self) -> broadcast::Receiver<CrossTabMessage>;
}

/// In-process channel on a tokio broadcast. Clones share the channel, so
/// each clone handed to a store behaves like another tab.
#[derive(Clone)]
pub struct LocalBroadcastChannel {
    tx: broadcast::Sender<CrossTabMessage>,
}

impl LocalBroadcastChannel {
    /// Channel buffering up to `capacity` messages per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for LocalBroadcastChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl CrossTabChannel for LocalBroadcastChannel {
    fn publish(&self, message: CrossTabMessage) {
        // No receivers is not an error: nobody else is listening yet.
        let _ = self.tx.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<CrossTabMessage> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_channel() {
        let a = LocalBroadcastChannel::default();
        let b = a.clone();
        let mut rx = b.subscribe();

        let origin = Uuid::new_v4();
        a.publish(CrossTabMessage::new(origin, "map", "{}".into()));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.origin, origin);
        assert_eq!(received.key, "map");
        assert_eq!(received.digest(), document_digest("{}"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channel = LocalBroadcastChannel::new(4);
        channel.publish(CrossTabMessage::new(Uuid::new_v4(), "map", "{}".into()));
        assert!(channel.subscribe().try_recv().is_err());
    }

    #[test]
    fn test_message_wire_format() {
        let message = CrossTabMessage::new(Uuid::nil(), "map", "{}".into());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["origin"], "00000000-0000-0000-0000-000000000000");
        assert!(value["sentAt"].is_string());
    }
}
