//! Events published after committed writes and merges.

use mdcs_merkle::Cid;
use tokio::sync::broadcast;

/// A document changed, locally or through a merge.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateEvent {
    pub doc_id: String,
    /// Composite block that carried the change.
    pub cid: Cid,
    pub collection_id: u32,
    pub schema_root: String,
    /// Encoded block, ready to be broadcast to peers.
    pub block: Vec<u8>,
    pub is_create: bool,
}

/// A merge committed.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeCompleteEvent {
    pub cid: Cid,
    pub schema_root: String,
    /// `None` for collection-level merges.
    pub doc_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Update(UpdateEvent),
    MergeComplete(MergeCompleteEvent),
}

/// Broadcast bus for [`Event`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let event = Event::MergeComplete(MergeCompleteEvent {
            cid: Cid::of(b"x"),
            schema_root: "root".into(),
            doc_id: None,
        });
        bus.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(1);
        bus.publish(Event::MergeComplete(MergeCompleteEvent {
            cid: Cid::of(b"x"),
            schema_root: "root".into(),
            doc_id: None,
        }));
    }
}
