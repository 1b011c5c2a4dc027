//! Downstream notifications emitted by [`crate::store::KeyStore`].
//!
//! Expressed as an event-sink abstraction rather than a direct call, so
//! downstream services (storage-service manifest engine, sync manager)
//! subscribe at construction without either side owning the other —
//! mirrors the `EventListener`/`SdkEvent` pair this crate's reference
//! ancestor uses to bridge its SDK into a reactive core.

use tokio::sync::broadcast;

/// A side-effect notification published by [`crate::store::KeyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbsEvent {
    /// Emitted on master-key change and on storage-service key rotation
    /// (including a linked device reacting to a received storage-service
    /// sync).
    ManifestNeedsRebuild,
    /// Emitted on master-key change only.
    SendKeysSyncMessage,
}

/// Callback-style alternative to subscribing to [`EventSink::subscribe`].
#[async_trait::async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: KbsEvent);
}

const CHANNEL_CAPACITY: usize = 64;

/// Broadcast hub for [`KbsEvent`]. Cheap to clone; all clones share the
/// same underlying channel.
#[derive(Clone)]
pub struct EventSink {
    sender: broadcast::Sender<KbsEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe for events via a `tokio::sync::broadcast` receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<KbsEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no subscribers is not an error —
    /// emission is fire-and-forget, per the concurrency model.
    pub fn publish(&self, event: KbsEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter bridging an [`EventListener`] to an [`EventSink`] subscription,
/// for callers that prefer the callback style. Spawns a background task
/// that forwards every published event until the sink (or the listener)
/// is dropped.
pub fn forward_to_listener(sink: &EventSink, listener: std::sync::Arc<dyn EventListener>) {
    let mut rx = sink.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            listener.on_event(event).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        sink.publish(KbsEvent::ManifestNeedsRebuild);
        assert_eq!(rx.recv().await.unwrap(), KbsEvent::ManifestNeedsRebuild);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let sink = EventSink::new();
        sink.publish(KbsEvent::SendKeysSyncMessage);
    }

    struct CountingListener(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl EventListener for CountingListener {
        async fn on_event(&self, _event: KbsEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn listener_adapter_forwards_events() {
        let sink = EventSink::new();
        let count = Arc::new(AtomicUsize::new(0));
        forward_to_listener(&sink, Arc::new(CountingListener(count.clone())));

        sink.publish(KbsEvent::ManifestNeedsRebuild);
        sink.publish(KbsEvent::SendKeysSyncMessage);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
