use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::{ChangeEvent, RealtimeClient, SubscriptionId};
use crate::error::ClientResult;

/// Live change feed for one table. `close` unsubscribes; dropping an open subscription
/// unsubscribes in the background when a runtime is available.
pub struct Subscription {
    client: Arc<dyn RealtimeClient>,
    table: String,
    id: Option<SubscriptionId>,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub async fn open<S: Into<String>>(client: Arc<dyn RealtimeClient>, table: S) -> ClientResult<Self> {
        let table = table.into();
        let (tx, events) = mpsc::unbounded_channel();
        let id = client.subscribe(&table, tx).await?;
        Ok(Self { client, table, id: Some(id), events })
    }

    pub fn table(&self) -> &str { &self.table }

    pub fn id(&self) -> Option<&SubscriptionId> { self.id.as_ref() }

    /// Next change; `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> { self.events.recv().await }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> { self.events.try_recv().ok() }

    pub async fn close(mut self) -> ClientResult<()> {
        match self.id.take() {
            Some(id) => self.client.unsubscribe(&id).await,
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else { return; };
        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => { rt.spawn(async move { let _ = client.unsubscribe(&id).await; }); }
            Err(_) => debug!(target: "sexyguard::realtime", "no runtime to unsubscribe {} on drop", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeKind, MemoryRealtimeClient};
    use serde_json::json;

    #[tokio::test]
    async fn receives_events_until_closed() {
        let db = Arc::new(MemoryRealtimeClient::new());
        let mut sub = Subscription::open(db.clone(), "keys").await.unwrap();
        assert_eq!(sub.table(), "keys");
        db.insert("keys", json!({"id": 1})).await.unwrap();
        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.kind, ChangeKind::Insert);
        assert_eq!(ev.record, json!({"id": 1}));
        sub.close().await.unwrap();
        assert_eq!(db.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let db = Arc::new(MemoryRealtimeClient::new());
        let sub = Subscription::open(db.clone(), "keys").await.unwrap();
        assert_eq!(db.subscriber_count(), 1);
        drop(sub);
        for _ in 0..10 {
            if db.subscriber_count() == 0 { break; }
            tokio::task::yield_now().await;
        }
        assert_eq!(db.subscriber_count(), 0);
    }
}
