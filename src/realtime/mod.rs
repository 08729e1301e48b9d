//!
//! Realtime database integration
//! -----------------------------
//! The external service is reached through the narrow `RealtimeClient` capability: connect,
//! filtered queries and writes, and change subscriptions. `RealtimeBootstrap` builds a client
//! lazily from credentials that may arrive late or never; `TableHandle` and `Subscription` are the
//! bindings consumers hold on to.

mod filter;
mod rest;
mod socket;
mod memory;
mod bootstrap;
mod table;
mod subscription;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ClientResult;

pub use filter::{Filter, FilterOp, Predicate, RowMatcher, matches_all};
pub use rest::{RestRealtimeClient, RestConnector};
pub use memory::{MemoryRealtimeClient, MemoryConnector};
pub use bootstrap::{RealtimeBootstrap, RealtimeSource, ClientHandle};
pub use table::{TableHandle, TableState};
pub use subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A row change pushed by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub old_record: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn generate() -> Self { SubscriptionId(uuid::Uuid::new_v4().to_string()) }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// Opaque handle to the realtime database service.
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    /// Verify the service is reachable with the configured credentials.
    async fn connect(&self) -> ClientResult<()>;

    async fn select(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>>;

    /// `rows` is a single object or an array of objects. Returns the stored rows.
    async fn insert(&self, table: &str, rows: Value) -> ClientResult<Vec<Value>>;

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> ClientResult<Vec<Value>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>>;

    /// Start delivering change events for `table` into `sink`.
    async fn subscribe(&self, table: &str, sink: mpsc::UnboundedSender<ChangeEvent>) -> ClientResult<SubscriptionId>;

    /// Stop a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: &SubscriptionId) -> ClientResult<()>;
}

/// Builds a `RealtimeClient` from service credentials.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, url: &str, key: &str, options: &Value) -> ClientResult<Arc<dyn RealtimeClient>>;
}
