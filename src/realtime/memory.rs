use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ChangeEvent, ChangeKind, Filter, RealtimeClient, RealtimeConnector, RowMatcher, SubscriptionId};
use crate::error::{ClientError, ClientResult};

/// In-process realtime database: tables of JSON rows with the same filter semantics as the
/// service and change events fanned out to subscribers.
#[derive(Default)]
pub struct MemoryRealtimeClient {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    subscribers: Mutex<HashMap<SubscriptionId, (String, mpsc::UnboundedSender<ChangeEvent>)>>,
}

impl MemoryRealtimeClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_table<S: Into<String>>(self, table: S, rows: Vec<Value>) -> Self {
        self.tables.lock().insert(table.into(), rows);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Value> { self.tables.lock().get(table).cloned().unwrap_or_default() }

    pub fn subscriber_count(&self) -> usize { self.subscribers.lock().len() }

    fn publish(&self, table: &str, events: Vec<ChangeEvent>) {
        if events.is_empty() { return; }
        let mut subs = self.subscribers.lock();
        subs.retain(|_, (t, sink)| {
            if t != table { return true; }
            events.iter().all(|e| sink.send(e.clone()).is_ok())
        });
    }
}

fn as_rows(rows: Value) -> ClientResult<Vec<Value>> {
    match rows {
        Value::Array(a) if a.iter().all(Value::is_object) => Ok(a),
        o @ Value::Object(_) => Ok(vec![o]),
        _ => Err(ClientError::realtime("rows must be an object or an array of objects")),
    }
}

#[async_trait]
impl RealtimeClient for MemoryRealtimeClient {
    async fn connect(&self) -> ClientResult<()> { Ok(()) }

    async fn select(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        let matcher = RowMatcher::new(filters);
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| matcher.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Value) -> ClientResult<Vec<Value>> {
        let rows = as_rows(rows)?;
        self.tables.lock().entry(table.to_string()).or_default().extend(rows.iter().cloned());
        let events = rows
            .iter()
            .map(|r| ChangeEvent { table: table.to_string(), kind: ChangeKind::Insert, record: r.clone(), old_record: Value::Null })
            .collect();
        self.publish(table, events);
        Ok(rows)
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        let Value::Object(patch) = patch else {
            return Err(ClientError::realtime("update patch must be an object"));
        };
        let matcher = RowMatcher::new(filters);
        let mut events = Vec::new();
        {
            let mut tables = self.tables.lock();
            for row in tables.get_mut(table).into_iter().flatten() {
                if !matcher.matches(row) { continue; }
                let old = row.clone();
                if let Value::Object(fields) = row {
                    for (k, v) in &patch { fields.insert(k.clone(), v.clone()); }
                }
                events.push(ChangeEvent { table: table.to_string(), kind: ChangeKind::Update, record: row.clone(), old_record: old });
            }
        }
        let updated = events.iter().map(|e| e.record.clone()).collect();
        self.publish(table, events);
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        let matcher = RowMatcher::new(filters);
        let mut removed = Vec::new();
        if let Some(rows) = self.tables.lock().get_mut(table) {
            rows.retain(|r| {
                let hit = matcher.matches(r);
                if hit { removed.push(r.clone()); }
                !hit
            });
        }
        let events = removed
            .iter()
            .map(|r| ChangeEvent { table: table.to_string(), kind: ChangeKind::Delete, record: Value::Null, old_record: r.clone() })
            .collect();
        self.publish(table, events);
        Ok(removed)
    }

    async fn subscribe(&self, table: &str, sink: mpsc::UnboundedSender<ChangeEvent>) -> ClientResult<SubscriptionId> {
        let id = SubscriptionId::generate();
        self.subscribers.lock().insert(id.clone(), (table.to_string(), sink));
        Ok(id)
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> ClientResult<()> {
        self.subscribers.lock().remove(id);
        Ok(())
    }
}

/// Connector handing out one shared `MemoryRealtimeClient` regardless of credentials.
#[derive(Default, Clone)]
pub struct MemoryConnector {
    client: Arc<MemoryRealtimeClient>,
}

impl MemoryConnector {
    pub fn new(client: Arc<MemoryRealtimeClient>) -> Self { Self { client } }
}

#[async_trait]
impl RealtimeConnector for MemoryConnector {
    async fn connect(&self, _url: &str, _key: &str, _options: &Value) -> ClientResult<Arc<dyn RealtimeClient>> {
        Ok(self.client.clone())
    }
}
