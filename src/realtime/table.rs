use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

use super::{Filter, RealtimeClient};
use crate::error::{normalize_error, ApiError, ClientError};

/// Rows of a table as last loaded, plus load status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableState {
    pub rows: Vec<Value>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

/// CRUD binding over one table. Every operation mirrors its outcome into an observable
/// `TableState`; writes reload the rows with the current filters when they succeed.
pub struct TableHandle {
    client: Arc<dyn RealtimeClient>,
    table: String,
    filters: Mutex<Vec<Filter>>,
    state: watch::Sender<TableState>,
}

impl TableHandle {
    pub fn new<S: Into<String>>(client: Arc<dyn RealtimeClient>, table: S) -> Self {
        let (state, _) = watch::channel(TableState::default());
        Self { client, table: table.into(), filters: Mutex::new(Vec::new()), state }
    }

    pub fn name(&self) -> &str { &self.table }

    pub fn state(&self) -> TableState { self.state.borrow().clone() }

    pub fn watch(&self) -> watch::Receiver<TableState> { self.state.subscribe() }

    pub fn filters(&self) -> Vec<Filter> { self.filters.lock().clone() }

    /// Replace the filters used by `refresh` and reload.
    pub async fn set_filters(&self, filters: Vec<Filter>) -> Result<Vec<Value>, ApiError> {
        *self.filters.lock() = filters;
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<Vec<Value>, ApiError> {
        let filters = self.filters();
        self.state.send_modify(|s| s.loading = true);
        let result = self.client.select(&self.table, &filters).await;
        self.state.send_modify(|s| {
            s.loading = false;
            match &result {
                Ok(rows) => { s.rows = rows.clone(); s.error = None; }
                Err(e) => s.error = Some(normalize_error(e)),
            }
        });
        result.map_err(|e| normalize_error(&e))
    }

    pub async fn insert(&self, rows: Value) -> Result<Vec<Value>, ApiError> {
        let res = self.client.insert(&self.table, rows).await;
        self.after_write(res).await
    }

    pub async fn update(&self, patch: Value, filters: &[Filter]) -> Result<Vec<Value>, ApiError> {
        let res = self.client.update(&self.table, patch, filters).await;
        self.after_write(res).await
    }

    pub async fn remove(&self, filters: &[Filter]) -> Result<Vec<Value>, ApiError> {
        let res = self.client.delete(&self.table, filters).await;
        self.after_write(res).await
    }

    async fn after_write(&self, res: Result<Vec<Value>, ClientError>) -> Result<Vec<Value>, ApiError> {
        match res {
            Ok(affected) => {
                // a failed reload is already recorded in the state; the write itself succeeded
                let _ = self.refresh().await;
                Ok(affected)
            }
            Err(e) => {
                let err = normalize_error(&e);
                self.state.send_modify(|s| s.error = Some(err.clone()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{FilterOp, MemoryRealtimeClient};
    use serde_json::json;

    fn table() -> TableHandle {
        let db = MemoryRealtimeClient::new().with_table("keys", vec![
            json!({"id": 1, "plan": "basic"}),
            json!({"id": 2, "plan": "pro"}),
        ]);
        TableHandle::new(Arc::new(db), "keys")
    }

    #[tokio::test]
    async fn refresh_mirrors_rows() {
        let t = table();
        let mut rx = t.watch();
        let rows = t.refresh().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rx.has_changed().unwrap());
        let s = rx.borrow_and_update().clone();
        assert_eq!(s.rows.len(), 2);
        assert!(!s.loading);
        assert!(s.error.is_none());
    }

    #[tokio::test]
    async fn writes_reload_with_current_filters() {
        let t = table();
        t.set_filters(vec![Filter::eq("plan", json!("pro"))]).await.unwrap();
        assert_eq!(t.state().rows.len(), 1);

        t.insert(json!({"id": 3, "plan": "pro"})).await.unwrap();
        assert_eq!(t.state().rows.len(), 2);

        t.update(json!({"plan": "basic"}), &[Filter::eq("id", json!(2))]).await.unwrap();
        assert_eq!(t.state().rows, vec![json!({"id": 3, "plan": "pro"})]);

        let removed = t.remove(&[Filter::new("id", FilterOp::Gt, json!(0))]).await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(t.state().rows.is_empty());
    }

    #[tokio::test]
    async fn failed_write_is_normalized_into_state() {
        let t = table();
        t.refresh().await.unwrap();
        let err = t.insert(json!("not a row")).await.unwrap_err();
        assert_eq!(err.message, "rows must be an object or an array of objects");
        let s = t.state();
        assert_eq!(s.error, Some(err));
        assert_eq!(s.rows.len(), 2);
    }
}
