use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool { self.expires_at.map(|t| now < t).unwrap_or(true) }
}

/// Time-boxed memoization map.
///
/// Entries expire `ttl` after they are written (a zero ttl never expires). Expired entries are
/// dropped when looked up; there is no background sweep and no size bound, so the key space
/// should stay small.
#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new() -> Self { Self::default() }

    /// Live value for `key`, if present and of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let live = entries.get(key).map(|e| e.is_live(now))?;
        if !live {
            entries.remove(key);
            return None;
        }
        entries.get(key).and_then(|e| e.value.downcast_ref::<T>()).cloned()
    }

    pub fn put<T: Send + Sync + 'static>(&self, key: &str, value: T, ttl: Duration) {
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        let entry = CacheEntry { value: Arc::new(value), expires_at };
        self.entries.lock().insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) -> bool { self.entries.lock().remove(key).is_some() }

    pub fn clear(&self) { self.entries.lock().clear(); }

    /// Number of stored entries, expired ones included until they are next looked up.
    pub fn len(&self) -> usize { self.entries.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("entries", &self.len()).finish()
    }
}
