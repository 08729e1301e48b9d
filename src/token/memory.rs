use parking_lot::Mutex;

use super::TokenStore;

/// Process-lifetime token slot.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_token<S: Into<String>>(token: S) -> Self { Self { slot: Mutex::new(Some(token.into())) } }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> { self.slot.lock().clone() }

    fn set(&self, token: Option<&str>) { *self.slot.lock() = token.map(str::to_string); }
}
