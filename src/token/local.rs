use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::TokenStore;

const STORAGE_FILE: &str = "storage.json";

/// Keyed persistent storage: one JSON object file shared by every key, surviving restarts.
///
/// Mirrors browser local storage. When no directory is available (or the file cannot be read)
/// the store behaves as empty and writes are dropped.
#[derive(Debug)]
pub struct LocalTokenStore {
    file: Option<PathBuf>,
    key: String,
    // serializes read-modify-write cycles from this process
    write_lock: Mutex<()>,
}

impl LocalTokenStore {
    pub fn in_dir<P: Into<PathBuf>, S: Into<String>>(dir: P, key: S) -> Self {
        Self { file: Some(dir.into().join(STORAGE_FILE)), key: key.into(), write_lock: Mutex::new(()) }
    }

    pub fn unavailable<S: Into<String>>(key: S) -> Self {
        Self { file: None, key: key.into(), write_lock: Mutex::new(()) }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn path(&self) -> Option<&Path> { self.file.as_deref() }

    fn load(file: &Path) -> Map<String, Value> {
        match std::fs::read(file) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    debug!(target: "sexyguard::token", "ignoring malformed storage file {}", file.display());
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        }
    }

    fn store(file: &Path, map: &Map<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = file.parent() { std::fs::create_dir_all(parent)?; }
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, file)
    }
}

impl TokenStore for LocalTokenStore {
    fn get(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        Self::load(file).get(&self.key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn set(&self, token: Option<&str>) {
        let Some(file) = self.file.as_deref() else {
            debug!(target: "sexyguard::token", "local storage unavailable; dropping write for key={}", self.key);
            return;
        };
        let _guard = self.write_lock.lock();
        let mut map = Self::load(file);
        match token {
            Some(t) => { map.insert(self.key.clone(), Value::String(t.to_string())); }
            None => { map.remove(&self.key); }
        }
        if let Err(e) = Self::store(file, &map) {
            debug!(target: "sexyguard::token", "local storage write failed for {}: {}", file.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_a_new_instance() {
        let tmp = tempfile::tempdir().unwrap();
        LocalTokenStore::in_dir(tmp.path(), "sg_token").set(Some("persisted"));
        let reopened = LocalTokenStore::in_dir(tmp.path(), "sg_token");
        assert_eq!(reopened.get().as_deref(), Some("persisted"));
    }

    #[test]
    fn keys_are_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let a = LocalTokenStore::in_dir(tmp.path(), "a");
        let b = LocalTokenStore::in_dir(tmp.path(), "b");
        a.set(Some("one"));
        b.set(Some("two"));
        a.clear();
        assert_eq!(a.get(), None);
        assert_eq!(b.get().as_deref(), Some("two"));
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(STORAGE_FILE), b"not json").unwrap();
        let s = LocalTokenStore::in_dir(tmp.path(), "sg_token");
        assert_eq!(s.get(), None);
        s.set(Some("fresh"));
        assert_eq!(s.get().as_deref(), Some("fresh"));
    }

    #[test]
    fn creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let s = LocalTokenStore::in_dir(&nested, "sg_token");
        s.set(Some("deep"));
        assert!(nested.join(STORAGE_FILE).exists());
    }
}
