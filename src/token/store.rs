use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::Url;

use super::{CookieTokenStore, LocalTokenStore, MemoryTokenStore};

/// Storage for a single opaque token.
///
/// Implementations never fail: when their medium is unavailable `get` yields `None`
/// and writes are dropped.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;

    /// Store `token`; `None` is the same as `clear`.
    fn set(&self, token: Option<&str>);

    fn clear(&self) { self.set(None) }
}

/// Which backend `build_token_store` should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenStorage {
    #[default]
    Local,
    Cookie,
    Memory,
}

impl std::str::FromStr for TokenStorage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "localstorage" | "file" => Ok(TokenStorage::Local),
            "cookie" | "cookies" => Ok(TokenStorage::Cookie),
            "memory" | "mem" => Ok(TokenStorage::Memory),
            other => Err(format!("unknown token storage '{}'", other)),
        }
    }
}

impl std::fmt::Display for TokenStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenStorage::Local => "local",
            TokenStorage::Cookie => "cookie",
            TokenStorage::Memory => "memory",
        })
    }
}

/// Construct the backend selected by `kind`.
///
/// `storage_dir` is only used by `Local`; `jar`/`scope` only by `Cookie`. A missing medium
/// yields a backend that degrades to empty values.
pub fn build_token_store(
    kind: TokenStorage,
    key: &str,
    storage_dir: Option<PathBuf>,
    jar: Option<Arc<Jar>>,
    scope: &Url,
    cookie_path: &str,
    cookie_max_age: Option<Duration>,
) -> Arc<dyn TokenStore> {
    tracing::debug!(target: "sexyguard::token", "token storage backend={} key={}", kind, key);
    match kind {
        TokenStorage::Memory => Arc::new(MemoryTokenStore::new()),
        TokenStorage::Local => match storage_dir {
            Some(dir) => Arc::new(LocalTokenStore::in_dir(dir, key)),
            None => Arc::new(LocalTokenStore::unavailable(key)),
        },
        TokenStorage::Cookie => {
            let store = CookieTokenStore::new(jar, scope.clone(), key)
                .with_path(cookie_path)
                .with_max_age(cookie_max_age);
            Arc::new(store)
        }
    }
}
