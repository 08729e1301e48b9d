use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use tracing::debug;

use super::TokenStore;

/// Token kept as a cookie in a shared jar scoped to the API origin.
///
/// Clearing writes the same cookie with `Max-Age=0`. Without a jar every operation is a no-op.
#[derive(Debug)]
pub struct CookieTokenStore {
    jar: Option<Arc<Jar>>,
    scope: Url,
    name: String,
    path: String,
    max_age: Option<Duration>,
}

impl CookieTokenStore {
    pub fn new<S: Into<String>>(jar: Option<Arc<Jar>>, scope: Url, name: S) -> Self {
        Self { jar, scope, name: name.into(), path: "/".to_string(), max_age: None }
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        let p: String = path.into();
        self.path = if p.starts_with('/') { p } else { format!("/{}", p) };
        self
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self { self.max_age = max_age; self }

    pub fn jar(&self) -> Option<&Arc<Jar>> { self.jar.as_ref() }

    fn cookie_url(&self) -> Url {
        let mut url = self.scope.clone();
        url.set_path(&self.path);
        url
    }

    fn write(&self, jar: &Jar, value: &str, max_age: Option<u64>) {
        let mut cookie = format!("{}={}; Path={}", self.name, urlencoding::encode(value), self.path);
        if let Some(secs) = max_age { cookie.push_str(&format!("; Max-Age={}", secs)); }
        jar.add_cookie_str(&cookie, &self.cookie_url());
    }
}

impl TokenStore for CookieTokenStore {
    fn get(&self) -> Option<String> {
        let jar = self.jar.as_ref()?;
        let header = jar.cookies(&self.cookie_url())?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == self.name)
            .map(|(_, v)| urlencoding::decode(v).map(|s| s.into_owned()).unwrap_or_else(|_| v.to_string()))
            .filter(|v| !v.is_empty())
    }

    fn set(&self, token: Option<&str>) {
        let Some(jar) = self.jar.as_deref() else {
            debug!(target: "sexyguard::token", "cookie jar unavailable; dropping write for cookie={}", self.name);
            return;
        };
        match token {
            Some(t) => self.write(jar, t, self.max_age.map(|d| d.as_secs())),
            None => self.write(jar, "", Some(0)),
        }
    }
}
