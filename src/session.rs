//! One session per application root: a token store, the REST client that reads it, and the
//! realtime client bootstrap. Construct one explicitly and pass it (or clones of its parts) to
//! whatever needs it; independent sessions coexist.

use std::sync::Arc;

use reqwest::cookie::Jar;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::{ApiClient, ApiOutcome, Credentials};
use crate::config::{parse_base_url, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::realtime::{
    RealtimeBootstrap, RealtimeClient, RealtimeConnector, RealtimeSource, RestConnector, Subscription, TableHandle,
};
use crate::token::{build_token_store, FnTokenStore, TokenStorage, TokenStore};

/// Forwards to the real backend and mirrors every write into a watch channel.
struct MirroredTokenStore {
    backend: Arc<dyn TokenStore>,
    mirror: watch::Sender<Option<String>>,
}

impl TokenStore for MirroredTokenStore {
    fn get(&self) -> Option<String> { self.backend.get() }

    fn set(&self, token: Option<&str>) {
        self.backend.set(token);
        // publish what the backend holds; an unavailable medium drops the write
        let stored = self.backend.get();
        if token.is_some() && stored.is_none() {
            debug!(target: "sexyguard::session", "token store dropped the write");
        }
        self.mirror.send_if_modified(|current| {
            if *current == stored { return false; }
            *current = stored;
            true
        });
        debug!(target: "sexyguard::session", "token {}", if token.is_some() { "stored" } else { "cleared" });
    }
}

pub struct SessionBuilder {
    config: ClientConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    connector: Option<Arc<dyn RealtimeConnector>>,
    prebuilt: Option<Arc<dyn RealtimeClient>>,
}

impl SessionBuilder {
    /// Use this store instead of the backend named by the configuration.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self { self.token_store = Some(store); self }

    /// Use a caller-supplied accessor/mutator pair as the token store.
    pub fn token_accessor<G, S>(self, get: G, set: S) -> Self
    where
        G: Fn() -> Option<String> + Send + Sync + 'static,
        S: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.token_store(Arc::new(FnTokenStore::new(get, set)))
    }

    pub fn realtime_connector(mut self, connector: Arc<dyn RealtimeConnector>) -> Self { self.connector = Some(connector); self }

    /// Adopt an already constructed realtime client; credentials are then ignored.
    pub fn realtime_client(mut self, client: Arc<dyn RealtimeClient>) -> Self { self.prebuilt = Some(client); self }

    pub fn build(self) -> ClientResult<Session> {
        let cfg = self.config;
        let scope = parse_base_url(&cfg.base_url)?;

        let jar = match (&self.token_store, cfg.storage) {
            (None, TokenStorage::Cookie) => Some(Arc::new(Jar::default())),
            _ => None,
        };
        let backend = match self.token_store {
            Some(store) => store,
            None => build_token_store(
                cfg.storage,
                &cfg.token_key,
                cfg.storage_dir.clone(),
                jar.clone(),
                &scope,
                &cfg.cookie_path,
                cfg.cookie_max_age,
            ),
        };
        let (mirror, _) = watch::channel(backend.get());
        let tokens = Arc::new(MirroredTokenStore { backend, mirror });
        let api = ApiClient::from_config(&cfg, tokens.clone(), jar.clone())?;

        let connector = self.connector.unwrap_or_else(|| Arc::new(RestConnector));
        let realtime = RealtimeBootstrap::new(connector);
        match self.prebuilt {
            Some(client) => realtime.configure(client),
            None if cfg.realtime.url.is_some() || cfg.realtime.key.is_some() => realtime.configure(cfg.realtime.clone()),
            None => {}
        }

        info!(target: "sexyguard::session", "session ready base={} storage={}", cfg.base_url, cfg.storage);
        Ok(Session { config: cfg, tokens, api, realtime, jar })
    }
}

pub struct Session {
    config: ClientConfig,
    tokens: Arc<MirroredTokenStore>,
    api: ApiClient,
    realtime: RealtimeBootstrap,
    jar: Option<Arc<Jar>>,
}

impl Session {
    pub fn builder(config: ClientConfig) -> SessionBuilder {
        SessionBuilder { config, token_store: None, connector: None, prebuilt: None }
    }

    pub fn new(config: ClientConfig) -> ClientResult<Self> { Self::builder(config).build() }

    pub fn config(&self) -> &ClientConfig { &self.config }

    pub fn api(&self) -> &ApiClient { &self.api }

    /// Cookie jar shared by the token store and the HTTP client (cookie storage only).
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> { self.jar.as_ref() }

    /// Current token as last written through this session.
    pub fn token(&self) -> Option<String> { self.tokens.mirror.borrow().clone() }

    pub fn is_authenticated(&self) -> bool { self.tokens.mirror.borrow().is_some() }

    /// Receiver notified whenever the token changes.
    pub fn watch_token(&self) -> watch::Receiver<Option<String>> { self.tokens.mirror.subscribe() }

    pub fn set_token(&self, token: Option<&str>) { self.tokens.set(token) }

    pub fn clear_token(&self) { self.tokens.clear() }

    pub async fn login(&self, creds: &Credentials) -> ClientResult<ApiOutcome> {
        crate::tprintln!("session.login user={}", creds.username);
        self.api.login(creds).await
    }

    pub fn logout(&self) {
        crate::tprintln!("session.logout");
        self.api.logout();
    }

    pub fn realtime(&self) -> &RealtimeBootstrap { &self.realtime }

    pub fn configure_realtime<S: Into<RealtimeSource>>(&self, source: S) { self.realtime.configure(source) }

    pub fn realtime_client(&self) -> Option<Arc<dyn RealtimeClient>> { self.realtime.client() }

    fn ready_client(&self) -> ClientResult<Arc<dyn RealtimeClient>> {
        self.realtime_client().ok_or_else(|| ClientError::config("realtime client is not ready"))
    }

    /// CRUD binding for `table`; requires a ready realtime client.
    pub fn table(&self, table: &str) -> ClientResult<TableHandle> { Ok(TableHandle::new(self.ready_client()?, table)) }

    /// Change feed for `table`; requires a ready realtime client.
    pub async fn subscribe(&self, table: &str) -> ClientResult<Subscription> {
        Subscription::open(self.ready_client()?, table).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.config.base_url)
            .field("storage", &self.config.storage)
            .field("authenticated", &self.is_authenticated())
            .field("realtime", &self.realtime.handle())
            .finish()
    }
}
