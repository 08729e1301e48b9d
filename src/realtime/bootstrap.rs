use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{RealtimeClient, RealtimeConnector, RestConnector};
use crate::config::RealtimeSettings;
use crate::error::{ApiError, ClientError};

/// Observable state of the realtime client.
#[derive(Clone)]
pub enum ClientHandle {
    Uninitialized,
    Ready(Arc<dyn RealtimeClient>),
    Failed(Arc<ClientError>),
}

impl ClientHandle {
    pub fn is_ready(&self) -> bool { matches!(self, ClientHandle::Ready(_)) }

    pub fn client(&self) -> Option<Arc<dyn RealtimeClient>> {
        match self { ClientHandle::Ready(c) => Some(c.clone()), _ => None }
    }

    pub fn error(&self) -> Option<ApiError> {
        match self { ClientHandle::Failed(e) => Some(ApiError::from(e.as_ref())), _ => None }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientHandle::Uninitialized => f.write_str("Uninitialized"),
            ClientHandle::Ready(_) => f.write_str("Ready"),
            ClientHandle::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// Where the realtime client comes from.
#[derive(Clone)]
pub enum RealtimeSource {
    /// Adopted as-is; no construction ever happens.
    Prebuilt(Arc<dyn RealtimeClient>),
    /// Built by the connector once both URL and key are present.
    Credentials(RealtimeSettings),
}

impl From<RealtimeSettings> for RealtimeSource {
    fn from(s: RealtimeSettings) -> Self { RealtimeSource::Credentials(s) }
}

impl From<Arc<dyn RealtimeClient>> for RealtimeSource {
    fn from(c: Arc<dyn RealtimeClient>) -> Self { RealtimeSource::Prebuilt(c) }
}

#[derive(Default)]
struct Slot {
    // bumped whenever inputs change; an attempt may only publish under its own generation
    generation: u64,
    inputs: Option<RealtimeSettings>,
    prebuilt: bool,
    attempts: u64,
}

struct Inner {
    connector: Arc<dyn RealtimeConnector>,
    slot: Mutex<Slot>,
    state: watch::Sender<ClientHandle>,
}

/// Lazy, at-most-once-per-credentials construction of the realtime client.
#[derive(Clone)]
pub struct RealtimeBootstrap {
    inner: Arc<Inner>,
}

impl Default for RealtimeBootstrap {
    fn default() -> Self { Self::new(Arc::new(RestConnector)) }
}

impl RealtimeBootstrap {
    pub fn new(connector: Arc<dyn RealtimeConnector>) -> Self {
        let (state, _) = watch::channel(ClientHandle::Uninitialized);
        Self { inner: Arc::new(Inner { connector, slot: Mutex::new(Slot::default()), state }) }
    }

    /// Apply a source. Returns immediately; construction, if any, runs on a spawned task.
    ///
    /// - a prebuilt client becomes `Ready` at once and later sources are ignored;
    /// - the same credentials twice start nothing new;
    /// - new complete credentials reset the state to `Uninitialized` and start one attempt,
    ///   discarding the result of any attempt still in flight;
    /// - incomplete credentials only cancel an in-flight attempt.
    pub fn configure<S: Into<RealtimeSource>>(&self, source: S) {
        let mut slot = self.inner.slot.lock();
        if slot.prebuilt {
            debug!(target: "sexyguard::realtime", "prebuilt client in use; ignoring new source");
            return;
        }
        let settings = match source.into() {
            RealtimeSource::Prebuilt(client) => {
                slot.prebuilt = true;
                slot.generation += 1;
                slot.inputs = None;
                self.inner.state.send_replace(ClientHandle::Ready(client));
                info!(target: "sexyguard::realtime", "adopted prebuilt realtime client");
                return;
            }
            RealtimeSource::Credentials(s) => s,
        };
        if !settings.is_complete() {
            if slot.inputs.take().is_some() { slot.generation += 1; }
            debug!(target: "sexyguard::realtime", "realtime credentials incomplete; not connecting");
            return;
        }
        if slot.inputs.as_ref() == Some(&settings) { return; }

        slot.generation += 1;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                // inputs stay unrecorded so the same credentials can be retried inside a runtime
                slot.inputs = None;
                let err = ClientError::config("realtime bootstrap needs a tokio runtime");
                warn!(target: "sexyguard::realtime", "{}", err);
                self.inner.state.send_replace(ClientHandle::Failed(Arc::new(err)));
                return;
            }
        };
        slot.attempts += 1;
        slot.inputs = Some(settings.clone());
        let generation = slot.generation;
        self.inner.state.send_replace(ClientHandle::Uninitialized);
        drop(slot);

        let inner = self.inner.clone();
        runtime.spawn(async move {
            let url = settings.url.unwrap_or_default();
            let key = settings.key.unwrap_or_default();
            let result = inner.connector.connect(&url, &key, &settings.options).await;
            let slot = inner.slot.lock();
            if slot.generation != generation {
                debug!(target: "sexyguard::realtime", "discarding stale realtime bootstrap (generation {})", generation);
                return;
            }
            match result {
                Ok(client) => {
                    info!(target: "sexyguard::realtime", "realtime client ready for {}", url);
                    inner.state.send_replace(ClientHandle::Ready(client));
                }
                Err(e) => {
                    warn!(target: "sexyguard::realtime", "realtime client for {} failed: {}", url, e);
                    inner.state.send_replace(ClientHandle::Failed(Arc::new(e)));
                }
            }
        });
    }

    pub fn handle(&self) -> ClientHandle { self.inner.state.borrow().clone() }

    pub fn client(&self) -> Option<Arc<dyn RealtimeClient>> { self.handle().client() }

    pub fn is_ready(&self) -> bool { self.inner.state.borrow().is_ready() }

    pub fn watch(&self) -> watch::Receiver<ClientHandle> { self.inner.state.subscribe() }

    /// Number of construction attempts started so far.
    pub fn attempts(&self) -> u64 { self.inner.slot.lock().attempts }

    /// Wait until the handle leaves `Uninitialized`. Never returns while credentials are missing.
    pub async fn wait_settled(&self) -> ClientHandle {
        let mut rx = self.watch();
        let settled = match rx.wait_for(|h| !matches!(h, ClientHandle::Uninitialized)).await {
            Ok(h) => h.clone(),
            Err(_) => self.handle(),
        };
        settled
    }
}
