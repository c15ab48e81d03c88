//! One-time loading of the external SDK
//!
//! A load attempt is a single shared future: the first request in `Idle`
//! creates it, every later request while it is in flight receives a clone of
//! it, and its completion settles the bootstrap to `Ready` (cached for the
//! life of the bootstrap) or back to `Idle` (so the next request retries).

use crate::core::{config::ProviderConfig, constants::DEFAULT_SDK_URL};
use crate::data::fetch::HTTP_CLIENT;
use crate::prelude::{Arc, Future, Instant, Mutex, Pin};
use crate::runtime;
use crate::sdk::native::{MapEngine, SdkLoader};
use crate::{MapError, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::Lazy;
use std::sync::{MutexGuard, RwLock};
use std::task::{Context, Poll};

/// Where a bootstrap stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStatus {
    /// Nothing loaded; a failed attempt also lands here
    Idle,
    Loading,
    Ready,
}

impl std::fmt::Display for BootstrapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapStatus::Idle => write!(f, "idle"),
            BootstrapStatus::Loading => write!(f, "loading"),
            BootstrapStatus::Ready => write!(f, "ready"),
        }
    }
}

struct HandleInner {
    engine: Arc<dyn MapEngine>,
    api_key_id: String,
    loaded_at: Instant,
}

/// Loaded SDK, shared by every provider of the process
#[derive(Clone)]
pub struct SdkHandle {
    inner: Arc<HandleInner>,
}

impl SdkHandle {
    fn new(engine: Arc<dyn MapEngine>, api_key_id: &str) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                engine,
                api_key_id: api_key_id.to_string(),
                loaded_at: Instant::now(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn MapEngine> {
        &self.inner.engine
    }

    /// Key the SDK was loaded with
    pub fn api_key_id(&self) -> &str {
        &self.inner.api_key_id
    }

    pub fn loaded_at(&self) -> Instant {
        self.inner.loaded_at
    }

    /// Whether both handles come from the same load
    pub fn same_as(&self, other: &SdkHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SdkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkHandle")
            .field("engine", &self.inner.engine.name())
            .field("api_key_id", &self.inner.api_key_id)
            .finish()
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<SdkHandle>>>;

/// Result of [`SdkBootstrap::request_load`]; every waiter of one attempt
/// resolves to the same value
#[must_use = "a pending load does nothing unless awaited"]
pub struct PendingLoad(Pending);

enum Pending {
    Settled(Result<SdkHandle>),
    InFlight(SharedLoad),
}

impl PendingLoad {
    fn settled(result: Result<SdkHandle>) -> Self {
        Self(Pending::Settled(result))
    }

    fn in_flight(load: SharedLoad) -> Self {
        Self(Pending::InFlight(load))
    }

    /// Outcome, if it is already known
    pub fn peek(&self) -> Option<Result<SdkHandle>> {
        match &self.0 {
            Pending::Settled(result) => Some(result.clone()),
            Pending::InFlight(load) => load.peek().cloned(),
        }
    }
}

impl Future for PendingLoad {
    type Output = Result<SdkHandle>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.0 {
            Pending::Settled(result) => Poll::Ready(result.clone()),
            Pending::InFlight(load) => Pin::new(load).poll(cx),
        }
    }
}

enum Slot {
    Idle,
    Loading { attempt: u64, pending: SharedLoad },
    Ready(SdkHandle),
}

struct BootstrapState {
    slot: Slot,
    attempts: u64,
    last_error: Option<MapError>,
}

/// Loads the external SDK at most once and arbitrates concurrent waiters
pub struct SdkBootstrap {
    loader: Arc<dyn SdkLoader>,
    state: Mutex<BootstrapState>,
}

impl SdkBootstrap {
    pub fn new(loader: Arc<dyn SdkLoader>) -> Arc<Self> {
        Arc::new(Self {
            loader,
            state: Mutex::new(BootstrapState {
                slot: Slot::Idle,
                attempts: 0,
                last_error: None,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, BootstrapState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Requests the SDK
    ///
    /// Resolves immediately once ready, joins the in-flight attempt while
    /// loading, and starts a new attempt otherwise. The attempt's deadline comes
    /// from the config of the request that started it.
    pub fn request_load(self: &Arc<Self>, config: &ProviderConfig) -> PendingLoad {
        let mut state = self.state();
        match &state.slot {
            Slot::Ready(handle) => {
                if handle.api_key_id() != config.api_key_id {
                    log::warn!(
                        "SDK already loaded with key {}; ignoring key {}",
                        handle.api_key_id(),
                        config.api_key_id
                    );
                }
                return PendingLoad::settled(Ok(handle.clone()));
            }
            Slot::Loading { attempt, pending } => {
                log::debug!("joining in-flight SDK load #{}", attempt);
                return PendingLoad::in_flight(pending.clone());
            }
            Slot::Idle => {}
        }

        if let Err(err) = config.validate() {
            return PendingLoad::settled(Err(err));
        }

        state.attempts += 1;
        let attempt = state.attempts;
        let loader = Arc::clone(&self.loader);
        let bootstrap = Arc::downgrade(self);
        let config = config.clone();

        let load: BoxFuture<'static, Result<SdkHandle>> = async move {
            let outcome = match tokio::time::timeout(config.timeout(), loader.load(&config)).await
            {
                Ok(Ok(engine)) => Ok(SdkHandle::new(engine, &config.api_key_id)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(MapError::Timeout(config.timeout_ms)),
            };
            if let Some(bootstrap) = bootstrap.upgrade() {
                bootstrap.settle(attempt, &outcome);
            }
            outcome
        }
        .boxed();

        let pending = load.shared();
        state.slot = Slot::Loading {
            attempt,
            pending: pending.clone(),
        };
        drop(state);

        log::debug!("starting SDK load #{}", attempt);
        let driver = pending.clone();
        runtime::spawn(async move {
            let _ = driver.await;
        });

        PendingLoad::in_flight(pending)
    }

    fn settle(&self, attempt: u64, outcome: &Result<SdkHandle>) {
        let mut state = self.state();
        match &state.slot {
            Slot::Loading { attempt: current, .. } if *current == attempt => {}
            _ => {
                log::debug!("SDK load #{} settled after being superseded", attempt);
                return;
            }
        }

        match outcome {
            Ok(handle) => {
                log::info!(
                    "SDK ready after load #{} ({} engine)",
                    attempt,
                    handle.engine().name()
                );
                state.slot = Slot::Ready(handle.clone());
                state.last_error = None;
            }
            Err(err) => {
                log::warn!("SDK load #{} failed: {}", attempt, err);
                state.slot = Slot::Idle;
                state.last_error = Some(err.clone());
            }
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        match self.state().slot {
            Slot::Idle => BootstrapStatus::Idle,
            Slot::Loading { .. } => BootstrapStatus::Loading,
            Slot::Ready(_) => BootstrapStatus::Ready,
        }
    }

    /// Cached handle, once ready
    pub fn handle(&self) -> Option<SdkHandle> {
        match &self.state().slot {
            Slot::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Error of the most recent failed attempt, cleared on success
    pub fn last_error(&self) -> Option<MapError> {
        self.state().last_error.clone()
    }

    /// Number of underlying load actions started so far
    pub fn load_actions(&self) -> u64 {
        self.state().attempts
    }
}

impl std::fmt::Debug for SdkBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkBootstrap")
            .field("status", &self.status())
            .field("load_actions", &self.load_actions())
            .finish()
    }
}

static GLOBAL_BOOTSTRAP: Lazy<RwLock<Option<Arc<SdkBootstrap>>>> = Lazy::new(|| RwLock::new(None));

/// Process-wide bootstrap slot
///
/// Providers receive their bootstrap explicitly; the registry only gives
/// applications one well-known place to keep it. Tests build private
/// bootstraps or [`reset`](BootstrapRegistry::reset) the slot.
pub struct BootstrapRegistry;

impl BootstrapRegistry {
    /// Installs `bootstrap`, returning the one it replaces
    pub fn install(bootstrap: Arc<SdkBootstrap>) -> Option<Arc<SdkBootstrap>> {
        let mut slot = GLOBAL_BOOTSTRAP
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.replace(bootstrap)
    }

    /// Installed bootstrap, or one created with `loader` if none is
    pub fn get_or_install(loader: Arc<dyn SdkLoader>) -> Arc<SdkBootstrap> {
        let mut slot = GLOBAL_BOOTSTRAP
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slot.get_or_insert_with(|| SdkBootstrap::new(loader)))
    }

    pub fn global() -> Result<Arc<SdkBootstrap>> {
        GLOBAL_BOOTSTRAP
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| MapError::Config("no SDK bootstrap installed".into()))
    }

    /// Empties the slot; providers holding the old bootstrap keep using it
    pub fn reset() -> Option<Arc<SdkBootstrap>> {
        GLOBAL_BOOTSTRAP
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Builds an engine from the downloaded SDK payload
pub type EngineFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn MapEngine>> + Send + Sync>;

/// Acquires the SDK resource over HTTP
pub struct HttpSdkLoader {
    client: Option<reqwest::Client>,
    factory: EngineFactory,
}

impl HttpSdkLoader {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            client: None,
            factory,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }
}

#[async_trait]
impl SdkLoader for HttpSdkLoader {
    async fn load(&self, config: &ProviderConfig) -> Result<Arc<dyn MapEngine>> {
        let url = config.sdk_url.as_deref().unwrap_or(DEFAULT_SDK_URL);
        let client = self.client.as_ref().unwrap_or(&*HTTP_CLIENT);
        log::debug!("requesting SDK from {}", url);

        let response = client
            .get(url)
            .query(&[("apiKeyId", config.api_key_id.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Network(format!("{} returned HTTP {}", url, status)));
        }
        let payload = response.text().await?;
        log::info!("downloaded SDK payload ({} bytes)", payload.len());
        (self.factory)(&payload)
    }
}
