use std::fmt;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use reqwest::{Method, Url};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{CacheStorage, Fetcher, InterceptorError, Request, Response};
use crate::events::Message;

/// Maximum concurrent manifest fetches during install.
const MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, nothing cached yet
    New,
    /// Populating the current cache generation
    Installing,
    /// Populated, waiting to activate
    Installed,
    /// Deleting old generations
    Activating,
    /// Intercepting requests
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::New => "new",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Current cache generation, e.g. `funshiksha-v1`
    pub cache_name: String,
    /// Origin the app is served from; relative manifest entries resolve against it
    pub origin: String,
    /// Fallback document for failed navigations; must be in the manifest
    pub offline_url: String,
    /// Resources populated at install time
    pub manifest: Vec<String>,
    /// Hand non-cacheable network responses (non-200, cross-origin) back
    /// unchanged instead of substituting the offline fallback
    pub return_uncacheable_responses: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            cache_name: "funshiksha-v1".to_string(),
            origin: "https://funshiksha.app".to_string(),
            offline_url: "/offline.html".to_string(),
            manifest: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/manifest.json".to_string(),
                "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&family=Noto+Sans+Devanagari:wght@300;400;500;600;700&display=swap".to_string(),
            ],
            return_uncacheable_responses: false,
        }
    }
}

/// Serves requests from the cache or the network and keeps the cache populated.
///
/// Lifecycle: `New → Installing → Installed → Activating → Active`. Until it
/// is active, every request goes straight to the network.
pub struct CacheInterceptor {
    config: InterceptorConfig,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Fetcher>,
    state: watch::Sender<LifecycleState>,
    writes: Mutex<JoinSet<()>>,
}

impl CacheInterceptor {
    pub fn new(
        config: InterceptorConfig,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Fetcher>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::New);
        Self {
            config,
            storage,
            network,
            state,
            writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    fn resolve(&self, entry: &str) -> Result<String, InterceptorError> {
        Url::parse(&self.config.origin)
            .and_then(|origin| origin.join(entry))
            .map(String::from)
            .map_err(|_| InterceptorError::InvalidUrl(entry.to_string()))
    }

    // ===== Lifecycle =====

    /// Populate the current cache generation from the manifest.
    ///
    /// All-or-nothing: every entry must fetch with status 200 before
    /// anything is written. On failure the interceptor returns to its
    /// previous state and older generations stay authoritative.
    pub async fn install(&self) -> Result<usize, InterceptorError> {
        let previous = self.state();
        if matches!(previous, LifecycleState::Installing | LifecycleState::Activating) {
            return Err(InterceptorError::InvalidState {
                action: "install",
                state: previous,
            });
        }
        info!(cache = %self.config.cache_name, "Installing cache");
        self.state.send_replace(LifecycleState::Installing);

        match self.populate().await {
            Ok(count) => {
                self.state.send_replace(LifecycleState::Installed);
                info!(cache = %self.config.cache_name, count, "All essential resources cached");
                Ok(count)
            }
            Err(e) => {
                warn!(cache = %self.config.cache_name, error = %e, "Failed to cache resources");
                self.state.send_replace(previous);
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, InterceptorError> {
        let urls = self
            .config
            .manifest
            .iter()
            .map(|entry| self.resolve(entry))
            .collect::<Result<Vec<_>, _>>()?;

        let fetched: Vec<Result<(String, Response), InterceptorError>> = stream::iter(urls)
            .map(|url| async move {
                let response = self
                    .network
                    .fetch(&Request::get(url.clone()))
                    .await
                    .map_err(|source| InterceptorError::Fetch {
                        url: url.clone(),
                        source,
                    })?;
                if !response.is_ok() {
                    return Err(InterceptorError::BadStatus {
                        url,
                        status: response.status,
                    });
                }
                Ok((url, response))
            })
            .buffered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;
        let responses = fetched.into_iter().collect::<Result<Vec<_>, _>>()?;

        let existed = self.storage.has(&self.config.cache_name).await;
        let cache = self.storage.open(&self.config.cache_name).await?;
        let count = responses.len();
        for (url, response) in responses {
            if let Err(e) = cache.put(&url, response).await {
                if !existed {
                    let _ = self.storage.delete(&self.config.cache_name).await;
                }
                return Err(e.into());
            }
        }
        Ok(count)
    }

    /// Delete every cache generation except the current one and start intercepting.
    /// Returns the names of the deleted generations.
    pub async fn activate(&self) -> Result<Vec<String>, InterceptorError> {
        match self.state() {
            LifecycleState::Installed => {}
            LifecycleState::Active => return Ok(Vec::new()),
            state => {
                return Err(InterceptorError::InvalidState {
                    action: "activate",
                    state,
                })
            }
        }
        self.state.send_replace(LifecycleState::Activating);
        info!("Activating cache interceptor");

        let current = CacheStorage::key_for(&self.config.cache_name);
        let mut deleted = Vec::new();
        let result = async {
            for name in self.storage.keys().await? {
                if name != current {
                    info!(cache = %name, "Deleting old cache");
                    self.storage.delete(&name).await?;
                    deleted.push(name);
                }
            }
            Ok::<_, InterceptorError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.state.send_replace(LifecycleState::Active);
                info!("Cache interceptor activated");
                Ok(deleted)
            }
            Err(e) => {
                self.state.send_replace(LifecycleState::Installed);
                Err(e)
            }
        }
    }

    /// Pick up a generation installed and activated by an earlier process.
    /// Returns whether the interceptor is now active.
    pub async fn resume(&self) -> bool {
        if self.state() == LifecycleState::New && self.is_installed().await {
            info!(cache = %self.config.cache_name, "Resuming installed cache");
            self.state.send_replace(LifecycleState::Active);
        }
        self.state() == LifecycleState::Active
    }

    /// Whether the current generation holds every manifest entry.
    async fn is_installed(&self) -> bool {
        let Some(cache) = self.storage.existing(&self.config.cache_name).await else {
            return false;
        };
        for entry in &self.config.manifest {
            let Ok(url) = self.resolve(entry) else {
                return false;
            };
            if !matches!(cache.entry(&url).await, Ok(Some(_))) {
                debug!(cache = %self.config.cache_name, url = %url, "Installed cache is incomplete");
                return false;
            }
        }
        true
    }

    /// Handle a control message from the client side.
    pub async fn on_message(&self, message: &Message) -> Result<(), InterceptorError> {
        if *message == Message::SkipWaiting && self.state() == LifecycleState::Installed {
            self.activate().await?;
        }
        Ok(())
    }

    // ===== Request handling =====

    /// Answer `request`. Non-GET requests, and anything arriving before
    /// activation, go straight to the network.
    pub async fn handle(&self, request: Request) -> Result<Response, super::FetchError> {
        if request.method != Method::GET || self.state() != LifecycleState::Active {
            return self.network.fetch(&request).await;
        }
        if request.is_navigation() {
            Ok(self.network_first(&request).await)
        } else {
            Ok(self.cache_first(&request).await)
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_in_background(&request.url, &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation failed, trying cache");
                match self.lookup(&request.url).await {
                    Some(cached) => cached,
                    None => self.offline_document().await,
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(&request.url).await {
            debug!(url = %request.url, "Serving from cache");
            return cached;
        }

        match self.network.fetch(request).await {
            Ok(response) if Self::is_cacheable(&response) => {
                self.store_in_background(&request.url, &response);
                response
            }
            Ok(response) if self.config.return_uncacheable_responses => response,
            Ok(response) => {
                debug!(url = %request.url, status = response.status.as_u16(), "Response not cacheable");
                self.fallback(request).await
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network request failed");
                self.fallback(request).await
            }
        }
    }

    fn is_cacheable(response: &Response) -> bool {
        response.is_ok() && response.kind == super::ResponseKind::Basic
    }

    async fn fallback(&self, request: &Request) -> Response {
        if request.accepts_html() {
            self.offline_document().await
        } else {
            Response::unavailable()
        }
    }

    async fn lookup(&self, url: &str) -> Option<Response> {
        let cache = self.storage.existing(&self.config.cache_name).await?;
        cache.match_url(url).await.unwrap_or_else(|e| {
            warn!(url = url, error = %e, "Failed to read cache entry");
            None
        })
    }

    /// The offline document, or a synthetic 503 if it was never cached.
    async fn offline_document(&self) -> Response {
        match self.resolve(&self.config.offline_url) {
            Ok(url) => match self.lookup(&url).await {
                Some(document) => document,
                None => {
                    warn!(url = %url, "Offline document missing from cache");
                    Response::unavailable()
                }
            },
            Err(e) => {
                warn!(error = %e, "Invalid offline document URL");
                Response::unavailable()
            }
        }
    }

    /// Duplicate `response` and write the copy to the cache without
    /// delaying the caller. Failures are logged and dropped.
    fn store_in_background(&self, url: &str, response: &Response) {
        let copy = match response.try_clone() {
            Ok(copy) => copy,
            Err(e) => {
                warn!(url = url, error = %e, "Cache write failed");
                return;
            }
        };
        let storage = Arc::clone(&self.storage);
        let name = self.config.cache_name.clone();
        let url = url.to_string();

        let mut writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            let Some(cache) = storage.existing(&name).await else {
                debug!(cache = %name, url = %url, "Cache generation gone, dropping write");
                return;
            };
            if let Err(e) = cache.put(&url, copy).await {
                warn!(url = %url, error = %e, "Cache write failed");
            }
        });
    }

    /// Wait for every background cache write started so far.
    pub async fn settle(&self) {
        let mut pending = {
            let mut writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *writes)
        };
        while pending.join_next().await.is_some() {}
    }
}

// ============================================================================
// Tests
// ============================================================================
