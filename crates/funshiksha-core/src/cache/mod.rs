//! Request-interception cache for offline access.
//!
//! This module provides the `CacheInterceptor`, which decides per request
//! whether to answer from the durable response cache or the network, and
//! the `CacheStorage` it keeps populated. Cache generations are named
//! (e.g. `funshiksha-v1`); installing populates the current generation from
//! a fixed manifest and activating deletes every other generation.
//!
//! Policy:
//! - Navigations go network-first, falling back to the cached page and then
//!   the offline document
//! - Everything else goes cache-first, falling back to the network and then
//!   the offline document (HTML) or a synthetic 503

pub mod error;
pub mod fetcher;
pub mod http;
pub mod interceptor;
pub mod storage;

pub use error::{CacheError, FetchError, InterceptorError};
pub use fetcher::{Fetcher, HttpFetcher};
pub use http::{Body, Request, RequestMode, Response, ResponseKind};
pub use interceptor::{CacheInterceptor, InterceptorConfig, LifecycleState};
pub use storage::{CacheStorage, CachedData, NamedCache};
