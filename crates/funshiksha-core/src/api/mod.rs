//! HTTP client for the remote sync endpoint.
//!
//! `HttpRemote` delivers queued operations, one POST per operation, to
//! `{base_url}/sync/{kind}`. The operation id travels as the
//! `Idempotency-Key` header so the server can discard replays.

pub mod client;
pub mod error;

pub use client::HttpRemote;
pub use error::RemoteError;
