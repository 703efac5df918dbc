//! Cached, throttled access to the public football data API.
//!
//! This module provides the [`CachedClient`], which sits between callers
//! and the remote read-only REST API, and [`SportsApi`], which builds URLs
//! for the two API base paths and validates entity payloads.
//!
//! The API needs no authentication. It signals application errors with a
//! JSON `error` field, sometimes alongside a 200 status.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod transport;
pub mod ttl;

pub use client::CachedClient;
pub use endpoints::SportsApi;
pub use error::{ErrorKind, FetchError};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
pub use ttl::TtlPolicy;
