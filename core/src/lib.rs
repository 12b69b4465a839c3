//! Synchronous client for the Ticketbis REST API.
//!
//! # Overview
//! Wraps the vendor's events, categories, sites, venues, schemas and section
//! group resources behind typed endpoint accessors, with OAuth2 token
//! exchange, lazy pagination and batched multi requests.
//!
//! # Design
//! - `Ticketbis` is the facade: it owns one `Requester` holding all mutable
//!   per-client state and is meant for a single owner at a time.
//! - All I/O goes through the `Transport` trait; `UreqTransport` is the
//!   default, and tests substitute their own.
//! - Vendor failures map to `ApiError` variants. Multi sub-request failures
//!   are returned as `Err` items, never raised for the whole batch.
//! - Logging uses `tracing`; the library never installs a subscriber.

pub mod client;
pub mod config;
pub mod encode;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod oauth;
pub mod requester;
pub mod response;

pub use client::Ticketbis;
pub use config::{BasicAuth, ClientConfig, GrantType};
pub use encode::{encode_query, ParamValue, Params, DEFAULT_SAFE_CHARS};
pub use endpoints::{EndpointResult, Multi, MultiResults, MAX_MULTI_REQUESTS};
pub use error::{ApiError, Result};
pub use http::{Body, FilePart, HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};
pub use requester::Paginated;
pub use response::ApiResponse;
