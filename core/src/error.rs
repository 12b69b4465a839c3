//! Error types for the Ticketbis API client.
//!
//! # Design
//! The vendor reports failures through a `meta.errorType` code. Each known code
//! gets its own variant carrying the vendor's `errorDetail` string, so callers
//! can match on the failure kind directly. Transport, parsing and unrecognised
//! envelope failures land in the generic variants with the raw payload attached
//! for diagnostics.

use serde_json::Value;

/// Errors returned by every fallible client operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `invalid_auth`: the credentials or token were rejected.
    #[error("invalid auth: {0}")]
    InvalidAuth(String),

    /// `param_error`: a request parameter was missing or malformed.
    #[error("param error: {0}")]
    ParamError(String),

    /// `endpoint_error`: the requested endpoint does not exist.
    #[error("endpoint error: {0}")]
    EndpointError(String),

    /// `not_authorized`: the caller may not access this resource.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// `deprecated`: the endpoint or parameter is no longer supported.
    #[error("deprecated: {0}")]
    Deprecated(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("failed geocode: {0}")]
    FailedGeocode(String),

    #[error("other error: {0}")]
    Other(String),

    /// The request never produced an HTTP response (DNS, refused, TLS...).
    #[error("error connecting with ticketbis API: {0}")]
    Connection(String),

    /// The response body was not valid JSON. Carries the raw text.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A non-success response without a `meta` envelope.
    #[error("response format invalid, missing meta property: {0}")]
    MalformedResponse(Value),

    /// A `meta` envelope whose `errorType` is not in the vendor table.
    #[error("unknown error, meta: {0}")]
    UnknownError(Value),

    /// Query parameters were neither a mapping nor a sequence of pairs.
    #[error("not a valid non-string sequence or mapping object: {0}")]
    InvalidParams(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response or argument lacked a field the operation depends on.
    #[error("missing field: {0}")]
    MissingField(String),
}

impl ApiError {
    /// Map a vendor `errorType` code to its variant. Returns `None` for codes
    /// outside the fixed table.
    pub fn from_error_type(error_type: &str, detail: impl Into<String>) -> Option<Self> {
        let detail = detail.into();
        let err = match error_type {
            "invalid_auth" => ApiError::InvalidAuth(detail),
            "param_error" => ApiError::ParamError(detail),
            "endpoint_error" => ApiError::EndpointError(detail),
            "not_authorized" => ApiError::NotAuthorized(detail),
            "rate_limit_exceeded" => ApiError::RateLimitExceeded(detail),
            "deprecated" => ApiError::Deprecated(detail),
            "server_error" => ApiError::ServerError(detail),
            "failed_geocode" => ApiError::FailedGeocode(detail),
            "other" => ApiError::Other(detail),
            _ => return None,
        };
        Some(err)
    }

    /// The vendor code for vendor-declared failures.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            ApiError::InvalidAuth(_) => Some("invalid_auth"),
            ApiError::ParamError(_) => Some("param_error"),
            ApiError::EndpointError(_) => Some("endpoint_error"),
            ApiError::NotAuthorized(_) => Some("not_authorized"),
            ApiError::RateLimitExceeded(_) => Some("rate_limit_exceeded"),
            ApiError::Deprecated(_) => Some("deprecated"),
            ApiError::ServerError(_) => Some("server_error"),
            ApiError::FailedGeocode(_) => Some("failed_geocode"),
            ApiError::Other(_) => Some("other"),
            _ => None,
        }
    }

    /// Whether replaying the same request could plausibly succeed.
    ///
    /// Auth, parameter, endpoint, authorization and deprecation failures will
    /// not change on replay.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            ApiError::InvalidAuth(_)
                | ApiError::ParamError(_)
                | ApiError::EndpointError(_)
                | ApiError::NotAuthorized(_)
                | ApiError::Deprecated(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
