//! Response processing: JSON parsing and the vendor's `meta` envelope.
//!
//! # Design
//! A response whose status is in the caller's success set is returned as is.
//! Anything else is judged by its `meta` object: codes 200 and 409 count as
//! success (the vendor answers idempotent conflicts that way), a known
//! `errorType` becomes the matching [`ApiError`] variant, and everything else
//! is an unknown or malformed response.

use serde_json::Value;
use tracing::error;

use crate::error::{ApiError, Result};
use crate::http::{find_header, HttpResponse};

/// Success statuses for reads and updates.
pub const OK: &[u16] = &[200];

/// Success statuses for create operations.
pub const CREATED: &[u16] = &[200, 201];

/// A processed response: headers plus the parsed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub data: Value,
}

impl ApiResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Parse `response` and validate it against `success` and the meta envelope.
pub fn process_response(response: &HttpResponse, success: &[u16]) -> Result<ApiResponse> {
    let data: Value = serde_json::from_str(&response.body)
        .map_err(|_| logged("Invalid response", ApiError::InvalidResponse(response.body.clone())))?;

    if !success.contains(&response.status) {
        raise_error_from_response(&data)?;
    }

    Ok(ApiResponse {
        status: response.status,
        headers: response.headers.clone(),
        data,
    })
}

/// Check the `meta` envelope of `data`, failing with the vendor's error kind.
///
/// Also applied to each sub-response of a multi request.
pub fn raise_error_from_response(data: &Value) -> Result<()> {
    let meta = match data.get("meta") {
        Some(meta) if is_present(meta) => meta,
        _ => {
            return Err(logged(
                "Response format invalid, missing meta property",
                ApiError::MalformedResponse(data.clone()),
            ))
        }
    };

    if is_success_code(meta) {
        return Ok(());
    }

    let detail = meta
        .get("errorDetail")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let known = meta
        .get("errorType")
        .and_then(Value::as_str)
        .and_then(|error_type| ApiError::from_error_type(error_type, detail));

    match known {
        Some(err) => Err(logged("Ticketbis API error", err)),
        None => Err(logged("Unknown error", ApiError::UnknownError(meta.clone()))),
    }
}

/// A meta value counts only when it is non-empty: `null`, `false`, `0`, `""`,
/// `[]` and `{}` are all treated as missing.
fn is_present(meta: &Value) -> bool {
    match meta {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Only a numeric code counts; `"409"` is not a conflict.
fn is_success_code(meta: &Value) -> bool {
    meta.get("code")
        .and_then(Value::as_f64)
        .is_some_and(|code| code == 200.0 || code == 409.0)
}

fn logged(message: &str, err: ApiError) -> ApiError {
    error!(error = %err, "{message}");
    err
}
