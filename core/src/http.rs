//! HTTP transport: plain-data requests and responses, the pluggable
//! [`Transport`], and the retrying [`Http`] wrapper.
//!
//! # Design
//! Requests and responses are described as plain owned data. A [`Transport`]
//! executes one request and reports non-2xx statuses as data, never as
//! errors, leaving status interpretation to the response processor. Callers
//! that already hold an HTTP session can plug it in by implementing the trait;
//! [`UreqTransport`] is the default.
//!
//! [`Http`] owns the transport and applies the request policy: GET retries a
//! bounded number of times with a fixed delay, POST and PUT are sent once.

use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{BasicAuth, ClientConfig};
use crate::encode::{encode_query, form_urlencode, ParamValue, Params, DEFAULT_SAFE_CHARS};
use crate::error::{ApiError, Result};
use crate::response::{process_response, ApiResponse, OK};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// An HTTP request described as plain data. `url` includes the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// The request never produced a response.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Executes a single HTTP round-trip.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `verify_ssl = false` accepts any server certificate.
    pub fn new(timeout: Duration, verify_ssl: bool) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!verify_ssl)
            .build();
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .tls_config(tls)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.timeout, config.verify_ssl)
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (k, v) in headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let body = request.body.as_deref().unwrap_or_default();
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(url), &request.headers).send(body),
            HttpMethod::Put => with_headers(self.agent.put(url), &request.headers).send(body),
        };
        let mut response = result.map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse { status, headers, body })
    }
}

/// A file uploaded as one part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl FilePart {
    pub fn new(field: impl Into<String>, filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            content_type: "application/octet-stream".to_string(),
            content: content.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Request body for writes.
#[derive(Debug, Clone)]
pub enum Body {
    Json(Value),
    Form(Params),
    /// `multipart/form-data`: one part per field value, then one per file.
    Multipart { fields: Params, files: Vec<FilePart> },
}

fn quoted_name(name: &str) -> String {
    name.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

/// Encode a `multipart/form-data` body delimited by `boundary`.
pub fn encode_multipart(boundary: &str, fields: &Params, files: &[FilePart]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields.iter() {
        let values = match value {
            ParamValue::Single(v) => std::slice::from_ref(v),
            ParamValue::Many(vs) => vs.as_slice(),
        };
        for v in values {
            out.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    quoted_name(name)
                )
                .as_bytes(),
            );
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
    for file in files {
        out.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                quoted_name(&file.field),
                quoted_name(&file.filename),
                file.content_type
            )
            .as_bytes(),
        );
        out.extend_from_slice(&file.content);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

/// Headers safe to write to a log: credentials keep only their scheme.
fn redacted(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case("Authorization") {
                let scheme = v.split_once(' ').map_or("", |(scheme, _)| scheme);
                (k.clone(), format!("{scheme} <redacted>").trim_start().to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

/// Sends requests through a [`Transport`] and processes the responses.
pub struct Http {
    transport: Box<dyn Transport>,
    attempts: u32,
    retry_delay: Duration,
    auth: Option<BasicAuth>,
    network_debug: bool,
}

impl Http {
    pub fn new(transport: Box<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            attempts: config.num_request_retries.max(1),
            retry_delay: config.retry_delay,
            auth: config.auth.clone(),
            network_debug: config.network_debug,
        }
    }

    /// GET `url` with `params` encoded as the query string.
    ///
    /// Failures are retried up to the configured attempt count, except the
    /// kinds for which [`ApiError::is_retriable`] is false.
    pub fn get(&self, url: &str, headers: &[(String, String)], params: &Params) -> Result<ApiResponse> {
        let query = encode_query(params, false, DEFAULT_SAFE_CHARS);
        let url = if query.is_empty() {
            url.to_string()
        } else {
            format!("{url}?{query}")
        };
        let request = self.request(HttpMethod::Get, url, headers, None)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(&request, OK) {
                Ok(response) => return Ok(response),
                Err(err) if !err.is_retriable() || attempt >= self.attempts => return Err(err),
                Err(err) => {
                    warn!(attempt, url = %request.url, error = %err, "retrying ticketbis request");
                    thread::sleep(self.retry_delay);
                }
            }
        }
    }

    /// POST `body`, accepting any status in `success`.
    pub fn post(&self, url: &str, headers: &[(String, String)], body: Body, success: &[u16]) -> Result<ApiResponse> {
        let request = self.request(HttpMethod::Post, url.to_string(), headers, Some(body))?;
        self.send(&request, success)
    }

    pub fn put(&self, url: &str, headers: &[(String, String)], body: Body) -> Result<ApiResponse> {
        let request = self.request(HttpMethod::Put, url.to_string(), headers, Some(body))?;
        self.send(&request, OK)
    }

    fn request(
        &self,
        method: HttpMethod,
        url: String,
        headers: &[(String, String)],
        body: Option<Body>,
    ) -> Result<HttpRequest> {
        let mut headers = headers.to_vec();
        let body = match body {
            Some(Body::Json(value)) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(serde_json::to_vec(&value).map_err(|e| ApiError::Serialization(e.to_string()))?)
            }
            Some(Body::Form(params)) => {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
                Some(form_urlencode(&params).into_bytes())
            }
            Some(Body::Multipart { fields, files }) => {
                let boundary = uuid::Uuid::new_v4().simple().to_string();
                headers.push((
                    "Content-Type".to_string(),
                    format!("multipart/form-data; boundary={boundary}"),
                ));
                Some(encode_multipart(&boundary, &fields, &files))
            }
            None => None,
        };
        if let Some(auth) = &self.auth {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Authorization"));
            let credentials = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
            headers.push(("Authorization".to_string(), format!("Basic {credentials}")));
        }
        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    fn send(&self, request: &HttpRequest, success: &[u16]) -> Result<ApiResponse> {
        if self.network_debug {
            debug!(method = request.method.as_str(), url = %request.url, headers = ?redacted(&request.headers), "ticketbis request");
        }
        let response = self.transport.execute(request).map_err(|e| {
            tracing::error!(error = %e, "Error connecting with ticketbis API");
            ApiError::Connection(e.0)
        })?;
        if self.network_debug {
            debug!(status = response.status, headers = ?response.headers, "ticketbis response");
        }
        process_response(&response, success)
    }
}
