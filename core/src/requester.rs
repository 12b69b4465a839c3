//! Per-client request state and the GET/POST/PUT primitives every endpoint
//! is built on.
//!
//! # Design
//! `Requester` owns everything that changes between calls: the bearer
//! token, the active site, rate-limit and pagination bookkeeping read from
//! response headers, and the queue of pending multi sub-requests. It assumes
//! a single owner; share a client across threads only behind a lock.
//!
//! A requester is "userless" until it holds a non-empty access token. Userless
//! requests carry the client id and secret as parameters; authenticated ones
//! send a bearer header instead.

use serde_json::Value;

use crate::config::ClientConfig;
use crate::encode::{form_urlencode, quote_plus, Params};
use crate::error::{ApiError, Result};
use crate::http::{Body, FilePart, Http};
use crate::response::ApiResponse;

pub const SITE_HEADER: &str = "X-ticketbis-site";
pub const TOTAL_COUNT_HEADER: &str = "X-ticketbis-totalCount";
pub const PAGE_OFFSET_HEADER: &str = "X-ticketbis-pageOffset";
pub const PAGE_MAX_HEADER: &str = "X-ticketbis-pageMaxSize";
pub const RATE_LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const RATE_REMAINING_HEADER: &str = "X-RateLimit-Remaining";

pub struct Requester {
    http: Http,
    endpoint: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    oauth_token: Option<String>,
    version: u32,
    lang: String,
    site: Option<String>,
    multi_requests: Vec<String>,
    rate_limit: Option<u64>,
    rate_remaining: Option<u64>,
    total_count: Option<u64>,
    page_offset: Option<u64>,
    page_max: Option<u64>,
}

impl Requester {
    pub fn new(http: Http, config: &ClientConfig) -> Self {
        let mut requester = Self {
            http,
            endpoint: config.endpoint(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            oauth_token: None,
            version: config.version,
            lang: config.lang.clone(),
            site: config.site.clone().filter(|s| !s.is_empty()),
            multi_requests: Vec::new(),
            rate_limit: None,
            rate_remaining: None,
            total_count: None,
            page_offset: None,
            page_max: None,
        };
        requester.set_token(config.access_token.clone());
        requester
    }

    /// Switch between userless and authenticated mode.
    pub fn set_token(&mut self, access_token: Option<String>) {
        self.oauth_token = access_token.filter(|t| !t.is_empty());
    }

    pub fn is_userless(&self) -> bool {
        self.oauth_token.is_none()
    }

    pub fn http(&self) -> &Http {
        &self.http
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    pub fn rate_limit(&self) -> Option<u64> {
        self.rate_limit
    }

    pub fn rate_remaining(&self) -> Option<u64> {
        self.rate_remaining
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn page_offset(&self) -> Option<u64> {
        self.page_offset
    }

    pub fn page_max(&self) -> Option<u64> {
        self.page_max
    }

    /// Single-page GET returning the response body.
    pub fn get(&mut self, path: &str, params: &Params) -> Result<Value> {
        let url = self.url(path);
        let headers = self.headers();
        let params = self.enrich(params.clone());
        let response = self.http.get(&url, &headers, &params)?;
        self.update_from_headers(&response);
        Ok(response.data)
    }

    /// Lazily walk every page of a collection, yielding single items.
    pub fn get_paginated(&mut self, path: &str, params: &Params) -> Paginated<'_> {
        let url = self.url(path);
        let headers = self.headers();
        let params = self.enrich(params.clone());
        Paginated {
            requester: self,
            url,
            headers,
            params,
            page: Vec::new().into_iter(),
            pending: true,
        }
    }

    /// POST `params` as JSON, or as `multipart/form-data` when `files` is
    /// not empty.
    pub fn post(&mut self, path: &str, params: &Params, files: &[FilePart], success: &[u16]) -> Result<Value> {
        let url = self.url(path);
        let headers = self.headers();
        let fields = self.enrich(params.clone());
        let body = if files.is_empty() {
            Body::Json(fields.to_json())
        } else {
            Body::Multipart {
                fields,
                files: files.to_vec(),
            }
        };
        let response = self.http.post(&url, &headers, body, success)?;
        self.update_from_headers(&response);
        Ok(response.data)
    }

    pub fn put(&mut self, path: &str, params: &Params) -> Result<Value> {
        let url = self.url(path);
        let headers = self.headers();
        let body = Body::Json(self.enrich(params.clone()).to_json());
        let response = self.http.put(&url, &headers, body)?;
        self.update_from_headers(&response);
        Ok(response.data)
    }

    /// Queue a GET for the next multi request. Returns the queue length.
    ///
    /// The sub-request's own query string is escaped once more so the whole
    /// sub-request travels as one opaque value of the `requests` parameter.
    pub fn add_multi_request(&mut self, path: &str, params: &Params) -> usize {
        let mut url = path.to_string();
        if !params.is_empty() {
            url.push('?');
            url.push_str(&quote_plus(&form_urlencode(params)));
        }
        self.multi_requests.push(url);
        self.multi_requests.len()
    }

    pub fn multi_len(&self) -> usize {
        self.multi_requests.len()
    }

    pub fn multi_requests(&self) -> &[String] {
        &self.multi_requests
    }

    /// Remove and return up to `n` queued sub-requests from the front.
    pub fn drain_multi(&mut self, n: usize) -> Vec<String> {
        let n = n.min(self.multi_requests.len());
        self.multi_requests.drain(..n).collect()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Headers sent with every API call.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![(
            "Accept".to_string(),
            format!("application/vnd.ticketbis.v{}+json, application/json", self.version),
        )];
        if let Some(token) = &self.oauth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        match &self.site {
            Some(site) => headers.push((SITE_HEADER.to_string(), site.clone())),
            None => headers.push(("Accept-Language".to_string(), self.lang.clone())),
        }
        headers
    }

    fn enrich(&self, mut params: Params) -> Params {
        if self.is_userless() {
            params.set("client_id", self.client_id.as_deref().unwrap_or_default());
            params.set("client_secret", self.client_secret.as_deref().unwrap_or_default());
        }
        params
    }

    fn update_from_headers(&mut self, response: &ApiResponse) {
        if let Some(limit) = header_u64(response, RATE_LIMIT_HEADER) {
            self.rate_limit = Some(limit);
        }
        if let Some(remaining) = header_u64(response, RATE_REMAINING_HEADER) {
            self.rate_remaining = Some(remaining);
        }
        if response.header(TOTAL_COUNT_HEADER).is_some() {
            self.total_count = header_u64(response, TOTAL_COUNT_HEADER);
            self.page_offset = header_u64(response, PAGE_OFFSET_HEADER);
            self.page_max = header_u64(response, PAGE_MAX_HEADER);
        } else {
            self.total_count = None;
            self.page_offset = None;
            self.page_max = None;
        }
        if let Some(site) = response.header(SITE_HEADER).filter(|s| !s.is_empty()) {
            self.site = Some(site.to_string());
        }
    }
}

fn header_u64(response: &ApiResponse, name: &str) -> Option<u64> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

/// Iterator over every item of a paginated collection.
///
/// Pages are fetched on demand: the next request is only sent once every
/// item of the current page has been consumed. An error is yielded once and
/// ends the iteration.
pub struct Paginated<'a> {
    requester: &'a mut Requester,
    url: String,
    headers: Vec<(String, String)>,
    params: Params,
    page: std::vec::IntoIter<Value>,
    pending: bool,
}

impl Paginated<'_> {
    /// Pagination state as of the last fetched page.
    pub fn total_count(&self) -> Option<u64> {
        self.requester.total_count
    }

    pub fn page_offset(&self) -> Option<u64> {
        self.requester.page_offset
    }

    fn fetch_page(&mut self) -> Result<Vec<Value>> {
        let response = self.requester.http.get(&self.url, &self.headers, &self.params)?;
        self.requester.update_from_headers(&response);
        let items = match response.data {
            Value::Array(items) => items,
            _ => return Err(ApiError::MissingField("data".to_string())),
        };

        let r = &self.requester;
        self.pending = match (r.page_offset, r.page_max, r.total_count) {
            (Some(offset), Some(max), Some(total)) if max > 0 && !items.is_empty() => {
                let seen = offset.checked_add(items.len() as u64);
                match (seen, offset.checked_add(max)) {
                    (Some(seen), Some(next)) if seen < total => {
                        self.params.set("offset", next);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        Ok(items)
    }
}

impl Iterator for Paginated<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.page.next() {
                return Some(Ok(item));
            }
            if !self.pending {
                return None;
            }
            match self.fetch_page() {
                Ok(items) => self.page = items.into_iter(),
                Err(err) => {
                    self.pending = false;
                    return Some(Err(err));
                }
            }
        }
    }
}
