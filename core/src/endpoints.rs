//! Typed accessors for the REST resources.
//!
//! # Design
//! An [`Endpoint`] is a short-lived view over the client's [`Requester`] bound
//! to one resource path. Methods consume the view, so a returned
//! [`Paginated`] iterator can keep borrowing the requester for as long as the
//! caller iterates. The resource marker type only exists to hang
//! resource-specific sub-resource accessors off the generic view.
//!
//! [`Multi`] is the exception: it drains the requester's queue of sub-requests
//! in batches of [`MAX_MULTI_REQUESTS`], one network round-trip per batch.

use std::marker::PhantomData;

use serde_json::Value;

use crate::encode::{ParamValue, Params};
use crate::error::{ApiError, Result};
use crate::http::FilePart;
use crate::requester::{Paginated, Requester};
use crate::response::{raise_error_from_response, CREATED};

/// Max number of sub-requests sent in one multi request.
pub const MAX_MULTI_REQUESTS: usize = 5;

/// A REST resource with a fixed top-level path.
pub trait Resource {
    const PATH: &'static str;
}

pub mod resource {
    //! Resource markers.

    use super::Resource;

    macro_rules! resources {
        ($($name:ident => $path:literal),* $(,)?) => {
            $(
                #[derive(Debug, Clone, Copy)]
                pub struct $name;

                impl Resource for $name {
                    const PATH: &'static str = $path;
                }
            )*
        };
    }

    resources! {
        Events => "events",
        Categories => "categories",
        Sites => "sites",
        Venues => "venues",
        Schemas => "schemas",
        SectionGroups => "section_groups",
    }

    /// A sub-resource below a specific item, e.g. `events/{id}/section_groups`.
    #[derive(Debug, Clone, Copy)]
    pub struct Nested;
}

pub type Events<'a> = Endpoint<'a, resource::Events>;
pub type Categories<'a> = Endpoint<'a, resource::Categories>;
pub type Sites<'a> = Endpoint<'a, resource::Sites>;
pub type Venues<'a> = Endpoint<'a, resource::Venues>;
pub type Schemas<'a> = Endpoint<'a, resource::Schemas>;
pub type SectionGroups<'a> = Endpoint<'a, resource::SectionGroups>;

/// What a generic endpoint call produced.
pub enum EndpointResult<'a> {
    /// Response body of a single GET.
    Data(Value),
    /// Lazy iterator over every item of every page.
    Pages(Paginated<'a>),
    /// The call was queued; holds the multi queue length.
    Queued(usize),
}

impl<'a> EndpointResult<'a> {
    pub fn into_data(self) -> Option<Value> {
        match self {
            EndpointResult::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_pages(self) -> Option<Paginated<'a>> {
        match self {
            EndpointResult::Pages(pages) => Some(pages),
            _ => None,
        }
    }

    pub fn queued(&self) -> Option<usize> {
        match self {
            EndpointResult::Queued(n) => Some(*n),
            _ => None,
        }
    }
}

pub struct Endpoint<'a, R> {
    requester: &'a mut Requester,
    path: String,
    _resource: PhantomData<R>,
}

impl<'a, R: Resource> Endpoint<'a, R> {
    pub fn new(requester: &'a mut Requester) -> Self {
        Self::at(requester, R::PATH.to_string())
    }
}

impl<'a, R> Endpoint<'a, R> {
    fn at(requester: &'a mut Requester, path: String) -> Self {
        Self {
            requester,
            path,
            _resource: PhantomData,
        }
    }

    fn nested(self, id: &str, sub: &str) -> Endpoint<'a, resource::Nested> {
        let path = format!("{}/{sub}", self.expanded_path(id));
        Endpoint::at(self.requester, path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The endpoint path joined with `sub`, skipping empty segments.
    pub fn expanded_path(&self, sub: &str) -> String {
        if sub.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{sub}", self.path)
        }
    }

    /// Generic entry point: queue when `multi`, else paginate when
    /// `auto_paginate`, else a single GET.
    pub fn call(self, id: &str, auto_paginate: bool, params: &Params, multi: bool) -> Result<EndpointResult<'a>> {
        let path = self.expanded_path(id);
        let requester = self.requester;
        if multi {
            Ok(EndpointResult::Queued(requester.add_multi_request(&path, params)))
        } else if auto_paginate {
            Ok(EndpointResult::Pages(requester.get_paginated(&path, params)))
        } else {
            requester.get(&path, params).map(EndpointResult::Data)
        }
    }

    /// Fetch a single item.
    pub fn get(self, id: &str) -> Result<Value> {
        let path = self.expanded_path(id);
        self.requester.get(&path, &Params::new())
    }

    /// Fetch one page of the collection.
    pub fn list(self, params: &Params) -> Result<Value> {
        self.requester.get(&self.path, params)
    }

    pub fn paginate(self, params: &Params) -> Paginated<'a> {
        let requester = self.requester;
        requester.get_paginated(&self.path, params)
    }

    /// Queue a GET for the next multi request. Returns the queue length.
    pub fn queue(self, id: &str, params: &Params) -> usize {
        let path = self.expanded_path(id);
        self.requester.add_multi_request(&path, params)
    }

    pub fn create(self, params: &Params) -> Result<Value> {
        self.create_with_files(params, &[])
    }

    /// Create with file uploads, sent as `multipart/form-data`.
    pub fn create_with_files(self, params: &Params, files: &[FilePart]) -> Result<Value> {
        self.requester.post(&self.path, params, files, CREATED)
    }

    /// PUT to `{endpoint}/{id}`, taking the id from `params`.
    pub fn update(self, params: &Params) -> Result<Value> {
        let id = match params.get("id") {
            Some(ParamValue::Single(id)) if !id.is_empty() => id.clone(),
            _ => return Err(ApiError::MissingField("id".to_string())),
        };
        let path = self.expanded_path(&id);
        self.requester.put(&path, params)
    }
}

impl<'a> Events<'a> {
    /// `events/{event_id}/section_groups`
    pub fn section_groups(self, event_id: &str) -> Endpoint<'a, resource::Nested> {
        self.nested(event_id, "section_groups")
    }
}

impl<'a> Categories<'a> {
    /// `categories/{category_id}/events`
    pub fn events(self, category_id: &str) -> Endpoint<'a, resource::Nested> {
        self.nested(category_id, "events")
    }
}

impl<'a> Venues<'a> {
    /// `venues/{venue_id}/schemas`
    pub fn schemas(self, venue_id: &str) -> Endpoint<'a, resource::Nested> {
        self.nested(venue_id, "schemas")
    }
}

/// Batched execution of queued sub-requests.
pub struct Multi<'a> {
    requester: &'a mut Requester,
}

impl<'a> Multi<'a> {
    pub const PATH: &'static str = "multi";

    pub fn new(requester: &'a mut Requester) -> Self {
        Self { requester }
    }

    pub fn len(&self) -> usize {
        self.requester.multi_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Round-trips needed to drain the current queue.
    pub fn num_required_api_calls(&self) -> usize {
        self.len().div_ceil(MAX_MULTI_REQUESTS)
    }

    /// Drain the queue lazily, one batch per round-trip.
    ///
    /// Every sub-response is yielded in the order the vendor returned it. A
    /// failed sub-response is yielded as `Err` and iteration continues; the
    /// caller decides whether to propagate it. A failed batch request is
    /// yielded as `Err` and ends iteration. Sub-requests of that batch are
    /// not re-queued.
    pub fn execute(self) -> MultiResults<'a> {
        MultiResults {
            requester: self.requester,
            responses: Vec::new().into_iter(),
            stopped: false,
        }
    }
}

pub struct MultiResults<'a> {
    requester: &'a mut Requester,
    responses: std::vec::IntoIter<Value>,
    stopped: bool,
}

impl MultiResults<'_> {
    /// Sub-requests still waiting to be sent.
    pub fn remaining(&self) -> usize {
        self.requester.multi_len()
    }

    fn send_batch(&mut self) -> Result<Vec<Value>> {
        let batch = self.requester.drain_multi(MAX_MULTI_REQUESTS);
        let params = Params::new().with("requests", batch.join(","));
        let data = self.requester.get(Multi::PATH, &params)?;
        match data {
            Value::Object(mut body) => match body.remove("responses") {
                Some(Value::Array(responses)) => Ok(responses),
                _ => Err(ApiError::MissingField("responses".to_string())),
            },
            _ => Err(ApiError::MissingField("responses".to_string())),
        }
    }
}

impl Iterator for MultiResults<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(mut sub) = self.responses.next() {
                return Some(raise_error_from_response(&sub).map(|()| {
                    sub.get_mut("response").map(Value::take).unwrap_or(Value::Null)
                }));
            }
            if self.stopped || self.requester.multi_len() == 0 {
                return None;
            }
            match self.send_batch() {
                Ok(responses) => self.responses = responses.into_iter(),
                Err(err) => {
                    self.stopped = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
