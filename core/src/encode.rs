//! Query parameters and the vendor's query-string encoding.
//!
//! # Design
//! The vendor does not decode standard `application/x-www-form-urlencoded`
//! strings correctly, so query values are escaped with `%XX` (never `+`) and a
//! configurable set of characters is left untouched (`&/,+` by default).
//!
//! When sequence values are expanded into repeated keys, each element is
//! escaped with the standard safe set (`/` only), not the caller's set. Keys
//! and scalar values always use the caller's set. The vendor's parser was
//! written against this behaviour, so it is kept as is.

use percent_encoding::percent_encode_byte;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Characters left unescaped by default in query keys and values.
pub const DEFAULT_SAFE_CHARS: &str = "&/,+";

/// Characters left unescaped in expanded sequence elements.
pub const STANDARD_SAFE_CHARS: &str = "/";

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// The value as one string. Sequences are comma-joined.
    pub fn joined(&self) -> String {
        match self {
            ParamValue::Single(v) => v.clone(),
            ParamValue::Many(vs) => vs.join(","),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ParamValue::Single(v) => Value::String(v.clone()),
            ParamValue::Many(vs) => Value::Array(vs.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// Ordered query parameters. Insertion order is the order on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_many<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.insert(key.into(), ParamValue::Many(values));
        self
    }

    /// Replace the value for `key`, or append it if absent.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.insert(key.into(), ParamValue::Single(value.to_string()));
    }

    fn insert(&mut self, key: String, value: ParamValue) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let idx = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON object body for write requests.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .pairs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Params
where
    K: Into<String>,
    V: ToString,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Accepts a JSON object, or an array of `[key, value]` pairs.
impl TryFrom<&Value> for Params {
    type Error = ApiError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let mut params = Params::new();
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    params.insert(k.clone(), json_param(v));
                }
            }
            Value::Array(items) => {
                for item in items {
                    let (key, v) = match item.as_array().map(Vec::as_slice) {
                        Some([key, v]) => (key, v),
                        _ => return Err(ApiError::InvalidParams(item.to_string())),
                    };
                    let key = match key {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        other => return Err(ApiError::InvalidParams(other.to_string())),
                    };
                    params.insert(key, json_param(v));
                }
            }
            other => return Err(ApiError::InvalidParams(other.to_string())),
        }
        Ok(params)
    }
}

fn json_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_param(value: &Value) -> ParamValue {
    match value {
        Value::Array(items) => ParamValue::Many(items.iter().map(json_scalar).collect()),
        other => ParamValue::Single(json_scalar(other)),
    }
}

/// Percent-escape `s`, leaving unreserved characters and `safe` untouched.
///
/// Letters, digits and `_.-~` are never escaped. Non-ASCII characters in
/// `safe` are ignored.
pub fn quote(s: &str, safe: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if is_unreserved(b) || (b.is_ascii() && safe.as_bytes().contains(&b)) {
            out.push(char::from(b));
        } else {
            out.push_str(percent_encode_byte(b));
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'~')
}

/// Form-style escaping: nothing beyond unreserved characters is safe and
/// spaces become `+`.
pub fn quote_plus(s: &str) -> String {
    s.split(' ').map(|part| quote(part, "")).collect::<Vec<_>>().join("+")
}

/// Encode `params` as `key=value&key=value`.
///
/// With `doseq` unset every key carries one value (sequences are comma-joined).
/// With `doseq` set a sequence value is repeated once per element, each element
/// escaped with [`STANDARD_SAFE_CHARS`].
pub fn encode_query(params: &Params, doseq: bool, safe: &str) -> String {
    let mut parts = Vec::with_capacity(params.len());
    for (k, v) in params.iter() {
        let key = quote(k, safe);
        match v {
            ParamValue::Many(elements) if doseq => {
                for elt in elements {
                    parts.push(format!("{key}={}", quote(elt, STANDARD_SAFE_CHARS)));
                }
            }
            other => parts.push(format!("{key}={}", quote(&other.joined(), safe))),
        }
    }
    parts.join("&")
}

/// Form-urlencode `params`, the encoding used inside multi sub-requests.
pub fn form_urlencode(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", quote_plus(k), quote_plus(&v.joined())))
        .collect::<Vec<_>>()
        .join("&")
}
