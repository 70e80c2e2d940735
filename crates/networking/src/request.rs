//! Request and response types
//!
//! A [`RequestContext`] is created per logical call and mutated in place
//! across retries: the pipeline rewrites its headers before each attempt and
//! bumps its retry counter after each retryable failure.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

use crate::error::ApiError;

/// HTTP method for backend requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// PATCH request
    Patch,
    /// DELETE request
    Delete,
}

impl HttpMethod {
    /// Method name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single logical request and its retry state
///
/// Header names are stored lowercased, so lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: HttpMethod,
    url: String,
    params: Vec<(String, String)>,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
    retry_count: u32,
}

impl RequestContext {
    /// Create a request; `url` is a path relative to the base URL or an absolute URL
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: HashMap::new(),
            body: None,
            retry_count: 0,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Create a PUT request
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    /// Create a PATCH request
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    /// Create a DELETE request
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the raw request body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the request body from JSON
    pub fn json_body<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(value)?);
        Ok(self)
    }

    /// HTTP method
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Target URL as given
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path portion of the target URL, without query or fragment
    pub fn path(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(url) => url.path().to_string(),
            Err(_) => self.url.split(['?', '#']).next().unwrap_or_default().to_string(),
        }
    }

    /// Query parameters
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Headers to send
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Insert or replace a header
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Remove a header
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Request body
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Number of retries already performed for this request
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub(crate) fn record_retry(&mut self) {
        self.retry_count += 1;
    }
}

/// Raw response returned to the caller
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lowercased names)
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Create a new response
    pub fn new(status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the status is a redirect that was not followed
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Body as UTF-8 text, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
