// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! A small HTTP client for JSON-RPC calls and metadata document fetches.
//!
//! The client is backed by a [`reqwest::Client`] which keeps connections alive and can be cloned
//! cheaply. Only the response headers named in `header_keys` are copied into the returned
//! [`HttpResponse`].

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use http::StatusCode;
pub use reqwest::Method;
use thiserror::Error;

/// Errors returned by [`HttpClient`].
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The request could not be built, usually a malformed URL.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The connection could not be established or was reset.
    #[error("Connection error: {0}")]
    ConnectError(String),
    /// The request did not complete within its timeout.
    #[error("Request timed out: {0}")]
    TimeoutError(String),
    /// Any other transport or body error.
    #[error("HTTP error: {0}")]
    Error(String),
}

impl HttpClientError {
    /// Returns `true` for failures worth retrying later (timeouts and connection failures).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectError(_) | Self::TimeoutError(_))
    }
}

impl From<reqwest::Error> for HttpClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::TimeoutError(e.to_string())
        } else if e.is_connect() {
            Self::ConnectError(e.to_string())
        } else if e.is_builder() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Error(e.to_string())
        }
    }
}

/// The relevant parts of an HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// The captured subset of response headers, keyed by lowercase name.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns the media type of the response without parameters, lowercased.
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.headers.get("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// Settings applied to every request made by an [`HttpClient`].
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// Headers sent with every request.
    pub default_headers: HashMap<String, String>,
    /// Response headers to capture (case-insensitive).
    pub header_keys: Vec<String>,
    /// Value of the `User-Agent` header.
    pub user_agent: Option<String>,
    /// HTTP(S) proxy all requests are routed through.
    pub proxy_url: Option<String>,
    /// Timeout applied when a request does not specify its own.
    pub timeout: Option<Duration>,
}

/// A cheaply cloneable HTTP client.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    header_keys: Vec<String>,
    default_timeout: Option<Duration>,
}

impl HttpClient {
    /// Creates a new [`HttpClient`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if a default header or the proxy URL is invalid, or the TLS backend
    /// cannot be initialized.
    pub fn new(config: HttpClientConfig) -> Result<Self, HttpClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpClientError::InvalidRequest(format!("header '{name}': {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| HttpClientError::InvalidRequest(format!("header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            header_keys: config
                .header_keys
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect(),
            default_timeout: config.timeout,
        })
    }

    /// Sends a request and collects the full response body.
    ///
    /// Non-success status codes are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, the connection fails, the timeout
    /// elapses, or the body cannot be read.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: Option<HashMap<String, String>>,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpClientError> {
        let mut request = self.client.request(method, url);
        for (name, value) in headers.unwrap_or_default() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        if let Some(timeout) = timeout.or(self.default_timeout) {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let captured = self
            .header_keys
            .iter()
            .filter_map(|key| {
                response
                    .headers()
                    .get(key)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (key.clone(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers: captured,
            body,
        })
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpClientError> {
        self.request(Method::GET, url, None, None, timeout).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn post_json(
        &self,
        url: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpClientError> {
        let headers = HashMap::from([(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]);
        self.request(Method::POST, url, Some(headers), Some(body), timeout)
            .await
    }
}
