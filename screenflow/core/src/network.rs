//! Network Client
//!
//! `apiCall` actions go through the [`NetworkClient`] trait so the engine
//! never depends on a particular HTTP stack or backend. [`HttpNetworkClient`]
//! is the default implementation on top of reqwest.
//!
//! A client answers with an [`ApiResponse`] for anything the server replied
//! to, whatever the status. Only transport failures (DNS, refused connection,
//! timeout) are errors. The interpreter decides what counts as success.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::config::NetworkSettings;
use crate::error::{EngineError, EngineResult};

/// HTTP method of an `apiCall`
///
/// Flow documents may spell it in any case (`"post"`, `"POST"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unsupported HTTP method `{other}`")),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A fully resolved request
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL or path relative to the client's base URL
    pub endpoint: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request without headers or body
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// What the server replied
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body; non-JSON bodies arrive as a string, empty bodies as null
    pub body: Value,
}

impl ApiResponse {
    /// Create a response
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert into the action outcome: the body on 2xx, `Api` otherwise
    ///
    /// # Errors
    ///
    /// `EngineError::Api` for non-2xx statuses.
    pub fn into_result(self) -> EngineResult<Value> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(EngineError::Api {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Transport used by `apiCall` actions
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Client name for logs
    fn name(&self) -> &str;

    /// Perform one request
    ///
    /// Returns `Err` only for transport failures.
    async fn request(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// reqwest-backed client
#[derive(Clone, Debug)]
pub struct HttpNetworkClient {
    base_url: Option<String>,
    default_headers: BTreeMap<String, String>,
    http_client: reqwest::Client,
}

impl HttpNetworkClient {
    /// Create a client with a request timeout
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(base_url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            default_headers: BTreeMap::new(),
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Create a client from the `[network]` settings
    ///
    /// # Errors
    ///
    /// Same as [`HttpNetworkClient::new`].
    pub fn from_settings(settings: &NetworkSettings) -> anyhow::Result<Self> {
        let mut client = Self::new(settings.base_url.clone(), settings.timeout())?;
        client.default_headers = settings.default_headers.clone();
        Ok(client)
    }

    /// Absolute URL for `endpoint`
    #[must_use]
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{}/{}", base, endpoint.trim_start_matches('/')),
            None => endpoint.to_string(),
        }
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn request(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse> {
        let url = self.url_for(&request.endpoint);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())?;

        let mut builder = self.http_client.request(method, &url);
        for (name, value) in self.default_headers.iter().chain(request.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %url, "Sending API request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        tracing::debug!(status, url = %url, "API response received");
        Ok(ApiResponse { status, body })
    }
}
