use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::retry::{with_retry, RetryConfig};
use crate::core::LotusOptions;
use crate::error::{ErrorCode, LotusError, Result};

pub const API_KEY_HEADER: &str = "X-API-KEY";
pub const USER_AGENT: &str = concat!("lotus-rust/", env!("CARGO_PKG_VERSION"));

/// A request to the billing API, described independently of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the host, starting with `/api/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body. `None` fields are expected to be skipped by the
    /// body type's serde attributes.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            LotusError::with_source(
                ErrorCode::EventSerializationFailed,
                "Failed to serialize request body",
                e,
            )
        })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append query parameters taken from the fields of `params`.
    pub fn query<Q: Serialize>(mut self, params: &Q) -> Result<Self> {
        self.query.extend(query_pairs(params)?);
        Ok(self)
    }
}

/// Flattens a serializable struct into query pairs.
///
/// `null` fields are dropped and arrays become repeated keys
/// (`payment_status=unpaid&payment_status=paid`).
pub fn query_pairs<Q: Serialize>(params: &Q) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(params).map_err(|e| {
        LotusError::with_source(
            ErrorCode::EventSerializationFailed,
            "Failed to serialize query parameters",
            e,
        )
    })?;

    let mut pairs = Vec::new();
    if let Value::Object(map) = value {
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(s) = scalar_to_string(&item) {
                            pairs.push((key.clone(), s));
                        }
                    }
                }
                other => {
                    if let Some(s) = scalar_to_string(&other) {
                        pairs.push((key, s));
                    }
                }
            }
        }
    }
    Ok(pairs)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Sends [`ApiRequest`]s to the billing API with authentication, per-attempt
/// timeout and the retry policy applied.
pub struct HttpClient {
    client: Client,
    host: String,
    api_key: String,
    timeout: Option<Duration>,
    retry: RetryConfig,
}

impl HttpClient {
    pub fn new(options: &LotusOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                LotusError::with_source(ErrorCode::NetworkError, "Failed to create HTTP client", e)
            })?;

        Ok(Self {
            client,
            host: options.host.clone(),
            api_key: options.api_key.clone(),
            timeout: options.timeout,
            retry: options.retry_policy(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// Executes `request`, retrying transient failures, and decodes the body.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let body = self.execute_raw(request).await?;
        decode_body(&body)
    }

    /// Executes `request` and returns the raw body of the 2xx response.
    pub async fn execute_raw(&self, request: &ApiRequest) -> Result<String> {
        with_retry(|| self.send_once(request), &self.retry).await
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<String> {
        let url = self.url(&request.path);
        tracing::debug!(method = %request.method, %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(API_KEY_HEADER, &self.api_key);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.convert_error(e))?;
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if status.is_success() {
            response.text().await.map_err(|e| self.convert_error(e))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(LotusError::from_status(status.as_u16(), &body))
        }
    }

    fn convert_error(&self, error: reqwest::Error) -> LotusError {
        if error.is_timeout() {
            LotusError::with_source(ErrorCode::NetworkTimeout, "Request timed out", error)
        } else if error.is_connect() {
            LotusError::with_source(ErrorCode::NetworkError, "Connection failed", error)
        } else {
            LotusError::with_source(ErrorCode::NetworkError, error.to_string(), error)
        }
    }
}

/// Decodes a 2xx body. An empty body decodes as `null`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };

    serde_json::from_str(body).map_err(|e| {
        LotusError::with_source(
            ErrorCode::HttpInvalidResponse,
            format!("Failed to parse response: {}", e),
            e,
        )
    })
}
