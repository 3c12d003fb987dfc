//! HTTP transport for the query layer
//!
//! Services never talk to `reqwest` directly: they receive an
//! `Arc<dyn ApiTransport>` so tests can substitute an in-memory fake.

use crate::{error::AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
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

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// A single call against the backend API, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Anything that can execute an `ApiRequest` and hand back its JSON body.
///
/// Empty bodies (204, or a 200 with no content) come back as `Value::Null`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    service_name: String,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(base_url: String, service_name: String, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_name,
            timeout: Duration::from_secs(timeout_seconds),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handle HTTP response and decode the JSON body
    async fn handle_response(&self, response: Response) -> Result<Value> {
        let status = response.status();

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| self.map_reqwest_error(e))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| {
                AppError::serialization(format!(
                    "{}: failed to decode response body: {}",
                    self.service_name, e
                ))
            })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            let message = if error_text.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{} - {}", reason, error_text)
            };

            if status.as_u16() == 404 {
                Err(AppError::not_found(message))
            } else {
                Err(AppError::server_side(status.as_u16(), message))
            }
        }
    }

    /// Map reqwest errors to AppError
    fn map_reqwest_error(&self, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::timeout(format!("Request to {} timed out", self.service_name))
        } else if error.is_connect() {
            AppError::client_side(format!("{} is unreachable: {}", self.service_name, error))
        } else {
            AppError::client_side(error.to_string())
        }
    }
}

#[async_trait]
impl ApiTransport for ServiceClient {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let url = format!("{}{}", self.base_url, request.endpoint);
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(
            "➡️ {} {} ({} params, request_id={})",
            request.method,
            url,
            request.params.len(),
            request_id
        );

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .header("X-Request-Id", &request_id);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let result = self.handle_response(response).await;

        if let Err(e) = &result {
            warn!("⚠️ {} {} failed: {}", request.method, url, e);
        }
        result
    }
}
