//! Typed calls on top of the injected transport
//!
//! Decodes JSON bodies into DTOs and, when enabled, checks them against the
//! `validator` rules declared on the DTO.

use crate::http_params::HttpParams;
use crate::observability::metrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shared::{ApiRequest, ApiTransport, AppError, PagedResult, Result};
use std::sync::Arc;

/// Shape check run on decoded response bodies.
///
/// DTOs with `#[derive(Validate)]` opt in through `validated_by_derive!`;
/// plain values accept anything.
pub trait ValidatedResponse {
    fn validate_response(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl ValidatedResponse for () {}
impl ValidatedResponse for bool {}
impl ValidatedResponse for i32 {}
impl ValidatedResponse for i64 {}
impl ValidatedResponse for String {}
impl ValidatedResponse for Value {}
impl ValidatedResponse for shared::HealthStatus {}

impl<T: ValidatedResponse> ValidatedResponse for Option<T> {
    fn validate_response(&self) -> std::result::Result<(), String> {
        match self {
            Some(inner) => inner.validate_response(),
            None => Ok(()),
        }
    }
}

impl<T: ValidatedResponse> ValidatedResponse for Vec<T> {
    fn validate_response(&self) -> std::result::Result<(), String> {
        self.iter()
            .enumerate()
            .try_for_each(|(i, item)| item.validate_response().map_err(|e| format!("[{}] {}", i, e)))
    }
}

impl<T: ValidatedResponse> ValidatedResponse for PagedResult<T> {
    fn validate_response(&self) -> std::result::Result<(), String> {
        if self.page < 1 || self.page_size < 1 {
            return Err(format!("invalid paging: page={}, pageSize={}", self.page, self.page_size));
        }
        self.items.validate_response().map_err(|e| format!("items{}", e))
    }
}

/// Implement `ValidatedResponse` through the type's `validator::Validate` derive.
#[macro_export]
macro_rules! validated_by_derive {
    ($($name:ty),+ $(,)?) => {
        $(
            impl $crate::api_client::ValidatedResponse for $name {
                fn validate_response(&self) -> std::result::Result<(), String> {
                    validator::Validate::validate(self).map_err(|e| e.to_string())
                }
            }
        )+
    };
}

/// Attach `body` as JSON. Bodies that serialize to null (e.g. `()`) are left off.
fn with_json<B: Serialize + ?Sized>(request: ApiRequest, body: &B) -> Result<ApiRequest> {
    match serde_json::to_value(body)? {
        Value::Null => Ok(request),
        value => Ok(request.with_body(value)),
    }
}

/// Reject a request body before it goes out.
pub fn validate_request<T: validator::Validate>(request: &T) -> Result<()> {
    request
        .validate()
        .map_err(|e| AppError::validation(format!("invalid request: {}", e)))
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    validate_responses: bool,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn ApiTransport>, validate_responses: bool) -> Self {
        Self {
            transport,
            validate_responses,
        }
    }

    pub fn validates_responses(&self) -> bool {
        self.validate_responses
    }

    pub async fn get<T>(&self, endpoint: &str, params: HttpParams) -> Result<T>
    where
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(ApiRequest::get(endpoint).with_params(params.into_pairs()))
            .await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(with_json(ApiRequest::post(endpoint), body)?).await
    }

    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(with_json(ApiRequest::put(endpoint), body)?).await
    }

    pub async fn patch<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(with_json(ApiRequest::patch(endpoint), body)?).await
    }

    pub async fn delete<T>(&self, endpoint: &str) -> Result<T>
    where
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(ApiRequest::delete(endpoint)).await
    }

    pub async fn delete_with_body<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + ValidatedResponse,
    {
        self.execute(with_json(ApiRequest::delete(endpoint), body)?).await
    }

    async fn execute<T>(&self, request: ApiRequest) -> Result<T>
    where
        T: DeserializeOwned + ValidatedResponse,
    {
        let endpoint = request.endpoint.clone();
        let method = request.method.as_str();
        let body = match self.transport.send(request).await {
            Ok(body) => {
                metrics::record_http_request(method, "success");
                body
            }
            Err(e) => {
                let status = e
                    .status()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| e.error_code().to_string());
                metrics::record_http_request(method, &status);
                return Err(e);
            }
        };
        self.decode(&endpoint, body)
    }

    fn decode<T>(&self, endpoint: &str, body: Value) -> Result<T>
    where
        T: DeserializeOwned + ValidatedResponse,
    {
        let data: T = serde_json::from_value(body).map_err(|e| {
            if self.validate_responses {
                AppError::validation(format!("{}: {}", endpoint, e))
            } else {
                AppError::serialization(format!("{}: {}", endpoint, e))
            }
        })?;

        if self.validate_responses {
            data.validate_response()
                .map_err(|e| AppError::validation(format!("{}: {}", endpoint, e)))?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use validator::Validate;

    struct StaticTransport(Value);

    #[async_trait]
    impl ApiTransport for StaticTransport {
        async fn send(&self, _request: ApiRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Account {
        #[validate(email)]
        email: String,
    }

    validated_by_derive!(Account);

    fn client(body: Value, validate: bool) -> ApiClient {
        ApiClient::new(Arc::new(StaticTransport(body)), validate)
    }

    #[tokio::test]
    async fn test_invalid_body_fails_validation_when_enabled() {
        let err = client(json!({ "email": "not-an-email" }), true)
            .get::<Account>("/users/me", HttpParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(err.to_string().contains("validation failed"));
    }

    #[tokio::test]
    async fn test_invalid_body_passes_when_disabled() {
        let account = client(json!({ "email": "not-an-email" }), false)
            .get::<Account>("/users/me", HttpParams::new())
            .await
            .unwrap();
        assert_eq!(account.email, "not-an-email");
    }

    #[tokio::test]
    async fn test_shape_mismatch() {
        let strict = client(json!({ "mail": 1 }), true)
            .get::<Account>("/users/me", HttpParams::new())
            .await
            .unwrap_err();
        assert!(matches!(strict, AppError::Validation { .. }));

        let lax = client(json!({ "mail": 1 }), false)
            .get::<Account>("/users/me", HttpParams::new())
            .await
            .unwrap_err();
        assert!(matches!(lax, AppError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_empty_body_decodes_to_unit() {
        client(Value::Null, true)
            .delete::<()>("/logs/1")
            .await
            .unwrap();
    }

    #[test]
    fn test_paged_result_validation_reports_item_index() {
        let page = PagedResult {
            items: vec![
                Account { email: "a@b.io".to_string() },
                Account { email: "nope".to_string() },
            ],
            total_count: 2,
            page: 1,
            page_size: 10,
        };
        let err = page.validate_response().unwrap_err();
        assert!(err.starts_with("items[1]"));
    }
}
