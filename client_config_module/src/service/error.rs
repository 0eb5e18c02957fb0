use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::config_store::ConfigStoreError;
use crate::mapping_store::MappingStoreError;
use mailbox_module::MailboxError;

/// An API failure, rendered as `{"error": {"code", "message", "details"?}}`.
///
/// Handlers return `Result<_, ApiError>`; store and upstream errors convert
/// via `From` so `?` keeps working end to end.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            code: "EXTERNAL_SERVICE_ERROR",
            message: message.into(),
            details: None,
        }
    }

    /// The underlying cause is logged here and never sent to the caller.
    pub fn internal(source: impl std::fmt::Display) -> Self {
        error!("internal error: {}", source);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: "internal error".to_string(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<ConfigStoreError> for ApiError {
    fn from(err: ConfigStoreError) -> Self {
        match err {
            ConfigStoreError::NotOwner => {
                ApiError::forbidden("client is owned by a different user")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<MappingStoreError> for ApiError {
    fn from(err: MappingStoreError) -> Self {
        match err {
            MappingStoreError::NotOwner => {
                ApiError::forbidden("client is owned by a different user")
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::UnsupportedProvider(provider) => ApiError::validation(
                format!("provisioning for provider \"{provider}\" is not yet supported"),
                None,
            ),
            other => ApiError::bad_gateway(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn renders_the_error_envelope() {
        let response = ApiError::validation(
            "config validation failed",
            Some(json!([{"field": "client.name", "message": "must be a non-empty string"}])),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "config validation failed");
        assert_eq!(body["error"]["details"][0]["field"], "client.name");
    }

    #[tokio::test]
    async fn omits_details_when_there_are_none() {
        let response = ApiError::not_found("no mapping stored for client").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn store_ownership_failures_map_to_forbidden() {
        let err: ApiError = ConfigStoreError::NotOwner.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.code, "FORBIDDEN");
    }

    #[tokio::test]
    async fn internal_errors_hide_the_cause() {
        let err: ApiError = ConfigStoreError::Config("pool dropped".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
    }
}
