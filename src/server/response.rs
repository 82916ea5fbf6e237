use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, ErrorKind};

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

/// Internal errors keep their detail in the log and send a generic message.
impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => {
                tracing::error!("Request failed: {err}");
                return Self::internal("Internal server error");
            }
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        let mut response = (self.status, Json(body)).into_response();

        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer realm=\"cairn\""),
            );
        }

        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(ApiError::from(Error::not_found("x")).status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(Error::invalid("x")).status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Error::conflict("x")).status, StatusCode::CONFLICT);
        assert_eq!(ApiError::from(Error::forbidden("x")).status, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(Error::Unauthorized).status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_upstream_failures_keep_their_message() {
        let err = ApiError::from(Error::upstream(
            "upstream registry request failed for registry.example.com/acme/widget 1.0.0",
        ));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("registry.example.com/acme/widget"));
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = ApiError::from(Error::internal("group row g-1 vanished"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");

        let err = ApiError::from(Error::from(rusqlite::Error::QueryReturnedNoRows));
        assert_eq!(err.message, "Internal server error");
    }
}
