use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            400 | 409 | 422 => ErrorCode::Validation,
            429 => ErrorCode::RateLimited,
            _ => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// Error body shape used by the backend (`{"detail": ...}`). `detail` is a
/// string for handled errors and a list of field errors for request
/// validation failures.
#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: serde_json::Value,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_response(status: u16, body: &str) -> Self {
        let code = ErrorCode::from_status(status);
        let message = match serde_json::from_str::<DetailBody>(body) {
            Ok(DetailBody {
                detail: serde_json::Value::String(detail),
            }) => detail,
            Ok(DetailBody { detail }) => detail.to_string(),
            Err(_) if body.trim().is_empty() => format!("http status {status}"),
            Err(_) => body.trim().to_string(),
        };
        Self { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_not_found_detail_body() {
        let err = ApiError::from_response(404, r#"{"detail":"Zone not found"}"#);
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Zone not found");
    }

    #[test]
    fn keeps_structured_validation_detail_as_json() {
        let err = ApiError::from_response(
            422,
            r#"{"detail":[{"loc":["query","seconds"],"msg":"field required"}]}"#,
        );
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("field required"));
    }

    #[test]
    fn falls_back_to_raw_body_or_status() {
        assert_eq!(
            ApiError::from_response(502, "bad gateway").message,
            "bad gateway"
        );
        assert_eq!(
            ApiError::from_response(500, "").message,
            "http status 500"
        );
        assert_eq!(ErrorCode::from_status(500), ErrorCode::Internal);
    }
}
