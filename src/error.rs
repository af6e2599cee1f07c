use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Request-scoped failure, converted to a JSON `{"error": ...}` body at the
/// handler boundary. Nothing below the handlers panics on bad input.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Missing or malformed request parameter, or a disallowed URL scheme.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// The page URL points at an explicitly blocked source domain.
    pub fn unsupported_source(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// The extractor could not resolve the page.
    pub fn extraction_failure(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// The media origin was unreachable, timed out, or answered non-2xx.
    pub fn fetch_failure(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ApiError::invalid_input("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::unsupported_source("x").status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::extraction_failure("x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::fetch_failure("x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
