//! DomainError -> HTTP response.

use crate::domain::DomainError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
            DomainError::Forbidden { .. } => StatusCode::FORBIDDEN,
            DomainError::InvalidTransition(_) | DomainError::FeatureDisabled(_) => StatusCode::CONFLICT,
            DomainError::Sms(_)
            | DomainError::Mail(_)
            | DomainError::Shortener(_)
            | DomainError::Map(_) => StatusCode::BAD_GATEWAY,
            DomainError::Repo(_) | DomainError::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            DomainError::Validation(errors) => json!({ "errors": errors }),
            other => {
                if status.is_server_error() {
                    error!(error = %other, "request failed");
                }
                json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DomainError::invalid("name", "can't be blank"), 422),
            (DomainError::not_found("incident", "25-001"), 404),
            (
                DomainError::Forbidden {
                    action: "create".into(),
                    subject: "incident".into(),
                },
                403,
            ),
            (DomainError::InvalidTransition("x".into()), 409),
            (DomainError::FeatureDisabled("messaging"), 409),
            (DomainError::Sms("timeout".into()), 502),
            (DomainError::Repo("locked".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status().as_u16(), expected);
        }
    }
}
