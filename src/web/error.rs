//! API error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::github::ProjectError;
use crate::mail::MailError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} required")]
    MethodNotAllowed(&'static str),
    #[error("Invalid JSON body")]
    InvalidJson(String),
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("{0}")]
    Invalid(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Missing server configuration")]
    NotConfigured(&'static str),
    #[error("Lead store error")]
    Store(#[from] StoreError),
    #[error("Project update failed")]
    Project(#[from] ProjectError),
    #[error("Email API error")]
    Mail(#[from] MailError),
    /// Email failure reported as a gateway error regardless of upstream status
    #[error("Email API error")]
    Gateway(MailError),
    #[error("Unhandled error")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::InvalidJson(_) | ApiError::MissingFields(_) | ApiError::Invalid(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotConfigured(_) | ApiError::Store(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Project(ProjectError::Upstream { status, .. }) => upstream_status(*status),
            ApiError::Project(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Mail(MailError::Rejected { status, .. }) => upstream_status(*status),
            ApiError::Mail(_) | ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> ErrorBody {
        let (status, details) = match self {
            ApiError::InvalidJson(detail) | ApiError::Internal(detail) => (None, Some(detail.clone())),
            ApiError::NotConfigured(what) => (None, Some(what.to_string())),
            ApiError::Store(StoreError::Upstream { status, body }) => (Some(*status), Some(body.clone())),
            ApiError::Store(e) => (None, Some(e.to_string())),
            ApiError::Project(ProjectError::Upstream { status, body, .. }) => {
                (Some(*status), Some(body.clone()))
            }
            ApiError::Project(e) => (None, Some(e.to_string())),
            ApiError::Mail(MailError::Rejected { status, body })
            | ApiError::Gateway(MailError::Rejected { status, body }) => (Some(*status), Some(body.clone())),
            ApiError::Mail(e) | ApiError::Gateway(e) => (None, Some(e.to_string())),
            _ => (None, None),
        };
        let error = match self {
            ApiError::Project(ProjectError::Upstream { action, .. }) => format!("Failed to {}", action),
            other => other.to_string(),
        };
        ErrorBody { error, status, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(status = code.as_u16(), error = ?self, "Request failed");
        } else {
            tracing::debug!(status = code.as_u16(), error = %self, "Request rejected");
        }
        (code, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_named() {
        let err = ApiError::MissingFields(vec!["fullName", "email"]);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body().error, "Missing required fields: fullName, email");
    }

    #[test]
    fn store_failures_keep_upstream_details() {
        let err = ApiError::from(StoreError::Upstream {
            status: 500,
            body: "malformed payload".into(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert_eq!(body.status, Some(500));
        assert_eq!(body.details.as_deref(), Some("malformed payload"));

        let timeout = ApiError::from(StoreError::Timeout);
        assert_eq!(timeout.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn project_upstream_status_passes_through() {
        let err = ApiError::from(ProjectError::Upstream {
            action: "read file",
            status: 404,
            body: "Not Found".into(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.body().error, "Failed to read file");
    }

    #[test]
    fn gateway_hides_upstream_status() {
        let rejected = || MailError::Rejected {
            status: 422,
            body: "invalid from".into(),
        };
        assert_eq!(ApiError::from(rejected()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let err = ApiError::Gateway(rejected());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.body().status, Some(422));
    }
}
