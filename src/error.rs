use axum::extract::rejection::JsonRejection;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error as ThisError;

use crate::domain::validation::ValidationErrors;

#[derive(Debug, ThisError)]
pub enum CredtrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid API token")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Job already running (lock held at {})", .0.display())]
    JobLocked(PathBuf),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<figment::Error> for CredtrackError {
    fn from(e: figment::Error) -> Self {
        CredtrackError::Config(Box::new(e))
    }
}

impl From<ValidationErrors> for CredtrackError {
    fn from(e: ValidationErrors) -> Self {
        CredtrackError::Validation(e)
    }
}

/// Type errors inside an otherwise well-formed body are reported against the
/// offending field; unreadable bodies are a plain 400.
impl From<JsonRejection> for CredtrackError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                let (field, message) = rejected_field(&e.body_text());
                ValidationErrors::single(&field, message).into()
            }
            other => CredtrackError::BadRequest(other.body_text()),
        }
    }
}

/// Split axum's `"...target type: <path>: <serde message> at line L column C"`
/// into the field path and the serde message.
fn rejected_field(body_text: &str) -> (String, String) {
    let detail = body_text
        .split_once("target type: ")
        .map_or(body_text, |(_, rest)| rest);
    let detail = detail
        .rsplit_once(" at line ")
        .map_or(detail, |(message, _)| message);
    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(' ') => {
            (path.to_string(), message.to_string())
        }
        _ => ("body".to_string(), detail.to_string()),
    }
}

impl CredtrackError {
    pub fn not_found(resource: &'static str, id: i64) -> Self {
        CredtrackError::NotFound { resource, id }
    }

    pub fn forbidden(ability: impl Into<String>) -> Self {
        CredtrackError::Forbidden(ability.into())
    }
}

impl IntoResponse for CredtrackError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body, fields) = match self {
            CredtrackError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorBody {
                    code: "VALIDATION_FAILED".to_string(),
                    message: "The given data was invalid.".to_string(),
                },
                Some(errors.into_fields()),
            ),
            CredtrackError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication required.".to_string(),
                },
                None,
            ),
            CredtrackError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                ApiErrorBody {
                    code: "FORBIDDEN".to_string(),
                    message: "This action is unauthorized.".to_string(),
                },
                None,
            ),
            CredtrackError::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{resource} {id} not found."),
                },
                None,
            ),
            CredtrackError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message,
                },
                None,
            ),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody {
                        code: "INTERNAL_ERROR".to_string(),
                        message: "An internal server error occurred.".to_string(),
                    },
                    None,
                )
            }
        };
        (
            status,
            Json(ApiErrorResponse {
                error: error_body,
                fields,
            }),
        )
            .into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_field_extracts_path_and_message() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    concession: input contains invalid characters at line 1 column 45";
        assert_eq!(
            rejected_field(text),
            ("concession".to_string(), "input contains invalid characters".to_string())
        );
    }

    #[test]
    fn rejected_field_falls_back_to_body() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    invalid type: integer `5`, expected a map at line 1 column 1";
        let (field, message) = rejected_field(text);
        assert_eq!(field, "body");
        assert_eq!(message, "invalid type: integer `5`, expected a map");
    }

    #[test]
    fn internal_json_errors_are_server_errors() {
        let err: CredtrackError = serde_json::from_str::<i64>("nope").unwrap_err().into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
