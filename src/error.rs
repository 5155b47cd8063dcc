//! Domain errors and their HTTP mapping.
//!
//! Every fallible core operation returns [`Error`]. The actix integration
//! maps validation to 400, auth to 401 and everything else to 500 with a
//! generic body; internals never leak to the client.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Request failed field validation; carries one message per failed field.
    #[error("validation failed")]
    Validation(Vec<String>),

    /// Bearer check failed; the message is safe to return verbatim.
    #[error("{0}")]
    Auth(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("merge error: {0}")]
    Merge(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable wire code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Auth(_) => "AUTH_ERROR",
            Error::Cache(_) => "CACHE_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Render(_) => "RENDER_ERROR",
            Error::Merge(_) => "MERGE_ERROR",
            Error::Internal(_) => "ERROR",
        }
    }

    pub fn render(err: impl std::fmt::Display) -> Self {
        Error::Render(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    pub fn cache(err: impl std::fmt::Display) -> Self {
        Error::Cache(err.to_string())
    }

    pub fn merge(err: impl std::fmt::Display) -> Self {
        Error::Merge(err.to_string())
    }
}

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Error::Validation(errors) => HttpResponse::BadRequest().json(json!({
                "message": "Validation failed",
                "errors": errors,
            })),
            Error::Auth(message) => HttpResponse::Unauthorized().json(json!({
                "message": message,
            })),
            other => {
                log::error!("request failed with {}: {}", other.code(), other);
                HttpResponse::InternalServerError().json(json!({
                    "message": "There was an error processing your request",
                }))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Validation(vec![]).code(), "VALIDATION_ERROR");
        assert_eq!(Error::Auth("no".into()).code(), "AUTH_ERROR");
        assert_eq!(Error::Cache("x".into()).code(), "CACHE_ERROR");
        assert_eq!(Error::Storage("x".into()).code(), "STORAGE_ERROR");
        assert_eq!(Error::Render("x".into()).code(), "RENDER_ERROR");
        assert_eq!(Error::Merge("x".into()).code(), "MERGE_ERROR");
        assert_eq!(Error::Internal("x".into()).code(), "ERROR");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(Error::Validation(vec![]).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Auth("no".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::Render("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
