use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use serde::Serialize;
use std::io::Cursor;

/// Failure taxonomy surfaced by the mailbox API.
///
/// `NotFound` is returned identically whether a record id does not exist or
/// exists under another owner, so responses never leak record existence.
/// Delivery failures are not represented here: a recorded-but-failed reply is
/// a successful bookkeeping operation with a nested failure detail.
#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    MisconfiguredAccount(String),
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                // Storage detail stays in the logs.
                (
                    Status::InternalServerError,
                    "DatabaseError",
                    "internal storage error".to_string(),
                )
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::MisconfiguredAccount(msg) => {
                log::warn!("misconfigured account: {}", msg);
                (Status::UnprocessableEntity, "MisconfiguredAccount", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (
                    Status::InternalServerError,
                    "InternalError",
                    "internal error".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response).unwrap_or_else(|_| {
            r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string()
        });

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl ApiError {
    /// Generic not-found used everywhere a record lookup misses, regardless of
    /// why it missed.
    pub fn record_not_found() -> Self {
        ApiError::NotFound("Record not found".to_string())
    }
}
