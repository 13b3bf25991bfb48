//! Idempotent state transitions on received records.
//!
//! Exactly one recognized mutation applies per request; anything else is an
//! invalid request that changes nothing. Every transition is a single
//! owner-scoped `UPDATE ... RETURNING`, so applying the same value twice
//! converges on the same row. The fetch-one seen-promotion writes the same
//! fields through the same kind of statement; last-writer-wins between the
//! two is fine because both are driven by the same user session.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::ApiError;
use crate::models::{Category, ReceivedEmail};
use crate::store::RECEIVED_COLUMNS;

/// Raw mutation payload: `{ "action": "...", "value": ... }`.
///
/// The action stays a free string at the HTTP boundary so an unrecognized one
/// becomes an invalid-request condition rather than a body-parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationRequest {
    pub action: String,
    #[serde(default)]
    pub value: Value,
}

/// A validated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivedAction {
    MarkRead(bool),
    Star(bool),
    SetCategory(Category),
}

impl ReceivedAction {
    pub fn parse(request: &MutationRequest) -> Result<Self, ApiError> {
        match request.action.as_str() {
            "markRead" => match request.value.as_bool() {
                Some(value) => Ok(ReceivedAction::MarkRead(value)),
                None => Err(ApiError::BadRequest(
                    "action 'markRead' expects a boolean value".to_string(),
                )),
            },
            "star" => match request.value.as_bool() {
                Some(value) => Ok(ReceivedAction::Star(value)),
                None => Err(ApiError::BadRequest(
                    "action 'star' expects a boolean value".to_string(),
                )),
            },
            "category" => match request.value.as_str().and_then(Category::parse) {
                Some(category) => Ok(ReceivedAction::SetCategory(category)),
                None => Err(ApiError::BadRequest(format!(
                    "action 'category' expects one of inbox, spam, trash, archive; got {}",
                    request.value
                ))),
            },
            other => Err(ApiError::BadRequest(format!("unknown action '{other}'"))),
        }
    }
}

/// Apply one validated mutation to a received record.
///
/// `markRead(true)` stamps `read_at` only on the first transition so repeated
/// calls return the same row; `markRead(false)` keeps `read_at` as history.
pub async fn apply(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
    action: ReceivedAction,
) -> Result<ReceivedEmail, ApiError> {
    let updated = match action {
        ReceivedAction::MarkRead(value) => {
            let query = format!(
                "UPDATE received_emails \
                 SET is_read = $3, \
                     read_at = CASE WHEN $3 THEN COALESCE(read_at, $4) ELSE read_at END \
                 WHERE owner_id = $1 AND id = $2 \
                 RETURNING {RECEIVED_COLUMNS}"
            );

            sqlx::query_as::<_, ReceivedEmail>(&query)
                .bind(owner_id)
                .bind(id)
                .bind(value)
                .bind(Utc::now())
                .fetch_optional(pool)
                .await?
        }
        ReceivedAction::Star(value) => {
            let query = format!(
                "UPDATE received_emails SET is_starred = $3 \
                 WHERE owner_id = $1 AND id = $2 \
                 RETURNING {RECEIVED_COLUMNS}"
            );

            sqlx::query_as::<_, ReceivedEmail>(&query)
                .bind(owner_id)
                .bind(id)
                .bind(value)
                .fetch_optional(pool)
                .await?
        }
        ReceivedAction::SetCategory(category) => {
            let query = format!(
                "UPDATE received_emails SET category = $3 \
                 WHERE owner_id = $1 AND id = $2 \
                 RETURNING {RECEIVED_COLUMNS}"
            );

            sqlx::query_as::<_, ReceivedEmail>(&query)
                .bind(owner_id)
                .bind(id)
                .bind(category.as_str())
                .fetch_optional(pool)
                .await?
        }
    };

    updated.ok_or_else(ApiError::record_not_found)
}
