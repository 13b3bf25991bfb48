//! Unified mailbox endpoints.
//!
//! Every handler is scoped by the [`Owner`] guard; a record id is never
//! honored without the owner check riding along in the SQL.

use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{get, patch, post, State};
use sqlx::PgPool;
use std::sync::Arc;

use crate::compose::{self, ReplyRequest};
use crate::error::ApiError;
use crate::merge;
use crate::models::{ReceivedEmail, ReplyResponse, UniboxDetail, UniboxPage, UnreadCount};
use crate::mutate::{self, MutationRequest, ReceivedAction};
use crate::owner::Owner;
use crate::routes::params::{RecordKind, UniboxListParams};
use crate::store;
use crate::thread_link;
use crate::transport::MailTransport;

/// One merged, filtered, paginated page spanning both record kinds.
#[get("/unibox?<params..>")]
pub async fn list_unibox(
    owner: Owner,
    pool: &State<PgPool>,
    params: Option<UniboxListParams>,
) -> Result<Json<UniboxPage>, ApiError> {
    let params = params.unwrap_or_default();
    let page = merge::list_unibox(pool.inner(), owner.0, &params).await?;
    Ok(Json(page))
}

/// Number of unread received records for the caller.
#[get("/unibox/unread-count")]
pub async fn get_unread_count(
    owner: Owner,
    pool: &State<PgPool>,
) -> Result<Json<UnreadCount>, ApiError> {
    let count = store::unread_count(pool.inner(), owner.0).await?;
    Ok(Json(UnreadCount { count }))
}

#[derive(Debug, Clone, rocket::form::FromForm)]
pub struct FetchParams {
    #[field(name = "type")]
    pub kind: RecordKind,
}

/// Fetch a single record with cross-references resolved. Fetching a received
/// record also promotes its seen/read state atomically with the read.
#[get("/unibox/<id>?<params..>")]
pub async fn get_record(
    owner: Owner,
    pool: &State<PgPool>,
    id: i64,
    params: FetchParams,
) -> Result<Json<UniboxDetail>, ApiError> {
    match params.kind {
        RecordKind::Sent => {
            let email = store::find_sent_by_id(pool.inner(), owner.0, id)
                .await?
                .ok_or_else(ApiError::record_not_found)?;
            let detail = thread_link::enrich_sent(pool.inner(), email).await?;
            Ok(Json(UniboxDetail::Sent(detail)))
        }
        RecordKind::Received => {
            let email = store::find_received_and_mark_seen(pool.inner(), owner.0, id, Utc::now())
                .await?
                .ok_or_else(ApiError::record_not_found)?;
            let detail = thread_link::enrich_received(pool.inner(), email).await?;
            Ok(Json(UniboxDetail::Received(detail)))
        }
    }
}

/// Apply one state mutation (markRead / star / category) to a received record.
#[patch("/unibox/<id>", data = "<request>")]
pub async fn mutate_record(
    owner: Owner,
    pool: &State<PgPool>,
    id: i64,
    request: Json<MutationRequest>,
) -> Result<Json<ReceivedEmail>, ApiError> {
    let action = ReceivedAction::parse(&request)?;
    let updated = mutate::apply(pool.inner(), owner.0, id, action).await?;
    Ok(Json(updated))
}

/// Compose and send a reply to a received record. A transport failure is
/// still a successful bookkeeping write; see the response's `deliveryError`.
#[post("/unibox/<id>/reply", data = "<request>")]
pub async fn reply_to_record(
    owner: Owner,
    pool: &State<PgPool>,
    transport: &State<Arc<dyn MailTransport>>,
    id: i64,
    request: Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let response = compose::send_reply(
        pool.inner(),
        transport.inner().as_ref(),
        owner.0,
        id,
        request.into_inner(),
    )
    .await?;
    Ok(Json(response))
}
