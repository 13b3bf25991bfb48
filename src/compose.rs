//! Reply composition.
//!
//! Turns a reply request into a persisted sent record plus reply bookkeeping
//! on the original received record. The attempt is always durably recorded:
//! transport success yields a `sent` row, transport failure a `failed` row
//! with the error attached, and only then is the outcome surfaced. The
//! `is_replied_to` flag on the original is best-effort denormalized state;
//! the answering sent record itself is the source of truth, so a failure to
//! set the flag is logged and never unwinds the send.

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;

use crate::error::ApiError;
use crate::models::{ReplyResponse, SentStatus};
use crate::store::{self, NewSentEmail};
use crate::thread_link::ReplyThreading;
use crate::transport::{generate_message_id, MailTransport, OutgoingMessage};

/// Reply payload. Required fields stay optional at the serde layer so their
/// absence surfaces as an invalid-request condition instead of a body-parse
/// failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl ReplyRequest {
    fn required(field: &Option<String>, name: &str) -> Result<String, ApiError> {
        field
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest(format!("'{name}' is required")))
    }

    fn validated(&self) -> Result<(String, String, String), ApiError> {
        let to = Self::required(&self.to, "to")?;
        let subject = Self::required(&self.subject, "subject")?;
        let content = Self::required(&self.content, "content")?;
        Ok((to, subject, content))
    }
}

/// References header for an outgoing reply: thread root first, then the
/// message being answered, collapsing duplicates.
fn references_header(threading: &ReplyThreading) -> Option<String> {
    match (&threading.thread_id, &threading.in_reply_to) {
        (Some(thread), Some(reply)) if thread != reply => Some(format!("{thread} {reply}")),
        (_, Some(reply)) => Some(reply.clone()),
        (Some(thread), None) => Some(thread.clone()),
        (None, None) => None,
    }
}

/// Compose and deliver a reply to a received record.
pub async fn send_reply(
    pool: &PgPool,
    transport: &dyn MailTransport,
    owner_id: i64,
    original_id: i64,
    request: ReplyRequest,
) -> Result<ReplyResponse, ApiError> {
    let (to, subject, content) = request.validated()?;

    let original = store::find_received_by_id(pool, owner_id, original_id)
        .await?
        .ok_or_else(ApiError::record_not_found)?;

    let account = store::find_account(pool, owner_id, original.email_account_id)
        .await?
        .ok_or_else(ApiError::record_not_found)?;

    if !account.has_transport_credentials() {
        return Err(ApiError::MisconfiguredAccount(format!(
            "account '{}' has no SMTP credentials configured",
            account.email
        )));
    }

    let threading = ReplyThreading::for_original(
        &original,
        request.in_reply_to.clone(),
        request.thread_id.clone(),
    );

    let outgoing = OutgoingMessage {
        from: account.email.clone(),
        to: to.clone(),
        subject: subject.clone(),
        content: content.clone(),
        html_content: None,
        message_id: generate_message_id(&account.email),
        in_reply_to: threading.in_reply_to.clone(),
        references: references_header(&threading),
    };

    log::info!(
        "reply attempt: owner={} original={} via account={}",
        owner_id,
        original.id,
        account.email
    );

    let mut record = NewSentEmail {
        owner_id,
        campaign_id: original.campaign_id,
        email_account_id: account.id,
        contact_id: original.contact_id,
        from_address: account.email.clone(),
        to_address: to,
        subject,
        content,
        html_content: None,
        message_id: None,
        thread_id: threading.thread_id.clone(),
        in_reply_to: threading.in_reply_to.clone(),
        status: SentStatus::Sent,
        error: None,
        sent_at: Utc::now(),
    };

    match transport.send(&account, &outgoing).await {
        Ok(provider_message_id) => {
            record.message_id = Some(provider_message_id);
            let sent = store::insert_sent(pool, &record).await?;

            match store::mark_replied(pool, owner_id, original.id, sent.id).await {
                Ok(Some(_)) => {}
                Ok(None) => log::warn!(
                    "original record {} vanished before reply flag was set",
                    original.id
                ),
                Err(e) => log::warn!(
                    "failed to flag record {} as replied: {}",
                    original.id,
                    e
                ),
            }

            log::info!(
                "reply sent: owner={} sent_email={} thread={:?}",
                owner_id,
                sent.id,
                sent.thread_id
            );

            Ok(ReplyResponse {
                data: sent,
                delivery_error: None,
            })
        }
        Err(transport_error) => {
            let detail = transport_error.to_string();
            log::warn!(
                "reply delivery failed: owner={} original={} error={}",
                owner_id,
                original.id,
                detail
            );

            record.status = SentStatus::Failed;
            record.error = Some(detail.clone());
            let failed = store::insert_sent(pool, &record).await?;

            Ok(ReplyResponse {
                data: failed,
                delivery_error: Some(detail),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> ReplyRequest {
        ReplyRequest {
            to: Some("them@example.com".to_string()),
            subject: Some("Re: intro".to_string()),
            content: Some("sounds good".to_string()),
            in_reply_to: None,
            thread_id: None,
        }
    }

    #[test]
    fn validation_accepts_complete_requests() {
        let (to, subject, content) = full_request().validated().unwrap();
        assert_eq!(to, "them@example.com");
        assert_eq!(subject, "Re: intro");
        assert_eq!(content, "sounds good");
    }

    #[test]
    fn validation_rejects_missing_or_blank_fields() {
        for field in ["to", "subject", "content"] {
            let mut request = full_request();
            match field {
                "to" => request.to = None,
                "subject" => request.subject = Some("   ".to_string()),
                _ => request.content = Some(String::new()),
            }
            let err = request.validated().unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "field {field}");
        }
    }

    #[test]
    fn references_chain_root_then_parent() {
        let threading = ReplyThreading {
            in_reply_to: Some("<m2@example.com>".to_string()),
            thread_id: Some("<root@example.com>".to_string()),
        };
        assert_eq!(
            references_header(&threading).as_deref(),
            Some("<root@example.com> <m2@example.com>")
        );
    }

    #[test]
    fn references_collapse_when_reply_roots_the_thread() {
        let threading = ReplyThreading {
            in_reply_to: Some("<m1@example.com>".to_string()),
            thread_id: Some("<m1@example.com>".to_string()),
        };
        assert_eq!(
            references_header(&threading).as_deref(),
            Some("<m1@example.com>")
        );
    }
}
