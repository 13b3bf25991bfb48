//! Thread identity derivation and cross-reference enrichment.
//!
//! A reply chain is linked through provider message identities: the outgoing
//! message answers the original's `message_id`, and joins the original's
//! thread when one exists. A first reply roots a new thread at the original
//! message, so later replies anywhere in the chain converge on the same
//! `thread_id`.

use sqlx::PgPool;

use crate::models::{ReceivedEmail, ReceivedEmailDetail, SentEmail, SentEmailDetail};
use crate::store;

/// Threading headers computed for an outgoing reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyThreading {
    pub in_reply_to: Option<String>,
    pub thread_id: Option<String>,
}

impl ReplyThreading {
    /// Derive headers for a reply to `original`. Caller-supplied overrides win
    /// when present (the dashboard passes them when replying deeper into a
    /// thread than the stored original).
    pub fn for_original(
        original: &ReceivedEmail,
        in_reply_to_override: Option<String>,
        thread_id_override: Option<String>,
    ) -> Self {
        let in_reply_to = in_reply_to_override
            .filter(|value| !value.is_empty())
            .or_else(|| Some(original.message_id.clone()));

        let thread_id = thread_id_override
            .filter(|value| !value.is_empty())
            .or_else(|| original.thread_id.clone())
            .or_else(|| Some(original.message_id.clone()));

        ReplyThreading {
            in_reply_to,
            thread_id,
        }
    }
}

/// Resolve the cross-references of a sent record for its detail view.
/// Lookups are explicit point reads; nothing is persisted back.
pub async fn enrich_sent(pool: &PgPool, email: SentEmail) -> sqlx::Result<SentEmailDetail> {
    let contact = match email.contact_id {
        Some(id) => store::find_contact(pool, email.owner_id, id).await?,
        None => None,
    };
    let campaign = match email.campaign_id {
        Some(id) => store::find_campaign(pool, email.owner_id, id).await?,
        None => None,
    };

    Ok(SentEmailDetail {
        email,
        contact,
        campaign,
    })
}

/// Resolve the cross-references of a received record, including the sent
/// record that answered it.
pub async fn enrich_received(
    pool: &PgPool,
    email: ReceivedEmail,
) -> sqlx::Result<ReceivedEmailDetail> {
    let contact = match email.contact_id {
        Some(id) => store::find_contact(pool, email.owner_id, id).await?,
        None => None,
    };
    let campaign = match email.campaign_id {
        Some(id) => store::find_campaign(pool, email.owner_id, id).await?,
        None => None,
    };
    let replied_with = match email.sent_email_id {
        Some(id) => store::find_sent_by_id(pool, email.owner_id, id).await?,
        None => None,
    };

    Ok(ReceivedEmailDetail {
        email,
        contact,
        campaign,
        replied_with,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::Utc;

    fn original(message_id: &str, thread_id: Option<&str>) -> ReceivedEmail {
        let now = Utc::now();
        ReceivedEmail {
            id: 1,
            owner_id: 1,
            email_account_id: 1,
            contact_id: None,
            campaign_id: None,
            from_address: "them@example.com".to_string(),
            to_address: "me@example.com".to_string(),
            subject: "Re: intro".to_string(),
            content: "body".to_string(),
            html_content: None,
            message_id: message_id.to_string(),
            thread_id: thread_id.map(str::to_string),
            in_reply_to: None,
            category: Category::Inbox,
            is_read: false,
            is_seen: false,
            is_starred: false,
            read_at: None,
            is_replied_to: false,
            sent_email_id: None,
            received_at: now,
            created_at: now,
        }
    }

    #[test]
    fn first_reply_roots_thread_at_original_message() {
        let threading =
            ReplyThreading::for_original(&original("<m1@example.com>", None), None, None);

        assert_eq!(threading.in_reply_to.as_deref(), Some("<m1@example.com>"));
        assert_eq!(threading.thread_id.as_deref(), Some("<m1@example.com>"));
    }

    #[test]
    fn existing_thread_id_propagates() {
        let threading = ReplyThreading::for_original(
            &original("<m2@example.com>", Some("<root@example.com>")),
            None,
            None,
        );

        assert_eq!(threading.in_reply_to.as_deref(), Some("<m2@example.com>"));
        assert_eq!(threading.thread_id.as_deref(), Some("<root@example.com>"));
    }

    #[test]
    fn overrides_win_when_present() {
        let threading = ReplyThreading::for_original(
            &original("<m3@example.com>", Some("<root@example.com>")),
            Some("<deeper@example.com>".to_string()),
            Some("<other-root@example.com>".to_string()),
        );

        assert_eq!(
            threading.in_reply_to.as_deref(),
            Some("<deeper@example.com>")
        );
        assert_eq!(
            threading.thread_id.as_deref(),
            Some("<other-root@example.com>")
        );
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let threading = ReplyThreading::for_original(
            &original("<m4@example.com>", None),
            Some(String::new()),
            Some(String::new()),
        );

        assert_eq!(threading.in_reply_to.as_deref(), Some("<m4@example.com>"));
        assert_eq!(threading.thread_id.as_deref(), Some("<m4@example.com>"));
    }
}
