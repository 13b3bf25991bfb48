//! Persistence layer for the two mailbox collections.
//!
//! Every query is scoped by owner id, counts are computed separately from
//! pages (a page's length says nothing about the filtered total), and the one
//! operation with read-modify-write semantics (`find_received_and_mark_seen`)
//! is a single atomic `UPDATE ... RETURNING`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    Campaign, Category, Contact, EmailAccount, ReceivedEmail, SentEmail, SentStatus,
};

pub(crate) const SENT_COLUMNS: &str = "id, owner_id, campaign_id, email_account_id, contact_id, \
     from_address, to_address, subject, content, html_content, message_id, thread_id, \
     in_reply_to, status, error, opened, opened_at, clicked, clicked_at, ai_generated, \
     sent_at, created_at";

pub(crate) const RECEIVED_COLUMNS: &str = "id, owner_id, email_account_id, contact_id, campaign_id, \
     from_address, to_address, subject, content, html_content, message_id, thread_id, \
     in_reply_to, category, is_read, is_seen, is_starred, read_at, is_replied_to, \
     sent_email_id, received_at, created_at";

/// Filter over the sent collection. Owner scoping is mandatory; everything
/// else is optional and validated before it reaches SQL.
#[derive(Debug, Clone)]
pub struct SentFilter {
    pub owner_id: i64,
    pub search: Option<String>,
}

impl SentFilter {
    pub fn new(owner_id: i64) -> Self {
        SentFilter {
            owner_id,
            search: None,
        }
    }

    fn search_pattern(&self) -> Option<String> {
        search_pattern(self.search.as_deref())
    }
}

/// Filter over the received collection. `is_read = None` means "any".
#[derive(Debug, Clone)]
pub struct ReceivedFilter {
    pub owner_id: i64,
    pub category: Option<Category>,
    pub is_read: Option<bool>,
    pub search: Option<String>,
}

impl ReceivedFilter {
    pub fn new(owner_id: i64) -> Self {
        ReceivedFilter {
            owner_id,
            category: None,
            is_read: None,
            search: None,
        }
    }

    fn search_pattern(&self) -> Option<String> {
        search_pattern(self.search.as_deref())
    }
}

/// Case-insensitive substring pattern; empty or whitespace-only terms are
/// treated as no filter.
fn search_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{t}%"))
}

// A NULL bind disables its clause, which keeps the SQL static while every
// optional filter stays typed on the Rust side.
const SENT_WHERE: &str = "owner_id = $1 \
     AND ($2::text IS NULL \
          OR subject ILIKE $2 OR from_address ILIKE $2 OR to_address ILIKE $2)";

const RECEIVED_WHERE: &str = "owner_id = $1 \
     AND ($2::text IS NULL OR category = $2) \
     AND ($3::boolean IS NULL OR is_read = $3) \
     AND ($4::text IS NULL \
          OR subject ILIKE $4 OR from_address ILIKE $4 OR to_address ILIKE $4)";

/// Count sent records matching the filter, ignoring pagination.
pub async fn count_sent(pool: &PgPool, filter: &SentFilter) -> sqlx::Result<i64> {
    let query = format!("SELECT COUNT(*) FROM sent_emails WHERE {SENT_WHERE}");

    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(filter.owner_id)
        .bind(filter.search_pattern())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Fetch one page of sent records, most recent first.
pub async fn find_sent(
    pool: &PgPool,
    filter: &SentFilter,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<SentEmail>> {
    let query = format!(
        "SELECT {SENT_COLUMNS} FROM sent_emails WHERE {SENT_WHERE} \
         ORDER BY sent_at DESC LIMIT $3 OFFSET $4"
    );

    sqlx::query_as::<_, SentEmail>(&query)
        .bind(filter.owner_id)
        .bind(filter.search_pattern())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
}

/// Count received records matching the filter, ignoring pagination.
pub async fn count_received(pool: &PgPool, filter: &ReceivedFilter) -> sqlx::Result<i64> {
    let query = format!("SELECT COUNT(*) FROM received_emails WHERE {RECEIVED_WHERE}");

    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(filter.owner_id)
        .bind(filter.category.map(Category::as_str))
        .bind(filter.is_read)
        .bind(filter.search_pattern())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Fetch one page of received records, most recent first.
pub async fn find_received(
    pool: &PgPool,
    filter: &ReceivedFilter,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<ReceivedEmail>> {
    let query = format!(
        "SELECT {RECEIVED_COLUMNS} FROM received_emails WHERE {RECEIVED_WHERE} \
         ORDER BY received_at DESC LIMIT $5 OFFSET $6"
    );

    sqlx::query_as::<_, ReceivedEmail>(&query)
        .bind(filter.owner_id)
        .bind(filter.category.map(Category::as_str))
        .bind(filter.is_read)
        .bind(filter.search_pattern())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
}

pub async fn find_sent_by_id(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
) -> sqlx::Result<Option<SentEmail>> {
    let query = format!("SELECT {SENT_COLUMNS} FROM sent_emails WHERE owner_id = $1 AND id = $2");

    sqlx::query_as::<_, SentEmail>(&query)
        .bind(owner_id)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_received_by_id(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
) -> sqlx::Result<Option<ReceivedEmail>> {
    let query =
        format!("SELECT {RECEIVED_COLUMNS} FROM received_emails WHERE owner_id = $1 AND id = $2");

    sqlx::query_as::<_, ReceivedEmail>(&query)
        .bind(owner_id)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Fetch a received record and promote its seen/read state in the same
/// statement. Two concurrent viewers race on one atomic row update instead of
/// a read followed by an unguarded write, so the final state is always
/// `is_read = TRUE` with the first viewer's `read_at` retained.
pub async fn find_received_and_mark_seen(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<ReceivedEmail>> {
    let query = format!(
        "UPDATE received_emails \
         SET is_seen = TRUE, is_read = TRUE, read_at = COALESCE(read_at, $3) \
         WHERE owner_id = $1 AND id = $2 \
         RETURNING {RECEIVED_COLUMNS}"
    );

    sqlx::query_as::<_, ReceivedEmail>(&query)
        .bind(owner_id)
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
}

/// Number of received records the owner has not read yet.
pub async fn unread_count(pool: &PgPool, owner_id: i64) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM received_emails WHERE owner_id = $1 AND is_read = FALSE",
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

// ===== Enrichment lookups =====

pub async fn find_account(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
) -> sqlx::Result<Option<EmailAccount>> {
    sqlx::query_as::<_, EmailAccount>(
        "SELECT id, owner_id, email, display_name, smtp_host, smtp_port, smtp_username, \
                smtp_password, is_active, created_at \
         FROM email_accounts WHERE owner_id = $1 AND id = $2",
    )
    .bind(owner_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_contact(pool: &PgPool, owner_id: i64, id: i64) -> sqlx::Result<Option<Contact>> {
    sqlx::query_as::<_, Contact>(
        "SELECT id, owner_id, email, first_name, last_name, created_at \
         FROM contacts WHERE owner_id = $1 AND id = $2",
    )
    .bind(owner_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_campaign(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
) -> sqlx::Result<Option<Campaign>> {
    sqlx::query_as::<_, Campaign>(
        "SELECT id, owner_id, name, created_at FROM campaigns WHERE owner_id = $1 AND id = $2",
    )
    .bind(owner_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

// ===== Writes used by reply composition =====

/// Insert payload for a new sent record.
#[derive(Debug, Clone)]
pub struct NewSentEmail {
    pub owner_id: i64,
    pub campaign_id: Option<i64>,
    pub email_account_id: i64,
    pub contact_id: Option<i64>,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub content: String,
    pub html_content: Option<String>,
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub status: SentStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

pub async fn insert_sent(pool: &PgPool, new: &NewSentEmail) -> sqlx::Result<SentEmail> {
    let query = format!(
        "INSERT INTO sent_emails \
         (owner_id, campaign_id, email_account_id, contact_id, from_address, to_address, \
          subject, content, html_content, message_id, thread_id, in_reply_to, status, error, \
          sent_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING {SENT_COLUMNS}"
    );

    sqlx::query_as::<_, SentEmail>(&query)
        .bind(new.owner_id)
        .bind(new.campaign_id)
        .bind(new.email_account_id)
        .bind(new.contact_id)
        .bind(&new.from_address)
        .bind(&new.to_address)
        .bind(&new.subject)
        .bind(&new.content)
        .bind(&new.html_content)
        .bind(&new.message_id)
        .bind(&new.thread_id)
        .bind(&new.in_reply_to)
        .bind(new.status.as_str())
        .bind(&new.error)
        .bind(new.sent_at)
        .fetch_one(pool)
        .await
}

/// Record that a received message has been answered by the given sent record.
/// Idempotent; repeated replies keep the flag set and point at the latest
/// answering record.
pub async fn mark_replied(
    pool: &PgPool,
    owner_id: i64,
    id: i64,
    sent_email_id: i64,
) -> sqlx::Result<Option<ReceivedEmail>> {
    let query = format!(
        "UPDATE received_emails SET is_replied_to = TRUE, sent_email_id = $3 \
         WHERE owner_id = $1 AND id = $2 \
         RETURNING {RECEIVED_COLUMNS}"
    );

    sqlx::query_as::<_, ReceivedEmail>(&query)
        .bind(owner_id)
        .bind(id)
        .bind(sent_email_id)
        .fetch_optional(pool)
        .await
}
