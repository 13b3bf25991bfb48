use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use serde::{Deserialize, Serialize};

// ===== Enumerated record states =====

/// Delivery state of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentStatus {
    Sent,
    Delivered,
    Failed,
    Bounced,
}

impl SentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SentStatus::Sent => "sent",
            SentStatus::Delivered => "delivered",
            SentStatus::Failed => "failed",
            SentStatus::Bounced => "bounced",
        }
    }
}

impl TryFrom<String> for SentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "sent" => Ok(SentStatus::Sent),
            "delivered" => Ok(SentStatus::Delivered),
            "failed" => Ok(SentStatus::Failed),
            "bounced" => Ok(SentStatus::Bounced),
            other => Err(format!("unknown sent status '{other}'")),
        }
    }
}

/// Mailbox category of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Inbox,
    Spam,
    Trash,
    Archive,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Inbox => "inbox",
            Category::Spam => "spam",
            Category::Trash => "trash",
            Category::Archive => "archive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbox" => Some(Category::Inbox),
            "spam" => Some(Category::Spam),
            "trash" => Some(Category::Trash),
            "archive" => Some(Category::Archive),
            _ => None,
        }
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Category::parse(&value).ok_or_else(|| format!("unknown category '{value}'"))
    }
}

// ===== Collaborator records (owned by upstream CRUD surfaces) =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmailAccount {
    pub id: i64,
    pub owner_id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    // Credentials never leave the server.
    #[serde(skip_serializing, default)]
    pub smtp_password: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl EmailAccount {
    /// Whether the account carries everything needed to hand mail to SMTP.
    pub fn has_transport_credentials(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_password.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub owner_id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ===== Mailbox records =====

/// One outbound message. Append-only from this engine's perspective; the
/// engagement fields are maintained by the external tracking collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SentEmail {
    pub id: i64,
    pub owner_id: i64,
    pub campaign_id: Option<i64>,
    pub email_account_id: i64,
    pub contact_id: Option<i64>,
    #[serde(rename = "from")]
    pub from_address: String,
    #[serde(rename = "to")]
    pub to_address: String,
    pub subject: String,
    pub content: String,
    pub html_content: Option<String>,
    /// Provider-assigned identity; `None` exactly when `status` is `failed`.
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SentStatus,
    pub error: Option<String>,
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub ai_generated: bool,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One inbound message. Created by the inbound-fetch collaborator, mutated
/// here only through state transitions and reply bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedEmail {
    pub id: i64,
    pub owner_id: i64,
    pub email_account_id: i64,
    pub contact_id: Option<i64>,
    pub campaign_id: Option<i64>,
    #[serde(rename = "from")]
    pub from_address: String,
    #[serde(rename = "to")]
    pub to_address: String,
    pub subject: String,
    pub content: String,
    pub html_content: Option<String>,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    #[sqlx(try_from = "String")]
    pub category: Category,
    pub is_read: bool,
    pub is_seen: bool,
    pub is_starred: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_replied_to: bool,
    /// Back-reference to the sent record that answers this message.
    pub sent_email_id: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ===== Merged timeline =====

/// A mailbox record tagged with its kind and a unifying timestamp so both
/// collections can be interleaved into one ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UniboxEntry {
    Sent {
        date: DateTime<Utc>,
        #[serde(flatten)]
        email: SentEmail,
    },
    Received {
        date: DateTime<Utc>,
        #[serde(flatten)]
        email: ReceivedEmail,
    },
}

impl UniboxEntry {
    pub fn sent(email: SentEmail) -> Self {
        UniboxEntry::Sent {
            date: email.sent_at,
            email,
        }
    }

    pub fn received(email: ReceivedEmail) -> Self {
        UniboxEntry::Received {
            date: email.received_at,
            email,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        match self {
            UniboxEntry::Sent { date, .. } | UniboxEntry::Received { date, .. } => *date,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, UniboxEntry::Sent { .. })
    }
}

/// Pagination block accompanying every mailbox page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub total_sent: i64,
    pub total_received: i64,
}

impl Pagination {
    /// A kind excluded by the caller's `type` filter contributes zero to its
    /// per-kind total, so `total` is always `total_sent + total_received`.
    pub fn new(page: i64, limit: i64, total_sent: i64, total_received: i64) -> Self {
        let total = total_sent + total_received;
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
            total_sent,
            total_received,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniboxPage {
    pub data: Vec<UniboxEntry>,
    pub pagination: Pagination,
}

// ===== Detail views =====

/// Single sent record with its cross-references resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmailDetail {
    #[serde(flatten)]
    pub email: SentEmail,
    pub contact: Option<Contact>,
    pub campaign: Option<Campaign>,
}

/// Single received record with its cross-references resolved, including the
/// sent record that answered it (if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedEmailDetail {
    #[serde(flatten)]
    pub email: ReceivedEmail,
    pub contact: Option<Contact>,
    pub campaign: Option<Campaign>,
    pub replied_with: Option<SentEmail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UniboxDetail {
    Sent(SentEmailDetail),
    Received(ReceivedEmailDetail),
}

// ===== Small response payloads =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: i64,
}

/// Outcome of a reply attempt. The bookkeeping record always exists; a
/// transport failure is reported as a nested detail, not a request failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub data: SentEmail,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delivery_error: Option<String>,
}
