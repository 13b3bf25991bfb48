//! Query parameter helpers for the mailbox endpoints.
//!
//! These types give the URL query-string contract a strongly-typed surface:
//! scope and category values are validated at parse time, and page/limit are
//! normalized through the same clamping rules everywhere.

use rocket::form::{self, FromFormField, ValueField};
use serde::{Deserialize, Serialize};

use crate::models::Category;

const MAX_PAGE_SIZE: i64 = 100;

/// Which record kinds a mailbox listing spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxScope {
    All,
    Sent,
    Received,
}

impl Default for MailboxScope {
    fn default() -> Self {
        MailboxScope::All
    }
}

impl<'r> FromFormField<'r> for MailboxScope {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        match field.value {
            "all" => Ok(MailboxScope::All),
            "sent" => Ok(MailboxScope::Sent),
            "received" => Ok(MailboxScope::Received),
            other => Err(form::Error::validation(format!(
                "invalid type '{other}'; expected 'all', 'sent' or 'received'"
            ))
            .into()),
        }
    }
}

/// A single record kind, used by the fetch-one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Sent,
    Received,
}

impl<'r> FromFormField<'r> for RecordKind {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        match field.value {
            "sent" => Ok(RecordKind::Sent),
            "received" => Ok(RecordKind::Received),
            other => Err(form::Error::validation(format!(
                "invalid type '{other}'; expected 'sent' or 'received'"
            ))
            .into()),
        }
    }
}

impl<'r> FromFormField<'r> for Category {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        Category::parse(field.value).ok_or_else(|| {
            form::Error::validation(format!("invalid category '{}'", field.value)).into()
        })
    }
}

/// Query parameters accepted by the mailbox list endpoint.
#[derive(Debug, Clone, rocket::form::FromForm)]
pub struct UniboxListParams {
    /// One-based page index (defaults to the first page).
    #[field(default = 1)]
    pub page: i64,
    /// Number of items per page (clamped between 1 and 100, default 50).
    #[field(default = 50)]
    pub limit: i64,
    /// Record kinds to include (defaults to `all`).
    #[field(name = "type", default = MailboxScope::All)]
    pub scope: MailboxScope,
    /// Received-only category filter.
    pub category: Option<Category>,
    /// Received-only read-state filter; absent means "any".
    #[field(name = "isRead")]
    pub is_read: Option<bool>,
    /// Free-text term matched against subject and address fields.
    pub search: Option<String>,
}

impl Default for UniboxListParams {
    fn default() -> Self {
        UniboxListParams {
            page: 1,
            limit: 50,
            scope: MailboxScope::All,
            category: None,
            is_read: None,
            search: None,
        }
    }
}

impl UniboxListParams {
    /// Normalized 1-based page index.
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Normalized page size capped at [`MAX_PAGE_SIZE`].
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows skipped before the requested page begins. Saturates so an absurd
    /// page number yields an empty page instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::form::Form;

    #[test]
    fn parses_list_params() {
        let parsed: UniboxListParams =
            Form::parse("page=2&limit=10&type=received&category=spam&isRead=false&search=acme")
                .unwrap();
        assert_eq!(parsed.page(), 2);
        assert_eq!(parsed.limit(), 10);
        assert_eq!(parsed.scope, MailboxScope::Received);
        assert_eq!(parsed.category, Some(Category::Spam));
        assert_eq!(parsed.is_read, Some(false));
        assert_eq!(parsed.search.as_deref(), Some("acme"));

        let defaults: UniboxListParams = Form::parse("").unwrap();
        assert_eq!(defaults.page(), 1);
        assert_eq!(defaults.limit(), 50);
        assert_eq!(defaults.scope, MailboxScope::All);
        assert!(defaults.category.is_none());
        assert!(defaults.is_read.is_none());
    }

    #[test]
    fn clamps_page_and_limit() {
        let parsed: UniboxListParams = Form::parse("page=0&limit=10000").unwrap();
        assert_eq!(parsed.page(), 1);
        assert_eq!(parsed.limit(), 100);
        assert_eq!(parsed.offset(), 0);

        let deep: UniboxListParams = Form::parse("page=4&limit=25").unwrap();
        assert_eq!(deep.offset(), 75);
    }

    #[test]
    fn extreme_page_numbers_saturate() {
        let parsed: UniboxListParams =
            Form::parse(&format!("page={}&limit=100", i64::MAX)).unwrap();
        assert_eq!(parsed.offset(), i64::MAX);
    }

    #[test]
    fn rejects_unknown_scope() {
        assert!(Form::<UniboxListParams>::parse("type=starred").is_err());
    }
}
