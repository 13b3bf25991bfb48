//! Merge pagination across the sent and received collections.
//!
//! Single-kind listings page at the database. A combined listing cannot,
//! because the interleaving of the two kinds is data-dependent; instead each
//! kind contributes its top `offset + limit` candidates (under its own filter
//! and ordering) and the page is sliced out of the stable-sorted merge. A
//! record outside a kind's top `offset + limit` can never outrank one inside
//! it, so the bounded fetch is exact while cost tracks page depth rather than
//! collection size.

use sqlx::PgPool;

use crate::error::ApiError;
use crate::models::{Pagination, ReceivedEmail, SentEmail, UniboxEntry, UniboxPage};
use crate::routes::params::{MailboxScope, UniboxListParams};
use crate::store::{self, ReceivedFilter, SentFilter};

/// Produce one page of the unified mailbox.
pub async fn list_unibox(
    pool: &PgPool,
    owner_id: i64,
    params: &UniboxListParams,
) -> Result<UniboxPage, ApiError> {
    let page = params.page();
    let limit = params.limit();
    let offset = params.offset();

    let sent_filter = SentFilter {
        owner_id,
        search: params.search.clone(),
    };
    let received_filter = ReceivedFilter {
        owner_id,
        category: params.category,
        is_read: params.is_read,
        search: params.search.clone(),
    };

    log::debug!(
        "unibox list: owner={} scope={:?} page={} limit={}",
        owner_id,
        params.scope,
        page,
        limit
    );

    let unibox_page = match params.scope {
        MailboxScope::Sent => {
            let total = store::count_sent(pool, &sent_filter).await?;
            let rows = store::find_sent(pool, &sent_filter, limit, offset).await?;

            UniboxPage {
                data: rows.into_iter().map(UniboxEntry::sent).collect(),
                pagination: Pagination::new(page, limit, total, 0),
            }
        }
        MailboxScope::Received => {
            let total = store::count_received(pool, &received_filter).await?;
            let rows = store::find_received(pool, &received_filter, limit, offset).await?;

            UniboxPage {
                data: rows.into_iter().map(UniboxEntry::received).collect(),
                pagination: Pagination::new(page, limit, 0, total),
            }
        }
        MailboxScope::All => {
            let total_sent = store::count_sent(pool, &sent_filter).await?;
            let total_received = store::count_received(pool, &received_filter).await?;

            // Candidates only need to cover the requested slice.
            let candidates = offset.saturating_add(limit);
            let sent = store::find_sent(pool, &sent_filter, candidates, 0).await?;
            let received = store::find_received(pool, &received_filter, candidates, 0).await?;

            UniboxPage {
                data: merge_slice(sent, received, offset, limit),
                pagination: Pagination::new(page, limit, total_sent, total_received),
            }
        }
    };

    log::info!(
        "unibox list: owner={} returned {} of {} records",
        owner_id,
        unibox_page.data.len(),
        unibox_page.pagination.total
    );

    Ok(unibox_page)
}

/// Merge both candidate sets into descending date order and slice out the
/// requested window.
///
/// The sort is stable over the sent-then-received concatenation: records of
/// one kind keep their relative order, and a sent record sharing a timestamp
/// with a received record deterministically sorts first. Pagination is
/// reproducible as long as this tie-break stays fixed.
pub fn merge_slice(
    sent: Vec<SentEmail>,
    received: Vec<ReceivedEmail>,
    offset: i64,
    limit: i64,
) -> Vec<UniboxEntry> {
    let mut merged: Vec<UniboxEntry> = Vec::with_capacity(sent.len() + received.len());
    merged.extend(sent.into_iter().map(UniboxEntry::sent));
    merged.extend(received.into_iter().map(UniboxEntry::received));

    merged.sort_by(|a, b| b.date().cmp(&a.date()));

    merged
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}
