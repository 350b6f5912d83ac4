//! Attachment paginator.
//!
//! Walks the cursor chain of `messages.getHistoryAttachments` and collects
//! every raw attachment record of a conversation.

use crate::api::{ApiError, ConversationApi};
use crate::config::BackupConfig;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Error type for pagination
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("API request for page {page} failed: {source}")]
    Api {
        page: usize,
        #[source]
        source: ApiError,
    },
    #[error("Page {page} is malformed: {reason}")]
    MalformedPage { page: usize, reason: String },
    #[error("Cursor '{cursor}' was returned twice (page {page})")]
    RepeatedCursor { cursor: String, page: usize },
    #[error("More than {max_pages} pages of attachments; stopping")]
    PageLimitExceeded { max_pages: usize },
    #[error("Cancelled before page {page} was fetched")]
    Cancelled { page: usize },
}

/// Fetches all photo attachment records of a conversation
///
/// Pages are requested until a response carries no continuation cursor.
/// The result keeps the order the API returned.
///
/// # Arguments
///
/// * `api` - Authenticated API session
/// * `peer_id` - Conversation peer id
/// * `config` - Supplies the page size and the page cap
/// * `cancel` - Stops the walk before the next page, or during a pending request
pub async fn fetch_all_attachments(
    api: &dyn ConversationApi,
    peer_id: u64,
    config: &BackupConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, PaginationError> {
    let max_pages = config.max_pages;
    let mut records = Vec::new();
    let mut seen_cursors = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut page = 0;

    loop {
        if page >= max_pages {
            return Err(PaginationError::PageLimitExceeded { max_pages });
        }
        page += 1;

        if cancel.is_cancelled() {
            warn!("Pagination cancelled at page {}", page);
            return Err(PaginationError::Cancelled { page });
        }

        let request = api.get_history_attachments(peer_id, cursor.as_deref(), config.page_size);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PaginationError::Cancelled { page }),
            response = request => response,
        };
        let response = response
            .map_err(|source| match source {
                ApiError::MissingFieldError(reason) | ApiError::JsonParseError(reason) => {
                    PaginationError::MalformedPage { page, reason }
                }
                source => PaginationError::Api { page, source },
            })?;

        debug!(
            "Page {}: {} items, next cursor {:?}",
            page,
            response.items.len(),
            response.next_from
        );
        records.extend(response.items);

        match response.next_from {
            Some(next) if !next.is_empty() => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(PaginationError::RepeatedCursor { cursor: next, page });
                }
                cursor = Some(next);
            }
            _ => break,
        }
    }

    info!(
        "Fetched {} attachment records in {} pages",
        records.len(),
        page
    );
    Ok(records)
}
