//! History pages and pagination utilities
//!
//! Pages are addressed by a zero-based index counted back from the newest
//! message. With `total` messages stored (sequence numbers `1..=total`), page
//! `i` of size `s` holds sequence numbers `total - i*s` down to
//! `max(total - (i+1)*s + 1, 1)`, newest first.

use crate::core::error::{ChatError, ChatResult};
use crate::core::message::StoredMessage;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Default page size used when a request does not specify one
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A bounded, newest-first slice of a room's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub content: Vec<StoredMessage>,
    pub page_index: usize,
    pub page_size: usize,
    pub is_last_page: bool,
    pub total_count: u64,
}

impl Page {
    /// An out-of-range or empty-room page
    pub fn empty(page_index: usize, page_size: usize, total_count: u64) -> Self {
        Self {
            content: Vec::new(),
            page_index,
            page_size,
            is_last_page: true,
            total_count,
        }
    }

    /// Number of pages the room currently spans at this page size
    pub fn total_pages(&self) -> u64 {
        total_pages(self.total_count, self.page_size)
    }
}

/// Sequence numbers covered by a page, highest first when iterated with `.rev()`
///
/// Returns `None` when the page lies entirely beyond the stored log, or when
/// `page_size` is zero.
pub fn page_window(total: u64, page_index: usize, page_size: usize) -> Option<RangeInclusive<u64>> {
    if page_size == 0 {
        return None;
    }
    let size = page_size as u64;
    let skipped = (page_index as u64).checked_mul(size)?;
    if skipped >= total {
        return None;
    }
    let newest = total - skipped;
    let oldest = newest.saturating_sub(size) + 1;
    Some(oldest..=newest)
}

/// Reject a zero page size before touching a store
pub fn check_page_size(page_size: usize) -> ChatResult<()> {
    if page_size == 0 {
        return Err(ChatError::invalid("page size must be at least 1"));
    }
    Ok(())
}

/// Ceiling division, zero for an empty room
pub fn total_pages(total: u64, page_size: usize) -> u64 {
    let size = page_size.max(1) as u64;
    if total == 0 { 0 } else { total.div_ceil(size) }
}

/// Query parameters for the history endpoints
///
/// ```text
/// GET /chat/room/{roomId}/history/pageable?page=0&size=20
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    /// Zero-based page index from the most recent page
    #[serde(default)]
    pub page: usize,

    /// Number of messages per page
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl HistoryParams {
    /// Page size clamped to `[1, max]`
    pub fn size(&self, max: usize) -> usize {
        self.size.clamp(1, max.max(1))
    }
}

/// HTTP representation of a [`Page`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    /// Messages, newest first
    pub content: Vec<StoredMessage>,

    /// Whether this is the oldest page
    pub last: bool,

    /// Whether this is the newest page
    pub first: bool,

    pub total_elements: u64,

    pub total_pages: u64,

    /// Requested page size
    pub size: usize,

    /// Zero-based page index
    pub number: usize,

    pub number_of_elements: usize,
}

impl From<Page> for PageResponse {
    fn from(page: Page) -> Self {
        let total_pages = page.total_pages();
        Self {
            number_of_elements: page.content.len(),
            first: page.page_index == 0,
            last: page.is_last_page,
            total_elements: page.total_count,
            total_pages,
            size: page.page_size,
            number: page.page_index,
            content: page.content,
        }
    }
}
