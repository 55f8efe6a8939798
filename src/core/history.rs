//! History pagination service
//!
//! A pure read path over the [`MessageStore`]. It never consults the broker,
//! so history correctness does not depend on any subscription state.

use crate::core::error::ChatResult;
use crate::core::message::StoredMessage;
use crate::core::page::{DEFAULT_PAGE_SIZE, Page};
use crate::core::store::MessageStore;
use std::sync::Arc;
use uuid::Uuid;

/// Serves newest-first history pages
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn MessageStore>,
    default_page_size: usize,
    max_page_size: usize,
}

impl HistoryService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 100,
        }
    }

    /// Override the default and maximum page sizes
    pub fn with_page_sizes(mut self, default_page_size: usize, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Fetch page `page_index` (zero is the most recent)
    ///
    /// `page_size` falls back to the default and is clamped to
    /// `[1, max_page_size]`.
    pub async fn fetch_page(
        &self,
        room_id: Uuid,
        page_index: usize,
        page_size: Option<usize>,
    ) -> ChatResult<Page> {
        let size = page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let page = self.store.page(room_id, page_index, size).await?;

        tracing::debug!(
            room_id = %room_id,
            page = page_index,
            size,
            returned = page.content.len(),
            total = page.total_count,
            "History page served"
        );

        Ok(page)
    }

    /// The full log, newest first
    pub async fn full_history(&self, room_id: Uuid) -> ChatResult<Vec<StoredMessage>> {
        self.store.history(room_id).await
    }
}
