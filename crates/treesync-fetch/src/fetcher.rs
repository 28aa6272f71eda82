//! Fetcher wrapper
//!
//! Requests more ids than will be shown so that local trimming (duplicates,
//! the display limit) still leaves enough to fill the region, then classifies
//! the answer.

use crate::error::TransportError;
use crate::source::ItemSource;
use std::fmt;
use std::sync::Arc;
use treesync_model::{ItemList, SelectionKey};

/// Default ratio between ids requested and ids shown
pub const DEFAULT_OVERSUBSCRIBE_FACTOR: usize = 2;

/// Classified result of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// At least one item, already trimmed to the limit
    Items {
        items: ItemList,
        /// Total the remote reported
        remote_count: u64,
    },
    /// Collection exists but has nothing to show
    Empty,
    /// Remote reports no such collection
    NotFound,
}

impl FetchOutcome {
    /// Items to build, if any
    #[inline]
    #[must_use]
    pub fn items(&self) -> Option<&ItemList> {
        match self {
            Self::Items { items, .. } => Some(items),
            Self::Empty | Self::NotFound => None,
        }
    }
}

/// Wraps an [`ItemSource`] with oversubscription and trimming
#[derive(Clone)]
pub struct ItemFetcher {
    source: Arc<dyn ItemSource>,
    oversubscribe: usize,
}

impl fmt::Debug for ItemFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFetcher")
            .field("oversubscribe", &self.oversubscribe)
            .finish_non_exhaustive()
    }
}

impl ItemFetcher {
    /// Create fetcher with the default oversubscription factor
    #[inline]
    #[must_use]
    pub fn new(source: Arc<dyn ItemSource>) -> Self {
        Self {
            source,
            oversubscribe: DEFAULT_OVERSUBSCRIBE_FACTOR,
        }
    }

    /// With oversubscription factor (clamped to at least 1)
    #[inline]
    #[must_use]
    pub fn with_oversubscribe(mut self, factor: usize) -> Self {
        self.oversubscribe = factor.max(1);
        self
    }

    /// Number of ids requested for a display limit
    #[inline]
    #[must_use]
    pub fn request_size(&self, limit_hint: usize) -> usize {
        limit_hint.saturating_mul(self.oversubscribe)
    }

    /// Resolve `key` into at most `limit_hint` ordered, distinct ids
    ///
    /// # Errors
    /// `TransportError` if the source call fails outright
    pub async fn fetch(
        &self,
        key: &SelectionKey,
        limit_hint: usize,
    ) -> Result<FetchOutcome, TransportError> {
        let requested = self.request_size(limit_hint);
        tracing::debug!(%key, limit_hint, requested, "fetching item list");

        let response = self.source.fetch_item_list(key, requested).await?;
        if !response.found {
            tracing::debug!(%key, "remote reports no such collection");
            return Ok(FetchOutcome::NotFound);
        }

        let received = response.items.len();
        let items = response.items.dedup_stable().truncated(limit_hint);
        tracing::debug!(%key, received, kept = items.len(), count = response.count, "item list resolved");

        if items.is_empty() {
            Ok(FetchOutcome::Empty)
        } else {
            Ok(FetchOutcome::Items {
                items,
                remote_count: response.count,
            })
        }
    }
}
