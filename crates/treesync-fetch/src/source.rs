//! Item source contract

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use treesync_model::{ItemList, SelectionKey};

/// Raw answer of an item source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// False when the remote reports no such collection
    pub found: bool,
    pub items: ItemList,
    /// Total matches the remote reports, which may exceed `items.len()`
    pub count: u64,
}

impl FetchResponse {
    /// Found response; `count` defaults to the number of items
    #[must_use]
    pub fn found(items: ItemList) -> Self {
        let count = items.len() as u64;
        Self {
            found: true,
            items,
            count,
        }
    }

    /// "No such collection"
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            found: false,
            items: ItemList::new(),
            count: 0,
        }
    }
}

/// One outbound call resolving a selection key into item ids
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    /// Request up to `limit` ids for `key`
    ///
    /// # Errors
    /// `TransportError` when the call fails outright. "Not found" is
    /// `Ok(FetchResponse { found: false, .. })`, never an error.
    async fn fetch_item_list(
        &self,
        key: &SelectionKey,
        limit: usize,
    ) -> Result<FetchResponse, TransportError>;
}
