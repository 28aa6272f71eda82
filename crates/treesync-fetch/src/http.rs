//! reqwest-backed item source
//!
//! `GET {base}/collections/{id}/items?limit=N` for a collection,
//! `GET {base}/featured/items?limit=N` for the featured sentinel.
//! A 404 is "not found", any other non-success status is a transport error.

use crate::error::TransportError;
use crate::source::{FetchResponse, ItemSource};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use treesync_model::{ItemId, ItemList, SelectionKey};

#[derive(Debug, Deserialize)]
struct ListingBody {
    #[serde(default = "default_found")]
    found: bool,
    #[serde(default)]
    items: Vec<ItemId>,
    count: Option<u64>,
}

fn default_found() -> bool {
    true
}

/// Item source talking to a collaborator search endpoint
#[derive(Debug, Clone)]
pub struct HttpItemSource {
    client: Client,
    base_url: String,
}

impl HttpItemSource {
    /// Create source for `base_url`
    ///
    /// # Errors
    /// `TransportError::Unavailable` if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_connect_timeout(base_url, Duration::from_secs(10))
    }

    /// Create source with an explicit connect timeout
    ///
    /// # Errors
    /// `TransportError::Unavailable` if the HTTP client cannot be built
    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL listing the items of `key`
    #[must_use]
    pub fn listing_url(&self, key: &SelectionKey) -> String {
        match key.collection_id() {
            Some(id) => format!("{}/collections/{}/items", self.base_url, id.0),
            None => format!("{}/featured/items", self.base_url),
        }
    }
}

#[async_trait::async_trait]
impl ItemSource for HttpItemSource {
    async fn fetch_item_list(
        &self,
        key: &SelectionKey,
        limit: usize,
    ) -> Result<FetchResponse, TransportError> {
        let url = self.listing_url(key);
        tracing::debug!(%url, limit, "requesting listing");

        let resp = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchResponse::not_found());
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body: ListingBody = resp
            .json()
            .await
            .map_err(|e| TransportError::decode(e.to_string()))?;

        let items = ItemList::from(body.items);
        let count = body.count.unwrap_or(items.len() as u64);
        Ok(FetchResponse {
            found: body.found,
            items,
            count,
        })
    }
}
