//! Treesync Fetch
//!
//! External data fetcher: resolves a [`SelectionKey`](treesync_model::SelectionKey)
//! into an ordered item list with one outbound call. There is no cancellation;
//! superseded requests still complete and are discarded by the caller.
//!
//! # Core Concepts
//!
//! - [`ItemSource`]: one round trip to a collaborator search endpoint
//! - [`ItemFetcher`]: oversubscribes the request, then dedups and trims locally
//! - [`FetchOutcome`]: items, found-but-empty, or not-found; distinct from
//!   [`TransportError`]
//! - [`HttpItemSource`]: reqwest-backed source
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use treesync_fetch::{HttpItemSource, ItemFetcher};
//! use treesync_model::SelectionKey;
//!
//! let source = HttpItemSource::new("https://catalog.example.com/api")?;
//! let fetcher = ItemFetcher::new(Arc::new(source));
//! let outcome = fetcher.fetch(&SelectionKey::Featured, 12).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod fetcher;
mod http;
mod source;

pub use error::TransportError;
pub use fetcher::{FetchOutcome, ItemFetcher, DEFAULT_OVERSUBSCRIBE_FACTOR};
pub use http::HttpItemSource;
pub use source::{FetchResponse, ItemSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
