//! Treesync Model
//!
//! Plain data shared by every treesync crate.
//!
//! # Core Concepts
//!
//! - [`SelectionKey`]: names the external collection a region is synchronized against
//! - [`ItemId`] / [`ItemList`]: ordered identifiers of the entities shown as node groups
//! - [`SharedConfig`]: display configuration replicated onto every content node
//! - [`ContentPayload`]: what a content node carries (`item_id` plus the shared config)
//!
//! # Example
//!
//! ```rust
//! use treesync_model::{CollectionId, ItemList, SelectionKey, SharedConfig};
//!
//! let key = SelectionKey::collection(CollectionId(5), "Desserts");
//! assert_eq!(key.display_name(), "collection \"Desserts\" (#5)");
//!
//! let items = ItemList::from_ids([10, 20, 30]);
//! assert_eq!(items.len(), 3);
//!
//! let config = SharedConfig::default().with_heading("Today");
//! assert_eq!(config.heading.as_deref(), Some("Today"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod item;
mod key;

pub use config::{ConfigField, SharedConfig, TagRef};
pub use item::{ContentPayload, ItemId, ItemList};
pub use key::{CollectionId, SelectionKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
