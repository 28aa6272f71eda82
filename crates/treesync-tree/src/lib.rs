//! Treesync Tree
//!
//! The document store a synchronized region lives in.
//!
//! # Core Concepts
//!
//! - [`DocumentStore`]: the host primitives (insert, remove, update config,
//!   query children, ancestor chain). Calls are synchronous and not
//!   transactional across calls.
//! - [`Handle`]: opaque reference to one node in the store
//! - [`NodeKind`]: region, container, content, or a host-populated placeholder
//! - [`MemoryDocument`]: in-memory store used by tests and the simulator
//! - [`RegionPresentation`]: chrome decisions derived from the ancestor chain
//!
//! # Example
//!
//! ```rust
//! use treesync_tree::{DocumentStore, MemoryDocument, NewNode};
//!
//! let mut doc = MemoryDocument::new();
//! let region = doc.create_region(doc.root()).unwrap();
//! let container = doc.insert_node(NewNode::Container, 0, region).unwrap();
//! assert_eq!(doc.query_children(region).unwrap()[0].handle, container);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod memory;
mod node;
mod presentation;
mod store;

pub use memory::MemoryDocument;
pub use node::{Handle, NewNode, NodeKind, NodeView};
pub use presentation::RegionPresentation;
pub use store::{DocumentStore, StoreError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
