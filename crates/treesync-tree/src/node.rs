//! Node handles and node kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use treesync_model::{ContentPayload, ItemId};

/// Opaque reference to a node in a document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Node to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewNode {
    /// Root of a synchronized region
    Region,
    /// Structural wrapper for one item
    Container,
    /// Configured payload for one item
    Content(ContentPayload),
}

/// Kind of an existing node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Document root
    Root,
    Region,
    Container,
    Content(ContentPayload),
    /// Default child the host inserted on its own
    Placeholder,
}

impl NodeKind {
    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container)
    }

    /// Content payload, if this is a content node
    #[inline]
    #[must_use]
    pub fn content(&self) -> Option<&ContentPayload> {
        match self {
            Self::Content(payload) => Some(payload),
            _ => None,
        }
    }

    /// Item id, if this is a content node
    #[inline]
    #[must_use]
    pub fn item_id(&self) -> Option<ItemId> {
        self.content().map(|p| p.item_id)
    }
}

impl From<NewNode> for NodeKind {
    fn from(node: NewNode) -> Self {
        match node {
            NewNode::Region => Self::Region,
            NewNode::Container => Self::Container,
            NewNode::Content(payload) => Self::Content(payload),
        }
    }
}

/// Read-only view of a node returned by queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub handle: Handle,
    pub kind: NodeKind,
}

impl NodeView {
    #[inline]
    #[must_use]
    pub fn new(handle: Handle, kind: NodeKind) -> Self {
        Self { handle, kind }
    }
}
