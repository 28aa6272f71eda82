//! Selection keys
//!
//! A region is synchronized against at most one external collection at a time.
//! The "no selection" case is modelled as `Option::<SelectionKey>::None` by the
//! callers; [`SelectionKey::Featured`] is the sentinel for the default collection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an external collection (e.g. a category)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub u64);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Names the external collection to synchronize against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionKey {
    /// The default/featured collection
    Featured,
    /// A concrete collection, with an optional human-readable name
    Collection {
        id: CollectionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl SelectionKey {
    /// Named collection key
    #[inline]
    #[must_use]
    pub fn collection(id: CollectionId, name: impl Into<String>) -> Self {
        Self::Collection {
            id,
            name: Some(name.into()),
        }
    }

    /// Collection key without a display name
    #[inline]
    #[must_use]
    pub fn unnamed(id: CollectionId) -> Self {
        Self::Collection { id, name: None }
    }

    /// Collection id, `None` for the featured sentinel
    #[inline]
    #[must_use]
    pub fn collection_id(&self) -> Option<CollectionId> {
        match self {
            Self::Featured => None,
            Self::Collection { id, .. } => Some(*id),
        }
    }

    /// Whether this is the featured sentinel
    #[inline]
    #[must_use]
    pub fn is_featured(&self) -> bool {
        matches!(self, Self::Featured)
    }

    /// Human-readable reference used in user-facing messages
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Featured => "featured collection".to_string(),
            Self::Collection {
                id,
                name: Some(name),
            } => format!("collection \"{name}\" ({id})"),
            Self::Collection { id, name: None } => format!("collection {id}"),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Featured => f.write_str("featured"),
            Self::Collection { id, .. } => write!(f, "{id}"),
        }
    }
}
