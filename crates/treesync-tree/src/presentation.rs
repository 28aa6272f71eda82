//! Chrome around a synchronized region
//!
//! A region embedded inside another structural container renders bare: no
//! wrapper, no title, no status line. This is a read-only decision taken from
//! the ancestor chain and has no bearing on reconciliation.

use crate::node::{Handle, NodeView};
use crate::store::{DocumentStore, StoreError};

/// What to render around a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPresentation {
    /// Region sits inside another container
    pub embedded: bool,
    pub show_wrapper: bool,
    pub show_title: bool,
    pub show_status: bool,
}

impl Default for RegionPresentation {
    fn default() -> Self {
        Self::standalone()
    }
}

impl RegionPresentation {
    /// Full chrome
    #[inline]
    #[must_use]
    pub fn standalone() -> Self {
        Self {
            embedded: false,
            show_wrapper: true,
            show_title: true,
            show_status: true,
        }
    }

    /// No chrome
    #[inline]
    #[must_use]
    pub fn embedded() -> Self {
        Self {
            embedded: true,
            show_wrapper: false,
            show_title: false,
            show_status: false,
        }
    }

    /// Decide from an ancestor chain
    #[must_use]
    pub fn from_ancestors(ancestors: &[NodeView]) -> Self {
        if ancestors.iter().any(|a| a.kind.is_container()) {
            Self::embedded()
        } else {
            Self::standalone()
        }
    }

    /// Query the store for `region`'s ancestors and decide
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if `region` is not live
    pub fn for_region<S: DocumentStore + ?Sized>(
        store: &S,
        region: Handle,
    ) -> Result<Self, StoreError> {
        let ancestors = store.ancestor_chain(region)?;
        Ok(Self::from_ancestors(&ancestors))
    }
}
