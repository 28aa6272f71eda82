//! Host document-store contract
//!
//! These primitives already exist in the host. They mutate state observed by
//! other readers of the same store and are not transactional across calls,
//! which is why structural work above this layer is serialized by a flag.

use crate::node::{Handle, NewNode, NodeView};
use treesync_model::SharedConfig;

/// Errors raised by a document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Handle does not name a live node
    #[error("node not found: {0}")]
    NodeNotFound(Handle),

    /// Insert position past the end of the parent's children
    #[error("index {index} out of bounds for {parent} with {len} children")]
    IndexOutOfBounds {
        parent: Handle,
        index: usize,
        len: usize,
    },

    /// Config update aimed at a node that carries no configuration
    #[error("{0} is not a content node")]
    NotContent(Handle),

    /// The host refused the write
    #[error("store rejected write: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Create rejection error
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Primitives offered by the host document store
pub trait DocumentStore {
    /// Insert `node` as child number `index` of `parent`
    ///
    /// # Errors
    /// - `StoreError::NodeNotFound` if `parent` is not live
    /// - `StoreError::IndexOutOfBounds` if `index` exceeds the child count
    fn insert_node(
        &mut self,
        node: NewNode,
        index: usize,
        parent: Handle,
    ) -> Result<Handle, StoreError>;

    /// Remove nodes together with their descendants
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if any handle is not live
    fn remove_nodes(&mut self, handles: &[Handle]) -> Result<(), StoreError>;

    /// Overwrite the shared configuration of one content node
    ///
    /// # Errors
    /// `StoreError::NotContent` if `handle` is not a content node
    fn update_node_config(&mut self, handle: Handle, config: &SharedConfig)
        -> Result<(), StoreError>;

    /// Children of `parent`, in order
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if `parent` is not live
    fn query_children(&self, parent: Handle) -> Result<Vec<NodeView>, StoreError>;

    /// Ancestors of `handle`, nearest first, excluding the node itself
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if `handle` is not live
    fn ancestor_chain(&self, handle: Handle) -> Result<Vec<NodeView>, StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn insert_node(
        &mut self,
        node: NewNode,
        index: usize,
        parent: Handle,
    ) -> Result<Handle, StoreError> {
        (**self).insert_node(node, index, parent)
    }

    fn remove_nodes(&mut self, handles: &[Handle]) -> Result<(), StoreError> {
        (**self).remove_nodes(handles)
    }

    fn update_node_config(
        &mut self,
        handle: Handle,
        config: &SharedConfig,
    ) -> Result<(), StoreError> {
        (**self).update_node_config(handle, config)
    }

    fn query_children(&self, parent: Handle) -> Result<Vec<NodeView>, StoreError> {
        (**self).query_children(parent)
    }

    fn ancestor_chain(&self, handle: Handle) -> Result<Vec<NodeView>, StoreError> {
        (**self).ancestor_chain(handle)
    }
}
