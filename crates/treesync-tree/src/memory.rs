//! In-memory document store
//!
//! Arena of nodes keyed by [`Handle`]. Optionally mimics hosts that populate a
//! freshly inserted container with a default child on their own.

use crate::node::{Handle, NewNode, NodeKind, NodeView};
use crate::store::{DocumentStore, StoreError};
use std::collections::HashMap;
use treesync_model::{ItemId, SharedConfig};

#[derive(Debug, Clone)]
struct Entry {
    kind: NodeKind,
    parent: Option<Handle>,
    children: Vec<Handle>,
}

/// In-memory [`DocumentStore`]
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: HashMap<Handle, Entry>,
    root: Handle,
    next_id: u64,
    auto_placeholder: bool,
    writes: u64,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Create document containing only a root
    #[must_use]
    pub fn new() -> Self {
        let root = Handle(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Entry {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            auto_placeholder: false,
            writes: 0,
        }
    }

    /// Populate every new container with a placeholder child, as some hosts do
    #[inline]
    #[must_use]
    pub fn with_auto_placeholder(mut self) -> Self {
        self.auto_placeholder = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> Handle {
        self.root
    }

    /// Append a region node under `parent`
    ///
    /// # Errors
    /// `StoreError::NodeNotFound` if `parent` is not live
    pub fn create_region(&mut self, parent: Handle) -> Result<Handle, StoreError> {
        let len = self.entry(parent)?.children.len();
        self.insert_node(NewNode::Region, len, parent)
    }

    /// Number of live nodes, root included
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of successful mutating calls so far
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Whether `handle` names a live node
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.nodes.contains_key(&handle)
    }

    /// Kind of a live node
    #[must_use]
    pub fn kind(&self, handle: Handle) -> Option<&NodeKind> {
        self.nodes.get(&handle).map(|e| &e.kind)
    }

    /// Container handles directly under `region`, in order
    #[must_use]
    pub fn containers(&self, region: Handle) -> Vec<Handle> {
        self.nodes
            .get(&region)
            .map(|e| {
                e.children
                    .iter()
                    .copied()
                    .filter(|h| self.kind(*h).is_some_and(NodeKind::is_container))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Item ids rendered under `region`, one per container, in container order
    #[must_use]
    pub fn rendered_items(&self, region: Handle) -> Vec<ItemId> {
        self.containers(region)
            .into_iter()
            .filter_map(|c| {
                self.nodes
                    .get(&c)?
                    .children
                    .iter()
                    .find_map(|h| self.kind(*h).and_then(NodeKind::item_id))
            })
            .collect()
    }

    /// Configs of every content node under `region`, in container order
    #[must_use]
    pub fn rendered_configs(&self, region: Handle) -> Vec<SharedConfig> {
        self.containers(region)
            .into_iter()
            .filter_map(|c| {
                self.nodes.get(&c)?.children.iter().find_map(|h| {
                    self.kind(*h)
                        .and_then(NodeKind::content)
                        .map(|p| p.config.clone())
                })
            })
            .collect()
    }

    fn entry(&self, handle: Handle) -> Result<&Entry, StoreError> {
        self.nodes
            .get(&handle)
            .ok_or(StoreError::NodeNotFound(handle))
    }

    fn allocate(&mut self) -> Handle {
        let handle = Handle(self.next_id);
        self.next_id += 1;
        handle
    }

    fn attach(&mut self, kind: NodeKind, index: usize, parent: Handle) -> Result<Handle, StoreError> {
        let len = self.entry(parent)?.children.len();
        if index > len {
            tracing::debug!(%parent, index, len, "insert index out of bounds");
            return Err(StoreError::IndexOutOfBounds { parent, index, len });
        }
        let handle = self.allocate();
        self.nodes.insert(
            handle,
            Entry {
                kind,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(index, handle);
        }
        Ok(handle)
    }

    fn collect_subtree(&self, handle: Handle, out: &mut Vec<Handle>) {
        out.push(handle);
        if let Some(entry) = self.nodes.get(&handle) {
            for child in &entry.children {
                self.collect_subtree(*child, out);
            }
        }
    }
}

impl DocumentStore for MemoryDocument {
    fn insert_node(
        &mut self,
        node: NewNode,
        index: usize,
        parent: Handle,
    ) -> Result<Handle, StoreError> {
        let is_container = matches!(node, NewNode::Container);
        let handle = self.attach(node.into(), index, parent)?;
        if is_container && self.auto_placeholder {
            self.attach(NodeKind::Placeholder, 0, handle)?;
        }
        self.writes += 1;
        Ok(handle)
    }

    fn remove_nodes(&mut self, handles: &[Handle]) -> Result<(), StoreError> {
        if let Some(missing) = handles.iter().find(|h| !self.nodes.contains_key(*h)) {
            return Err(StoreError::NodeNotFound(*missing));
        }
        if handles.contains(&self.root) {
            return Err(StoreError::rejected("cannot remove document root"));
        }

        for handle in handles {
            // Already gone as part of an earlier subtree in this batch
            let Some(parent) = self.nodes.get(handle).map(|e| e.parent) else {
                continue;
            };
            if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
                p.children.retain(|c| c != handle);
            }
            let mut doomed = Vec::new();
            self.collect_subtree(*handle, &mut doomed);
            tracing::trace!(%handle, nodes = doomed.len(), "subtree removed");
            for h in doomed {
                self.nodes.remove(&h);
            }
        }
        self.writes += 1;
        Ok(())
    }

    fn update_node_config(
        &mut self,
        handle: Handle,
        config: &SharedConfig,
    ) -> Result<(), StoreError> {
        let entry = self
            .nodes
            .get_mut(&handle)
            .ok_or(StoreError::NodeNotFound(handle))?;
        match &mut entry.kind {
            NodeKind::Content(payload) => {
                payload.config = config.clone();
                self.writes += 1;
                Ok(())
            }
            _ => Err(StoreError::NotContent(handle)),
        }
    }

    fn query_children(&self, parent: Handle) -> Result<Vec<NodeView>, StoreError> {
        let entry = self.entry(parent)?;
        Ok(entry
            .children
            .iter()
            .filter_map(|h| {
                self.nodes
                    .get(h)
                    .map(|e| NodeView::new(*h, e.kind.clone()))
            })
            .collect())
    }

    fn ancestor_chain(&self, handle: Handle) -> Result<Vec<NodeView>, StoreError> {
        let mut chain = Vec::new();
        let mut cursor = self.entry(handle)?.parent;
        while let Some(h) = cursor {
            let entry = self.entry(h)?;
            chain.push(NodeView::new(h, entry.kind.clone()));
            cursor = entry.parent;
        }
        Ok(chain)
    }
}
