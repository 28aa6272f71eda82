//! Attribute propagator
//!
//! Rewrites the shared configuration of every content node in place. Never
//! touches structure and never writes the item id. Application is all or
//! nothing: targets are collected first, then committed, and a failed commit
//! rolls back what it already wrote.

use crate::error::PropagationError;
use crate::state::ReconciliationState;
use treesync_model::SharedConfig;
use treesync_tree::{DocumentStore, Handle, NodeKind};

#[derive(Debug)]
struct Target {
    node: Handle,
    previous: SharedConfig,
}

/// Config writer for one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePropagator {
    region: Handle,
}

impl AttributePropagator {
    /// Create propagator for `region`
    #[inline]
    #[must_use]
    pub fn new(region: Handle) -> Self {
        Self { region }
    }

    /// Write `config` onto every content node of the region.
    ///
    /// Returns the number of nodes actually written; nodes that already carry
    /// `config` are skipped.
    ///
    /// # Errors
    /// - `PropagationError::NotReady` without structure or while the flag is held
    /// - `PropagationError::Read` / `Inconsistent` before any write
    /// - `PropagationError::Commit` after rolling back earlier writes
    pub fn propagate<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        state: &ReconciliationState,
        config: &SharedConfig,
    ) -> Result<usize, PropagationError> {
        if !state.structure_present() || state.mutation_in_progress() {
            return Err(PropagationError::NotReady);
        }

        let targets = self.collect(store)?;
        let pending: Vec<&Target> = targets.iter().filter(|t| t.previous != *config).collect();

        for (position, target) in pending.iter().enumerate() {
            if let Err(source) = store.update_node_config(target.node, config) {
                let rolled_back = Self::roll_back(store, &pending[..position]);
                tracing::warn!(
                    region = %self.region,
                    failed_at = position,
                    rolled_back,
                    %source,
                    "propagation commit failed"
                );
                return Err(PropagationError::Commit {
                    failed_at: position,
                    rolled_back,
                    source,
                });
            }
        }

        tracing::debug!(region = %self.region, written = pending.len(), total = targets.len(), "config propagated");
        Ok(pending.len())
    }

    /// One content node per container, in container order
    fn collect<S: DocumentStore + ?Sized>(&self, store: &S) -> Result<Vec<Target>, PropagationError> {
        let containers = store
            .query_children(self.region)
            .map_err(PropagationError::Read)?;

        let mut targets = Vec::with_capacity(containers.len());
        for container in containers.iter().filter(|v| v.kind.is_container()) {
            let children = store
                .query_children(container.handle)
                .map_err(PropagationError::Read)?;
            let mut contents = children.into_iter().filter_map(|child| match child.kind {
                NodeKind::Content(payload) => Some(Target {
                    node: child.handle,
                    previous: payload.config,
                }),
                _ => None,
            });

            match (contents.next(), contents.next()) {
                (Some(target), None) => targets.push(target),
                (first, second) => {
                    let count = usize::from(first.is_some()) + usize::from(second.is_some()) + contents.count();
                    return Err(PropagationError::Inconsistent {
                        container: container.handle,
                        contents: count,
                    });
                }
            }
        }
        Ok(targets)
    }

    fn roll_back<S: DocumentStore + ?Sized>(store: &mut S, written: &[&Target]) -> bool {
        let mut clean = true;
        for target in written.iter().rev() {
            if let Err(e) = store.update_node_config(target.node, &target.previous) {
                tracing::error!(node = %target.node, error = %e, "rollback write failed");
                clean = false;
            }
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use crate::mutator::TreeMutator;
    use crate::state::{BuildPlan, DesiredState};
    use pretty_assertions::assert_eq;
    use treesync_model::{CollectionId, ContentPayload, ItemId, ItemList, SelectionKey};
    use treesync_tree::{MemoryDocument, NewNode, StoreError};

    fn built(items: &[u64]) -> (MemoryDocument, Handle, ReconciliationState) {
        let mut doc = MemoryDocument::new();
        let region = doc.create_region(doc.root()).unwrap();
        let journal = Journal::default();
        let mut state = ReconciliationState::new();
        let plan = BuildPlan {
            key: SelectionKey::unnamed(CollectionId(5)),
            items: ItemList::from_ids(items.iter().copied()),
        };
        let desired = DesiredState {
            key: Some(plan.key.clone()),
            items: Some(plan.items.clone()),
        };
        TreeMutator::new(region).build(&mut doc, &mut state, &journal, &plan, &desired, &SharedConfig::default(), false);
        (doc, region, state)
    }

    /// Refuses config updates aimed at one node
    struct Flaky {
        inner: MemoryDocument,
        refuse: Handle,
    }

    impl DocumentStore for Flaky {
        fn insert_node(&mut self, node: NewNode, index: usize, parent: Handle) -> Result<Handle, StoreError> {
            self.inner.insert_node(node, index, parent)
        }

        fn remove_nodes(&mut self, handles: &[Handle]) -> Result<(), StoreError> {
            self.inner.remove_nodes(handles)
        }

        fn update_node_config(&mut self, handle: Handle, config: &SharedConfig) -> Result<(), StoreError> {
            if handle == self.refuse {
                return Err(StoreError::rejected("node locked"));
            }
            self.inner.update_node_config(handle, config)
        }

        fn query_children(&self, parent: Handle) -> Result<Vec<treesync_tree::NodeView>, StoreError> {
            self.inner.query_children(parent)
        }

        fn ancestor_chain(&self, handle: Handle) -> Result<Vec<treesync_tree::NodeView>, StoreError> {
            self.inner.ancestor_chain(handle)
        }
    }

    #[test]
    fn writes_every_content_node() {
        let (mut doc, region, state) = built(&[1, 2, 3]);
        let config = SharedConfig::default().with_heading("Tonight").with_columns(3);

        let written = AttributePropagator::new(region)
            .propagate(&mut doc, &state, &config)
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(doc.rendered_configs(region), vec![config.clone(); 3]);
        assert_eq!(doc.rendered_items(region), vec![ItemId(1), ItemId(2), ItemId(3)]);
    }

    #[test]
    fn unchanged_nodes_are_skipped() {
        let (mut doc, region, state) = built(&[1, 2]);
        let propagator = AttributePropagator::new(region);
        let config = SharedConfig::default().with_heading("Once");

        assert_eq!(propagator.propagate(&mut doc, &state, &config), Ok(2));
        let writes = doc.write_count();
        assert_eq!(propagator.propagate(&mut doc, &state, &config), Ok(0));
        assert_eq!(doc.write_count(), writes);
    }

    #[test]
    fn refuses_without_structure() {
        let mut doc = MemoryDocument::new();
        let region = doc.create_region(doc.root()).unwrap();
        let state = ReconciliationState::new();
        assert_eq!(
            AttributePropagator::new(region).propagate(&mut doc, &state, &SharedConfig::default()),
            Err(PropagationError::NotReady)
        );
    }

    fn content_nodes(doc: &MemoryDocument, region: Handle) -> Vec<Handle> {
        doc.containers(region)
            .into_iter()
            .map(|c| doc.query_children(c).unwrap()[0].handle)
            .collect()
    }

    #[test]
    fn failed_commit_rolls_back() {
        let (doc, region, state) = built(&[1, 2, 3]);
        let before = doc.rendered_configs(region);
        let refuse = content_nodes(&doc, region)[2];
        let mut flaky = Flaky { inner: doc, refuse };

        let err = AttributePropagator::new(region)
            .propagate(&mut flaky, &state, &SharedConfig::default().with_heading("Half"))
            .unwrap_err();

        assert!(matches!(
            err,
            PropagationError::Commit { failed_at: 2, rolled_back: true, .. }
        ));
        assert_eq!(flaky.inner.rendered_configs(region), before);
    }

    #[test]
    fn failure_on_first_write_changes_nothing() {
        let (doc, region, state) = built(&[1, 2]);
        let before = doc.rendered_configs(region);
        let refuse = content_nodes(&doc, region)[0];
        let mut flaky = Flaky { inner: doc, refuse };

        let err = AttributePropagator::new(region)
            .propagate(&mut flaky, &state, &SharedConfig::default().with_columns(4))
            .unwrap_err();

        assert!(matches!(err, PropagationError::Commit { failed_at: 0, rolled_back: true, .. }));
        assert_eq!(flaky.inner.rendered_configs(region), before);
    }

    #[test]
    fn doubled_content_is_inconsistent() {
        let (mut doc, region, state) = built(&[1]);
        let container = doc.containers(region)[0];
        doc.insert_node(
            NewNode::Content(ContentPayload::new(ItemId(9), SharedConfig::default())),
            1,
            container,
        )
        .unwrap();

        let err = AttributePropagator::new(region)
            .propagate(&mut doc, &state, &SharedConfig::default().with_heading("x"))
            .unwrap_err();
        assert_eq!(err, PropagationError::Inconsistent { container, contents: 2 });
    }
}
