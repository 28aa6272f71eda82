//! Tree mutator
//!
//! The only writer allowed to add or remove container/content nodes. Every
//! operation runs under the mutation flag; node groups are created and
//! destroyed in whole-list batches, never individually.

use crate::error::MutationFault;
use crate::journal::Journal;
use crate::state::{BuildPlan, DesiredState, MutationGuard, MutationKind, ReconciliationState};
use treesync_model::{ContentPayload, SharedConfig};
use treesync_tree::{DocumentStore, Handle, NewNode, StoreError};

/// Result of one build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Structure now matches the plan
    Applied { nodes: usize },
    /// Plan no longer desired; no writes performed
    Aborted,
    /// Flag was held by another mutation; request dropped
    Busy,
    /// The store threw; the flag was released anyway
    Faulted(MutationFault),
}

/// Structural writer for one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMutator {
    region: Handle,
}

impl TreeMutator {
    /// Create mutator writing under `region`
    #[inline]
    #[must_use]
    pub fn new(region: Handle) -> Self {
        Self { region }
    }

    #[inline]
    #[must_use]
    pub fn region(&self) -> Handle {
        self.region
    }

    /// Remove every child of the region, stray nodes included.
    ///
    /// Requires the flag, hence the guard. Returns the number of top-level
    /// nodes removed.
    ///
    /// # Errors
    /// `MutationFault::Teardown`; state is left untouched in that case
    pub fn teardown<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        guard: &mut MutationGuard<'_>,
    ) -> Result<usize, MutationFault> {
        let children: Vec<Handle> = store
            .query_children(self.region)
            .map_err(MutationFault::Teardown)?
            .into_iter()
            .map(|view| view.handle)
            .collect();

        if !children.is_empty() {
            store
                .remove_nodes(&children)
                .map_err(MutationFault::Teardown)?;
        }
        guard.mark_cleared();
        tracing::debug!(region = %self.region, removed = children.len(), "teardown complete");
        Ok(children.len())
    }

    /// Acquire the flag, tear down, release.
    ///
    /// Returns `Ok(None)` if the flag was already held.
    ///
    /// # Errors
    /// `MutationFault::Teardown` if the store refuses the removal
    pub fn clear<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        state: &mut ReconciliationState,
        journal: &Journal,
    ) -> Result<Option<usize>, MutationFault> {
        let Some(mut guard) = state.try_acquire(MutationKind::Teardown, journal) else {
            return Ok(None);
        };
        self.teardown(store, &mut guard).map(Some)
    }

    /// Build one node group per item of `plan`, in order.
    ///
    /// The plan is re-checked against `desired` after the flag is taken; a
    /// plan that is no longer wanted aborts without writing. Existing
    /// structure (or stray nodes, when `sweep` is set) is torn down first
    /// inside the same flag bracket.
    #[allow(clippy::too_many_arguments)]
    pub fn build<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        state: &mut ReconciliationState,
        journal: &Journal,
        plan: &BuildPlan,
        desired: &DesiredState,
        shared: &SharedConfig,
        sweep: bool,
    ) -> BuildOutcome {
        let Some(mut guard) = state.try_acquire(MutationKind::Build, journal) else {
            return BuildOutcome::Busy;
        };

        if !plan.is_desired(desired) {
            tracing::debug!(key = %plan.key, "build superseded before writing, aborting");
            return BuildOutcome::Aborted;
        }

        if guard.structure_present() || sweep {
            if let Err(fault) = self.teardown(store, &mut guard) {
                return BuildOutcome::Faulted(fault);
            }
        }

        let mut inserted = Vec::with_capacity(plan.items.len());
        for (index, item_id) in plan.items.iter().enumerate() {
            let container = match store.insert_node(NewNode::Container, index, self.region) {
                Ok(container) => container,
                Err(source) => return self.faulted(store, &inserted, index, source),
            };
            inserted.push(container);

            let payload = ContentPayload::new(*item_id, shared.clone());
            if let Err(source) = Self::fill(store, container, payload) {
                return self.faulted(store, &inserted, index, source);
            }
        }

        guard.mark_built(plan.key.clone(), plan.items.clone());
        tracing::debug!(key = %plan.key, nodes = inserted.len(), "build complete");
        BuildOutcome::Applied {
            nodes: inserted.len(),
        }
    }

    /// Empty `container` of any host default child, then give it exactly
    /// one content node
    fn fill<S: DocumentStore + ?Sized>(
        store: &mut S,
        container: Handle,
        payload: ContentPayload,
    ) -> Result<(), StoreError> {
        let defaults: Vec<Handle> = store
            .query_children(container)?
            .into_iter()
            .map(|view| view.handle)
            .collect();
        if !defaults.is_empty() {
            store.remove_nodes(&defaults)?;
        }
        store.insert_node(NewNode::Content(payload), 0, container)?;
        Ok(())
    }

    /// Best effort removal of the groups inserted before a fault
    fn faulted<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        inserted: &[Handle],
        index: usize,
        source: StoreError,
    ) -> BuildOutcome {
        tracing::warn!(region = %self.region, index, %source, "build faulted");
        if !inserted.is_empty() {
            if let Err(e) = store.remove_nodes(inserted) {
                tracing::warn!(error = %e, stray = inserted.len(), "could not discard partial build");
            }
        }
        BuildOutcome::Faulted(MutationFault::Build { index, source })
    }
}
