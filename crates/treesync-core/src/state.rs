//! Reconciliation state, phases and the mutation flag
//!
//! [`ReconciliationState`] is the small set of fields every other component
//! reads. Its fields are private: structural fields only change while the
//! mutation flag is held, through a [`MutationGuard`].

use crate::error::IllegalTransition;
use crate::journal::{Journal, JournalEntry};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use treesync_model::{ItemList, SelectionKey};

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No selection
    Idle,
    /// Fetch outstanding, or resolved and waiting out the debounce
    Loading,
    /// Structural mutation in flight
    Building,
    /// Tree matches the resolved item list
    Steady,
    /// Last fetch failed, found nothing, or the store faulted
    Error,
}

impl Phase {
    /// Phases reachable from `self`
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [Phase] {
        use Phase::*;
        match self {
            Idle => &[Loading, Idle],
            Loading => &[Loading, Building, Idle, Error],
            Building => &[Steady, Loading, Idle, Error],
            Steady => &[Loading, Building, Idle, Error],
            Error => &[Loading, Idle],
        }
    }

    #[inline]
    #[must_use]
    pub fn can_transition_to(self, to: Phase) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

/// Validate a phase change.
///
/// Illegal transitions panic when the `strict-debug` feature is on.
///
/// # Errors
/// `IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), IllegalTransition> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal phase transition attempted: {from:?} -> {to:?}");

        #[allow(unreachable_code)]
        Err(IllegalTransition { from, to })
    }
}

/// Kind of structural mutation bracketed by the flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Remove everything under the region
    Teardown,
    /// Sweep if needed, then insert one node group per item
    Build,
}

/// Fields shared by the mutator, the propagator and the controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationState {
    structural_key: Option<SelectionKey>,
    applied_items: ItemList,
    mutation_in_progress: bool,
    structure_present: bool,
}

impl ReconciliationState {
    /// Create empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the current structure was built for
    #[inline]
    #[must_use]
    pub fn structural_key(&self) -> Option<&SelectionKey> {
        self.structural_key.as_ref()
    }

    /// Items the current structure was built from
    #[inline]
    #[must_use]
    pub fn applied_items(&self) -> &ItemList {
        &self.applied_items
    }

    #[inline]
    #[must_use]
    pub fn mutation_in_progress(&self) -> bool {
        self.mutation_in_progress
    }

    #[inline]
    #[must_use]
    pub fn structure_present(&self) -> bool {
        self.structure_present
    }

    /// Whether the structure already matches `key` and `items`
    #[must_use]
    pub fn matches(&self, key: &SelectionKey, items: &ItemList) -> bool {
        self.structure_present
            && self.structural_key.as_ref() == Some(key)
            && &self.applied_items == items
    }

    /// Acquire the mutation flag, or `None` if it is already held
    pub fn try_acquire<'a>(
        &'a mut self,
        kind: MutationKind,
        journal: &'a Journal,
    ) -> Option<MutationGuard<'a>> {
        if self.mutation_in_progress {
            tracing::debug!(?kind, "mutation flag already held");
            return None;
        }
        self.mutation_in_progress = true;
        journal.record(JournalEntry::MutationBegin { kind });
        Some(MutationGuard {
            state: self,
            journal,
            kind,
        })
    }
}

/// Holds the mutation flag; releases it on drop, whatever happened
#[derive(Debug)]
pub struct MutationGuard<'a> {
    state: &'a mut ReconciliationState,
    journal: &'a Journal,
    kind: MutationKind,
}

impl MutationGuard<'_> {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Structure removed
    pub fn mark_cleared(&mut self) {
        self.state.structure_present = false;
        self.state.structural_key = None;
        self.state.applied_items.clear();
    }

    /// Structure built for `key` from `items`
    pub fn mark_built(&mut self, key: SelectionKey, items: ItemList) {
        self.state.structural_key = Some(key);
        self.state.applied_items = items;
        self.state.structure_present = true;
    }
}

impl Deref for MutationGuard<'_> {
    type Target = ReconciliationState;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl DerefMut for MutationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.state.mutation_in_progress = false;
        self.journal
            .record(JournalEntry::MutationEnd { kind: self.kind });
    }
}

/// Single-slot register of what the tree should show next.
///
/// Overwritten by every selection change and every relevant fetch result;
/// intermediate values are never built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub key: Option<SelectionKey>,
    /// Resolved items for `key`, once known
    pub items: Option<ItemList>,
}

impl DesiredState {
    #[inline]
    #[must_use]
    pub fn for_key(key: Option<SelectionKey>) -> Self {
        Self { key, items: None }
    }

    /// Plan for the current register contents, if both halves are known
    #[must_use]
    pub fn plan(&self) -> Option<BuildPlan> {
        Some(BuildPlan {
            key: self.key.clone()?,
            items: self.items.clone()?,
        })
    }
}

/// The `(key, items)` pair a build was scheduled for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub key: SelectionKey,
    pub items: ItemList,
}

impl BuildPlan {
    /// Whether this plan is still what the register asks for
    #[must_use]
    pub fn is_desired(&self, desired: &DesiredState) -> bool {
        desired.key.as_ref() == Some(&self.key) && desired.items.as_ref() == Some(&self.items)
    }
}
