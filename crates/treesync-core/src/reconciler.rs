//! Reconciliation controller
//!
//! An explicit state machine over a closed event set. Events are processed
//! one at a time, to completion, from an ordered queue; follow-up events
//! raised while handling (a finished build) are appended to the same queue.
//!
//! The controller performs no I/O of its own. Work that has to happen outside
//! (issuing a fetch, arming or cancelling the debounce) is returned as
//! [`Effect`]s from [`Reconciler::dispatch`]; results come back as events.
//! Tree writes are synchronous store calls and run inline.

use crate::config::SyncConfig;
use crate::error::{InvariantViolation, PropagationError, ReconcileError};
use crate::journal::{Journal, JournalEntry};
use crate::mutator::{BuildOutcome, TreeMutator};
use crate::propagator::AttributePropagator;
use crate::state::{validate_transition, BuildPlan, DesiredState, Phase, ReconciliationState};
use crate::timer::{FetchTicket, TimerTicket};
use std::collections::VecDeque;
use std::time::Duration;
use treesync_fetch::{FetchOutcome, TransportError};
use treesync_model::{ItemId, SelectionKey, SharedConfig};
use treesync_tree::{DocumentStore, Handle, NodeKind, RegionPresentation, StoreError};

/// Inputs of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Operator picked a new key; `None` clears the selection
    SelectionKeyChanged(Option<SelectionKey>),
    /// Re-run the current selection as if it had just been picked
    Retrigger,
    /// A fetch issued earlier came back
    ItemListResolved {
        ticket: FetchTicket,
        key: SelectionKey,
        result: Result<FetchOutcome, TransportError>,
    },
    /// A debounce armed earlier ran out
    DebounceElapsed { ticket: TimerTicket },
    /// Operator edited the shared display configuration
    ConfigChanged(SharedConfig),
    /// A build attempt finished (raised internally)
    BuildCompleted {
        plan: BuildPlan,
        outcome: BuildOutcome,
    },
}

/// Work the caller must carry out on the controller's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Resolve `key`; report back with [`Event::ItemListResolved`]
    StartFetch {
        ticket: FetchTicket,
        key: SelectionKey,
        limit_hint: usize,
    },
    /// Report [`Event::DebounceElapsed`] after `delay`
    ArmDebounce { ticket: TimerTicket, delay: Duration },
    /// Drop the armed debounce
    CancelDebounce { ticket: TimerTicket },
}

/// Point-in-time view for observers
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub selection: Option<SelectionKey>,
    pub state: ReconciliationState,
    pub error: Option<ReconcileError>,
    pub pending_fetch: Option<FetchTicket>,
    pub pending_debounce: Option<TimerTicket>,
    /// Config the content nodes currently carry
    pub written_config: Option<SharedConfig>,
    /// Stray nodes may remain after a store fault
    pub needs_sweep: bool,
}

/// Controller for one synchronized region
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    region: Handle,
    config: SyncConfig,
    state: ReconciliationState,
    phase: Phase,
    desired: DesiredState,
    /// Latest config from the operator; used by the next build
    shared: SharedConfig,
    /// Config last written onto the tree
    written: Option<SharedConfig>,
    error: Option<ReconcileError>,
    needs_sweep: bool,
    mutator: TreeMutator,
    propagator: AttributePropagator,
    journal: Journal,
    queue: VecDeque<Event>,
    effects: Vec<Effect>,
    pending_fetch: Option<FetchTicket>,
    pending_debounce: Option<(TimerTicket, BuildPlan)>,
    next_fetch: u64,
    next_timer: u64,
}

impl<S: DocumentStore> Reconciler<S> {
    /// Create controller for `region` inside `store`
    #[must_use]
    pub fn new(store: S, region: Handle, config: SyncConfig) -> Self {
        let journal = Journal::with_capacity(config.journal_capacity);
        Self {
            store,
            region,
            config,
            state: ReconciliationState::new(),
            phase: Phase::Idle,
            desired: DesiredState::default(),
            shared: SharedConfig::default(),
            written: None,
            error: None,
            needs_sweep: false,
            mutator: TreeMutator::new(region),
            propagator: AttributePropagator::new(region),
            journal,
            queue: VecDeque::new(),
            effects: Vec::new(),
            pending_fetch: None,
            pending_debounce: None,
            next_fetch: 0,
            next_timer: 0,
        }
    }

    /// With initial shared config
    #[must_use]
    pub fn with_shared_config(mut self, shared: SharedConfig) -> Self {
        self.shared = shared;
        self
    }

    /// Queue `event`, process the queue to empty, return the effects raised
    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        self.queue.push_back(event);
        while let Some(event) = self.queue.pop_front() {
            self.handle(event);
        }
        std::mem::take(&mut self.effects)
    }

    #[inline]
    pub fn select(&mut self, key: Option<SelectionKey>) -> Vec<Effect> {
        self.dispatch(Event::SelectionKeyChanged(key))
    }

    #[inline]
    pub fn retrigger(&mut self) -> Vec<Effect> {
        self.dispatch(Event::Retrigger)
    }

    #[inline]
    pub fn set_shared_config(&mut self, shared: SharedConfig) -> Vec<Effect> {
        self.dispatch(Event::ConfigChanged(shared))
    }

    /// Parse `value` leniently and apply it as the shared config
    pub fn set_shared_config_json(&mut self, value: &serde_json::Value) -> Vec<Effect> {
        self.set_shared_config(SharedConfig::from_json_lenient(value))
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::SelectionKeyChanged(key) => self.on_selection(key),
            Event::Retrigger => {
                tracing::info!(key = ?self.desired.key, "re-trigger requested");
                self.on_selection(self.desired.key.clone());
            }
            Event::ItemListResolved {
                ticket,
                key,
                result,
            } => self.on_resolved(ticket, key, result),
            Event::DebounceElapsed { ticket } => self.on_debounce(ticket),
            Event::ConfigChanged(shared) => self.on_config(shared),
            Event::BuildCompleted { plan, outcome } => self.on_build_completed(plan, outcome),
        }
    }

    fn on_selection(&mut self, key: Option<SelectionKey>) {
        tracing::info!(key = ?key, "selection changed");
        self.cancel_debounce();
        if let Some(ticket) = self.pending_fetch.take() {
            tracing::debug!(%ticket, "outstanding fetch superseded");
        }
        self.error = None;
        self.desired = DesiredState::for_key(key.clone());

        // Clear before the fetch is issued, so its result can never meet stale state
        self.clear_structure();
        self.journal.record(JournalEntry::Cleared { key: key.clone() });

        match key {
            None => self.set_phase(Phase::Idle),
            Some(key) => {
                let ticket = FetchTicket(self.next_fetch);
                self.next_fetch += 1;
                self.pending_fetch = Some(ticket);
                self.journal.record(JournalEntry::FetchStarted {
                    ticket: ticket.0,
                    key: key.clone(),
                });
                tracing::debug!(%ticket, %key, limit_hint = self.config.limit_hint, "fetch started");
                self.effects.push(Effect::StartFetch {
                    ticket,
                    key,
                    limit_hint: self.config.limit_hint,
                });
                self.set_phase(Phase::Loading);
            }
        }
    }

    fn on_resolved(
        &mut self,
        ticket: FetchTicket,
        key: SelectionKey,
        result: Result<FetchOutcome, TransportError>,
    ) {
        if self.pending_fetch != Some(ticket) || self.desired.key.as_ref() != Some(&key) {
            tracing::debug!(%ticket, %key, "discarding stale fetch result");
            self.journal
                .record(JournalEntry::FetchDiscarded { ticket: ticket.0 });
            return;
        }
        self.pending_fetch = None;

        match result {
            Ok(FetchOutcome::Items {
                items,
                remote_count,
            }) => {
                tracing::info!(%key, items = items.len(), remote_count, "item list resolved");
                self.desired.items = Some(items);
                self.request_build();
            }
            Ok(outcome @ (FetchOutcome::Empty | FetchOutcome::NotFound)) => {
                tracing::info!(%key, ?outcome, "no items for selection");
                self.clear_structure();
                if key.is_featured() && self.config.featured_not_found_is_idle {
                    self.set_phase(Phase::Idle);
                } else {
                    self.error = Some(ReconcileError::NotFound { key });
                    self.set_phase(Phase::Error);
                }
            }
            Err(source) => {
                tracing::warn!(%key, error = %source, "fetch failed");
                self.clear_structure();
                self.error = Some(ReconcileError::Transport { key, source });
                self.set_phase(Phase::Error);
            }
        }
    }

    /// Decide whether the desired pair needs building, and schedule it.
    ///
    /// Dropped, not queued, while the flag is held.
    fn request_build(&mut self) {
        let Some(plan) = self.desired.plan() else {
            return;
        };
        if self.state.mutation_in_progress() {
            tracing::debug!(key = %plan.key, "mutation in flight, build request dropped");
            return;
        }
        if !self.needs_sweep && self.state.matches(&plan.key, &plan.items) {
            self.set_phase(Phase::Steady);
            return;
        }

        self.cancel_debounce();
        if self.config.debounce_ms == 0 {
            self.run_build(plan);
            return;
        }

        let ticket = TimerTicket(self.next_timer);
        self.next_timer += 1;
        let delay = self.config.debounce();
        tracing::debug!(%ticket, key = %plan.key, ?delay, "build debounced");
        self.pending_debounce = Some((ticket, plan));
        self.effects.push(Effect::ArmDebounce { ticket, delay });
        self.set_phase(Phase::Loading);
    }

    fn on_debounce(&mut self, ticket: TimerTicket) {
        match self.pending_debounce.take() {
            Some((armed, plan)) if armed == ticket => self.run_build(plan),
            other => {
                tracing::debug!(%ticket, "ignoring stale debounce");
                self.pending_debounce = other;
            }
        }
    }

    fn run_build(&mut self, plan: BuildPlan) {
        self.set_phase(Phase::Building);
        let outcome = self.mutator.build(
            &mut self.store,
            &mut self.state,
            &self.journal,
            &plan,
            &self.desired,
            &self.shared,
            self.needs_sweep,
        );
        if matches!(outcome, BuildOutcome::Applied { .. }) {
            self.written = Some(self.shared.clone());
        }
        self.queue.push_back(Event::BuildCompleted { plan, outcome });
    }

    fn on_build_completed(&mut self, plan: BuildPlan, outcome: BuildOutcome) {
        match outcome {
            BuildOutcome::Applied { nodes } => {
                tracing::info!(key = %plan.key, nodes, "region built");
                self.needs_sweep = false;
                self.error = None;
                self.set_phase(Phase::Steady);
            }
            BuildOutcome::Aborted | BuildOutcome::Busy => {
                tracing::debug!(key = %plan.key, ?outcome, "build not applied, re-evaluating");
                self.reevaluate();
            }
            BuildOutcome::Faulted(fault) => {
                tracing::warn!(key = %plan.key, %fault, "build faulted");
                self.needs_sweep = true;
                self.error = Some(fault.into());
                self.set_phase(Phase::Error);
            }
        }
    }

    /// Recompute from the desired register after a build did not apply
    fn reevaluate(&mut self) {
        match (&self.desired.key, &self.desired.items) {
            (None, _) => self.set_phase(Phase::Idle),
            (Some(_), None) => self.set_phase(Phase::Loading),
            (Some(_), Some(_)) => self.request_build(),
        }
    }

    fn on_config(&mut self, shared: SharedConfig) {
        self.shared = shared;
        if !self.state.structure_present() {
            tracing::debug!("no structure yet, config kept for the next build");
            return;
        }
        if self.state.mutation_in_progress() {
            tracing::debug!("mutation in flight, config kept for the next build");
            return;
        }

        match self
            .propagator
            .propagate(&mut self.store, &self.state, &self.shared)
        {
            Ok(nodes) => {
                self.written = Some(self.shared.clone());
                self.journal.record(JournalEntry::Propagated { nodes });
                if matches!(self.error, Some(ReconcileError::Propagation(_))) {
                    self.error = None;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "config propagation failed");
                let mixed = matches!(e, PropagationError::Commit { rolled_back: false, .. });
                self.error = Some(e.into());
                if mixed {
                    // Nodes now disagree with each other; rebuild the whole list
                    self.needs_sweep = true;
                    self.request_build();
                }
            }
        }
    }

    fn clear_structure(&mut self) {
        if !self.state.structure_present() && !self.needs_sweep {
            return;
        }
        match self
            .mutator
            .clear(&mut self.store, &mut self.state, &self.journal)
        {
            Ok(Some(removed)) => {
                tracing::debug!(removed, "structure cleared");
                self.needs_sweep = false;
            }
            Ok(None) => tracing::warn!("mutation in flight, teardown skipped"),
            Err(fault) => {
                tracing::warn!(%fault, "teardown faulted");
                self.needs_sweep = true;
                self.error = Some(fault.into());
            }
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some((ticket, plan)) = self.pending_debounce.take() {
            tracing::debug!(%ticket, key = %plan.key, "debounce cancelled");
            self.effects.push(Effect::CancelDebounce { ticket });
        }
    }

    fn set_phase(&mut self, to: Phase) {
        let from = self.phase;
        if from == to {
            return;
        }
        if let Err(e) = validate_transition(from, to) {
            tracing::error!(error = %e, "unexpected phase transition");
        }
        tracing::debug!(?from, ?to, "phase");
        self.journal.record(JournalEntry::Phase { from, to });
        self.phase = to;
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&ReconcileError> {
        self.error.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    #[inline]
    #[must_use]
    pub fn region(&self) -> Handle {
        self.region
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the host store, for setting up tests and fixtures
    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[inline]
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    #[inline]
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Latest shared config received
    #[inline]
    #[must_use]
    pub fn shared_config(&self) -> &SharedConfig {
        &self.shared
    }

    /// Shared config the content nodes carry
    #[inline]
    #[must_use]
    pub fn written_config(&self) -> Option<&SharedConfig> {
        self.written.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn pending_fetch(&self) -> Option<FetchTicket> {
        self.pending_fetch
    }

    #[inline]
    #[must_use]
    pub fn pending_debounce(&self) -> Option<TimerTicket> {
        self.pending_debounce.as_ref().map(|(ticket, _)| *ticket)
    }

    #[inline]
    #[must_use]
    pub fn needs_sweep(&self) -> bool {
        self.needs_sweep
    }

    /// Chrome to render around the region
    ///
    /// # Errors
    /// `StoreError` if the region is no longer in the store
    pub fn presentation(&self) -> Result<RegionPresentation, StoreError> {
        RegionPresentation::for_region(&self.store, self.region)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            selection: self.desired.key.clone(),
            state: self.state.clone(),
            error: self.error.clone(),
            pending_fetch: self.pending_fetch,
            pending_debounce: self.pending_debounce(),
            written_config: self.written.clone(),
            needs_sweep: self.needs_sweep,
        }
    }

    /// Item ids shown under the region, one per container
    ///
    /// # Errors
    /// `StoreError` if the tree cannot be read
    pub fn rendered_items(&self) -> Result<Vec<ItemId>, StoreError> {
        Ok(self
            .rendered_groups()?
            .into_iter()
            .filter_map(|(_, content)| content.map(|(id, _)| id))
            .collect())
    }

    fn rendered_groups(&self) -> Result<Vec<(Handle, Option<(ItemId, SharedConfig)>)>, StoreError> {
        let mut groups = Vec::new();
        for container in self.store.query_children(self.region)? {
            if !container.kind.is_container() {
                continue;
            }
            let content = self
                .store
                .query_children(container.handle)?
                .into_iter()
                .find_map(|child| match child.kind {
                    NodeKind::Content(payload) => Some((payload.item_id, payload.config)),
                    _ => None,
                });
            groups.push((container.handle, content));
        }
        Ok(groups)
    }

    /// Check the state/tree invariants that must hold between events.
    ///
    /// Tree shape is not checked while a sweep is pending.
    ///
    /// # Errors
    /// The first [`InvariantViolation`] found
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.state.mutation_in_progress() {
            return Err(InvariantViolation::FlagHeld);
        }
        let key_present = self.state.structural_key().is_some();
        let structure_present = self.state.structure_present();
        if key_present != structure_present {
            return Err(InvariantViolation::KeyWithoutStructure {
                key_present,
                structure_present,
            });
        }
        if self.needs_sweep {
            return Ok(());
        }

        let groups = self.rendered_groups().map_err(InvariantViolation::Read)?;
        let found: Vec<ItemId> = groups
            .iter()
            .filter_map(|(_, content)| content.as_ref().map(|(id, _)| *id))
            .collect();
        let expected: Vec<ItemId> = if structure_present {
            self.state.applied_items().as_slice().to_vec()
        } else {
            Vec::new()
        };
        if groups.len() != expected.len() || found != expected {
            return Err(InvariantViolation::StructureMismatch { expected, found });
        }

        if let Some(written) = &self.written {
            for (container, content) in &groups {
                if content.as_ref().map(|(_, config)| config) != Some(written) {
                    return Err(InvariantViolation::StaleConfig {
                        container: *container,
                    });
                }
            }
        }
        Ok(())
    }
}
