//! Treesync simulator - seeded event storm
//!
//! Drives one [`Reconciler`] over a [`MemoryDocument`] with random
//! selections, fetch completions delivered out of order, stale and current
//! timer firings and config edits. After every event the region is checked:
//! - state/tree invariants and the mutation bracket journal
//! - the region is cleared before a fetch for a new key goes out
//! - structure on screen always belongs to the latest selection
//! - shown items match the remote listing, in order, under the limit
//! - config edits never touch structure
//! - "not found" errors name the collection
//!
//! A final settle answers everything outstanding and verifies that the
//! latest selection won.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use treesync_core::{
    Effect, Event, FetchTicket, JournalEntry, Phase, ReconcileError, Reconciler, SyncConfig,
    TimerTicket,
};
use treesync_fetch::{FetchResponse, ItemFetcher, ItemSource, TransportError};
use treesync_model::{CollectionId, ItemList, SelectionKey, SharedConfig};
use treesync_tree::{DocumentStore, MemoryDocument};

/// Upper bound on settle rounds before giving up on convergence
const SETTLE_ROUNDS: usize = 64;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of random events
    pub steps: u64,
    /// Collections to choose from (ids `1..=keys`)
    pub keys: u64,
    /// Probability that a delivered fetch fails in transport
    pub failure_rate: f64,
    pub stop_on_first_violation: bool,
    /// Region tunables
    pub sync: SyncConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 1000,
            keys: 8,
            failure_rate: 0.1,
            stop_on_first_violation: false,
            sync: SyncConfig::new().with_limit(6),
        }
    }
}

/// One simulated input
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedOperation {
    Select(Option<SelectionKey>),
    Retrigger,
    /// Deliver the n-th outstanding fetch
    Resolve(usize),
    /// Deliver the n-th outstanding fetch as a transport failure
    Fail(usize),
    /// Fire the n-th timer ever armed, stale or not
    Fire(usize),
    EditConfig(SharedConfig),
}

/// A violation detected during simulation
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Invariant {
        step: u64,
        detail: String,
    },
    Brackets {
        step: u64,
        detail: String,
    },
    IllegalTransition {
        step: u64,
        from: Phase,
        to: Phase,
    },
    /// A fetch went out while the previous key's structure was still shown
    NotClearedBeforeFetch {
        step: u64,
    },
    /// Structure on screen belongs to a key other than the latest selection
    ForeignStructure {
        step: u64,
        shown: SelectionKey,
        desired: Option<SelectionKey>,
    },
    WrongItems {
        step: u64,
        key: SelectionKey,
        expected: Vec<u64>,
        shown: Vec<u64>,
    },
    /// A config edit inserted or removed containers
    ConfigChangedStructure {
        step: u64,
    },
    MissingDisplayName {
        step: u64,
        message: String,
    },
    /// After settling, the region does not show what the latest selection asks for
    NotConverged {
        expected: String,
        found: String,
    },
}

/// Statistics for simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub selections: u64,
    pub retriggers: u64,
    pub fetches_started: u64,
    pub fetches_delivered: u64,
    pub fetches_failed: u64,
    pub stale_fetches: u64,
    pub timers_fired: u64,
    pub stale_timers: u64,
    pub config_edits: u64,
    pub builds_applied: u64,
}

/// Final report from simulator
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
    /// Phase the region settled in
    pub final_phase: Phase,
}

impl SimulationReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let s = &self.stats;
        let mut report = String::new();

        report.push_str("=== Treesync Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Steps: {}\n", self.config.steps));
        report.push_str(&format!("Keys: {}\n", self.config.keys));
        report.push_str(&format!("Selections: {}\n", s.selections));
        report.push_str(&format!("Retriggers: {}\n", s.retriggers));
        report.push_str(&format!("Fetches Started: {}\n", s.fetches_started));
        report.push_str(&format!(
            "Fetches Delivered: {} ({} stale, {} failed)\n",
            s.fetches_delivered, s.stale_fetches, s.fetches_failed
        ));
        report.push_str(&format!(
            "Timers Fired: {} ({} stale)\n",
            s.timers_fired, s.stale_timers
        ));
        report.push_str(&format!("Config Edits: {}\n", s.config_edits));
        report.push_str(&format!("Builds Applied: {}\n", s.builds_applied));
        report.push_str(&format!("Final Phase: {:?}\n", self.final_phase));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Deterministic remote answering every simulated key.
///
/// Featured always has items. Collections whose id is a multiple of four
/// do not exist; ids `3 mod 4` exist but are empty. The rest list
/// `3 * id` ids with repeats, so trimming has work to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogSource;

impl CatalogSource {
    /// Raw listing the remote holds for `key`; `None` if there is no such collection
    #[must_use]
    pub fn listing(key: &SelectionKey) -> Option<Vec<u64>> {
        match key.collection_id() {
            None => Some(vec![100, 101, 102]),
            Some(CollectionId(id)) if id % 4 == 0 => None,
            Some(CollectionId(id)) if id % 4 == 3 => Some(Vec::new()),
            Some(CollectionId(id)) => {
                Some((0..id * 3).map(|i| id * 1000 + i % (id * 2)).collect())
            }
        }
    }

    /// Items the region should show for `key` once built
    #[must_use]
    pub fn expected(
        key: &SelectionKey,
        limit_hint: usize,
        oversubscribe: usize,
    ) -> Option<ItemList> {
        let listing = Self::listing(key)?;
        let requested = limit_hint.saturating_mul(oversubscribe.max(1));
        Some(
            ItemList::from_ids(listing.into_iter().take(requested))
                .dedup_stable()
                .truncated(limit_hint),
        )
    }
}

#[async_trait::async_trait]
impl ItemSource for CatalogSource {
    async fn fetch_item_list(
        &self,
        key: &SelectionKey,
        limit: usize,
    ) -> Result<FetchResponse, TransportError> {
        let Some(listing) = Self::listing(key) else {
            return Ok(FetchResponse::not_found());
        };
        let count = listing.len() as u64;
        let mut response =
            FetchResponse::found(ItemList::from_ids(listing.into_iter().take(limit)));
        response.count = count;
        Ok(response)
    }
}

/// Canonical key for collection `id`; odd ids carry a display name
#[must_use]
pub fn key_for(id: u64) -> SelectionKey {
    if id % 2 == 1 {
        SelectionKey::collection(CollectionId(id), format!("Collection {id}"))
    } else {
        SelectionKey::unnamed(CollectionId(id))
    }
}

struct Storm {
    reconciler: Reconciler<MemoryDocument>,
    fetcher: ItemFetcher,
    rng: StdRng,
    keys: u64,
    failure_rate: f64,
    outstanding: Vec<(FetchTicket, SelectionKey, usize)>,
    timers: Vec<TimerTicket>,
    stats: SimulatorStats,
    violations: Vec<Violation>,
    step: u64,
    /// Journal sequence numbers below this have been checked
    seen: u64,
}

impl Storm {
    fn new(config: &SimulatorConfig) -> anyhow::Result<Self> {
        let mut doc = MemoryDocument::new();
        let region = doc.create_region(doc.root())?;
        let fetcher = ItemFetcher::new(Arc::new(CatalogSource))
            .with_oversubscribe(config.sync.oversubscribe_factor);
        Ok(Self {
            reconciler: Reconciler::new(doc, region, config.sync.clone()),
            fetcher,
            rng: StdRng::seed_from_u64(config.seed),
            keys: config.keys.max(1),
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            outstanding: Vec::new(),
            timers: Vec::new(),
            stats: SimulatorStats::default(),
            violations: Vec::new(),
            step: 0,
            seen: 0,
        })
    }

    fn generate_operation(&mut self) -> SimulatedOperation {
        match self.rng.random_range(0..20) {
            0..=4 => SimulatedOperation::Select(self.pick_key()),
            5 => SimulatedOperation::Retrigger,
            6..=11 => SimulatedOperation::Resolve(self.rng.random_range(0..8)),
            12 => SimulatedOperation::Fail(self.rng.random_range(0..8)),
            13..=16 => SimulatedOperation::Fire(self.rng.random_range(0..8)),
            _ => {
                let columns = self.rng.random_range(1..=4);
                let mut config = SharedConfig::default().with_columns(columns);
                if self.rng.random_bool(0.5) {
                    config = config.with_heading(format!("Heading {}", self.step));
                }
                config.show_badges = self.rng.random_bool(0.5);
                SimulatedOperation::EditConfig(config)
            }
        }
    }

    fn pick_key(&mut self) -> Option<SelectionKey> {
        match self.rng.random_range(0..20) {
            0 => None,
            1..=3 => Some(SelectionKey::Featured),
            _ => Some(key_for(self.rng.random_range(1..=self.keys))),
        }
    }

    async fn apply(&mut self, operation: SimulatedOperation) {
        tracing::debug!(step = self.step, ?operation, "applying");
        match operation {
            SimulatedOperation::Select(key) => {
                self.stats.selections += 1;
                let effects = self.reconciler.select(key);
                self.absorb(effects);
            }
            SimulatedOperation::Retrigger => {
                self.stats.retriggers += 1;
                let effects = self.reconciler.retrigger();
                self.absorb(effects);
            }
            SimulatedOperation::Resolve(n) => self.deliver(n, false).await,
            SimulatedOperation::Fail(n) => self.deliver(n, true).await,
            SimulatedOperation::Fire(n) => self.fire(n),
            SimulatedOperation::EditConfig(config) => {
                self.stats.config_edits += 1;
                let region = self.reconciler.region();
                let before = self.reconciler.store().containers(region);
                let effects = self.reconciler.set_shared_config(config);
                if self.reconciler.store().containers(region) != before {
                    self.violations
                        .push(Violation::ConfigChangedStructure { step: self.step });
                }
                self.absorb(effects);
            }
        }
        self.check();
    }

    fn absorb(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartFetch {
                    ticket,
                    key,
                    limit_hint,
                } => {
                    self.stats.fetches_started += 1;
                    let state = self.reconciler.state();
                    if (state.structure_present() || !state.applied_items().is_empty())
                        && !self.reconciler.needs_sweep()
                    {
                        self.violations
                            .push(Violation::NotClearedBeforeFetch { step: self.step });
                    }
                    self.outstanding.push((ticket, key, limit_hint));
                }
                Effect::ArmDebounce { ticket, .. } => self.timers.push(ticket),
                Effect::CancelDebounce { .. } => {}
            }
        }
    }

    async fn deliver(&mut self, n: usize, fail: bool) {
        if self.outstanding.is_empty() {
            return;
        }
        let (ticket, key, limit_hint) = self.outstanding.remove(n % self.outstanding.len());
        if self.reconciler.pending_fetch() != Some(ticket) {
            self.stats.stale_fetches += 1;
        }
        let result = if fail || self.rng.random_bool(self.failure_rate) {
            self.stats.fetches_failed += 1;
            Err(TransportError::network("simulated connection reset"))
        } else {
            self.fetcher.fetch(&key, limit_hint).await
        };
        self.stats.fetches_delivered += 1;
        self.dispatch(Event::ItemListResolved { ticket, key, result });
    }

    fn fire(&mut self, n: usize) {
        if self.timers.is_empty() {
            return;
        }
        let ticket = self.timers[n % self.timers.len()];
        self.stats.timers_fired += 1;
        if self.reconciler.pending_debounce() != Some(ticket) {
            self.stats.stale_timers += 1;
        }
        self.dispatch(Event::DebounceElapsed { ticket });
    }

    fn dispatch(&mut self, event: Event) {
        let was_present = self.reconciler.state().structure_present();
        let effects = self.reconciler.dispatch(event);
        if !was_present && self.reconciler.state().structure_present() {
            self.stats.builds_applied += 1;
        }
        self.absorb(effects);
    }

    fn check(&mut self) {
        let step = self.step;
        let r = &self.reconciler;

        if let Err(e) = r.check_invariants() {
            self.violations.push(Violation::Invariant {
                step,
                detail: e.to_string(),
            });
        }
        if let Err(e) = r.journal().verify_brackets() {
            self.violations.push(Violation::Brackets {
                step,
                detail: e.to_string(),
            });
        }

        for record in r.journal().records() {
            if record.seq < self.seen {
                continue;
            }
            if let JournalEntry::Phase { from, to } = record.entry {
                if !from.can_transition_to(to) {
                    self.violations
                        .push(Violation::IllegalTransition { step, from, to });
                }
            }
        }
        self.seen = r.journal().total_recorded();

        if let Some(shown) = r.state().structural_key() {
            if r.desired().key.as_ref() != Some(shown) {
                self.violations.push(Violation::ForeignStructure {
                    step,
                    shown: shown.clone(),
                    desired: r.desired().key.clone(),
                });
            } else {
                let config = r.config();
                let expected = ids(&CatalogSource::expected(
                    shown,
                    config.limit_hint,
                    config.oversubscribe_factor,
                )
                .unwrap_or_default());
                let applied = ids(r.state().applied_items());
                if applied != expected {
                    self.violations.push(Violation::WrongItems {
                        step,
                        key: shown.clone(),
                        expected,
                        shown: applied,
                    });
                }
            }
        }

        if let Some(err @ ReconcileError::NotFound { key }) = r.error() {
            let message = err.to_string();
            if !message.contains(&key.display_name()) {
                self.violations
                    .push(Violation::MissingDisplayName { step, message });
            }
        }
    }

    /// Retrigger once, then answer every fetch and fire every timer until quiet
    async fn settle(&mut self) {
        let effects = self.reconciler.retrigger();
        self.absorb(effects);
        for _ in 0..SETTLE_ROUNDS {
            if !self.outstanding.is_empty() {
                let (ticket, key, limit_hint) = self.outstanding.remove(0);
                let result = self.fetcher.fetch(&key, limit_hint).await;
                self.dispatch(Event::ItemListResolved { ticket, key, result });
            } else if let Some(ticket) = self.reconciler.pending_debounce() {
                self.dispatch(Event::DebounceElapsed { ticket });
            } else {
                break;
            }
            self.check();
        }
        self.check_converged();
    }

    fn check_converged(&mut self) {
        let r = &self.reconciler;
        let shown = r
            .rendered_items()
            .map(|items| items.into_iter().map(|i| i.0).collect::<Vec<_>>())
            .unwrap_or_default();
        let found = format!("{:?} showing {shown:?}", r.phase());

        let config = r.config();
        let (phase, items) = match r.desired().key.as_ref() {
            None => (Phase::Idle, Vec::new()),
            Some(key) => {
                match CatalogSource::expected(key, config.limit_hint, config.oversubscribe_factor) {
                    Some(items) if !items.is_empty() => (Phase::Steady, ids(&items)),
                    _ if key.is_featured() && config.featured_not_found_is_idle => {
                        (Phase::Idle, Vec::new())
                    }
                    _ => (Phase::Error, Vec::new()),
                }
            }
        };
        if r.phase() != phase || shown != items {
            self.violations.push(Violation::NotConverged {
                expected: format!("{phase:?} showing {items:?}"),
                found,
            });
        }
    }
}

fn ids(items: &ItemList) -> Vec<u64> {
    items.iter().map(|i| i.0).collect()
}

/// Run the simulator
///
/// # Errors
/// Only if the simulated document cannot be set up
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulationReport> {
    let mut storm = Storm::new(&config)?;
    tracing::info!(
        seed = config.seed,
        steps = config.steps,
        keys = config.keys,
        "simulation started"
    );

    for step in 0..config.steps {
        storm.step = step;
        let operation = storm.generate_operation();
        storm.apply(operation).await;
        if config.stop_on_first_violation && !storm.violations.is_empty() {
            break;
        }
    }
    storm.step = config.steps;
    storm.settle().await;

    for violation in &storm.violations {
        tracing::warn!(?violation, "violation");
    }
    tracing::info!(
        violations = storm.violations.len(),
        phase = ?storm.reconciler.phase(),
        "simulation finished"
    );

    Ok(SimulationReport {
        final_phase: storm.reconciler.phase(),
        config,
        stats: storm.stats,
        violations: storm.violations,
    })
}
