use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use treesync_core::{
    Effect, Event, FetchTicket, JournalEntry, Phase, ReconcileError, Reconciler, SyncConfig,
    TimerTicket,
};
use treesync_fetch::{FetchOutcome, ItemFetcher, TransportError};
use treesync_model::{SelectionKey, SharedConfig};
use treesync_test_utils::{
    assert_region_items, content_nodes, ids, items, key, named_key, region_document, Reply,
    ScriptedSource,
};
use treesync_tree::MemoryDocument;

fn reconciler(debounce_ms: u64) -> Reconciler<MemoryDocument> {
    let (doc, region) = region_document();
    Reconciler::new(
        doc,
        region,
        SyncConfig::new().with_debounce(Duration::from_millis(debounce_ms)),
    )
}

fn fetch_ticket(effects: &[Effect]) -> FetchTicket {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::StartFetch { ticket, .. } => Some(*ticket),
            _ => None,
        })
        .expect("no fetch issued")
}

fn found(ids: &[u64]) -> Result<FetchOutcome, TransportError> {
    let list = items(ids);
    Ok(FetchOutcome::Items {
        remote_count: list.len() as u64,
        items: list,
    })
}

fn resolve(
    r: &mut Reconciler<MemoryDocument>,
    ticket: FetchTicket,
    key: SelectionKey,
    result: Result<FetchOutcome, TransportError>,
) -> Vec<Effect> {
    r.dispatch(Event::ItemListResolved {
        ticket,
        key,
        result,
    })
}

/// Select `k` and resolve with `ids`, debounce disabled
fn built(k: SelectionKey, ids: &[u64]) -> Reconciler<MemoryDocument> {
    let mut r = reconciler(0);
    let ticket = fetch_ticket(&r.select(Some(k.clone())));
    resolve(&mut r, ticket, k, found(ids));
    assert_eq!(r.phase(), Phase::Steady);
    r
}

#[test]
fn selection_change_clears_before_fetch_can_resolve() {
    let mut r = built(key(5), &[1, 2, 3]);

    let effects = r.select(Some(key(7)));

    // the fetch has only just been issued; nothing can have resolved it yet
    assert!(matches!(effects.as_slice(), [Effect::StartFetch { .. }]));
    assert!(r.state().applied_items().is_empty());
    assert!(!r.state().structure_present());
    assert_region_items(r.store(), r.region(), &[]);

    let entries = r.journal().entries();
    let cleared = entries
        .iter()
        .rposition(|e| matches!(e, JournalEntry::Cleared { .. }))
        .unwrap();
    let started = entries
        .iter()
        .rposition(|e| matches!(e, JournalEntry::FetchStarted { .. }))
        .unwrap();
    assert!(cleared < started);
}

#[test]
fn mutation_brackets_never_overlap() {
    let mut r = built(key(5), &[1, 2, 3]);
    let ticket = fetch_ticket(&r.select(Some(key(7))));
    resolve(&mut r, ticket, key(7), found(&[4, 5]));
    r.select(None);

    assert!(r.journal().verify_brackets().is_ok());
    let brackets: Vec<bool> = r
        .journal()
        .entries()
        .into_iter()
        .filter_map(|e| match e {
            JournalEntry::MutationBegin { .. } => Some(true),
            JournalEntry::MutationEnd { .. } => Some(false),
            _ => None,
        })
        .collect();
    assert!(!brackets.is_empty());
    assert!(brackets.chunks(2).all(|pair| pair == [true, false]));
    assert!(!r.state().mutation_in_progress());
}

#[test]
fn superseded_fetch_is_never_applied() {
    let mut r = reconciler(0);
    let for_a = fetch_ticket(&r.select(Some(key(1))));
    let for_b = fetch_ticket(&r.select(Some(key(2))));

    resolve(&mut r, for_a, key(1), found(&[11, 12]));
    assert_region_items(r.store(), r.region(), &[]);
    assert_eq!(r.phase(), Phase::Loading);
    assert!(r
        .journal()
        .entries()
        .contains(&JournalEntry::FetchDiscarded { ticket: for_a.0 }));

    resolve(&mut r, for_b, key(2), found(&[21]));
    assert_region_items(r.store(), r.region(), &[21]);
}

#[test]
fn reselecting_same_key_rejects_older_ticket() {
    let mut r = reconciler(0);
    let first = fetch_ticket(&r.select(Some(key(1))));
    let second = fetch_ticket(&r.select(Some(key(1))));

    resolve(&mut r, first, key(1), found(&[1, 2]));
    assert_region_items(r.store(), r.region(), &[]);

    resolve(&mut r, second, key(1), found(&[3]));
    assert_region_items(r.store(), r.region(), &[3]);
}

#[tokio::test]
async fn order_is_preserved_under_limit() {
    let source = Arc::new(ScriptedSource::new().with(key(5), Reply::items([10, 20, 30])));
    let fetcher = ItemFetcher::new(source.clone());

    let (doc, region) = region_document();
    let mut r = Reconciler::new(doc, region, SyncConfig::new().with_limit(2).with_debounce(Duration::ZERO));
    let effects = r.select(Some(key(5)));
    let (ticket, limit_hint) = match effects.as_slice() {
        [Effect::StartFetch {
            ticket, limit_hint, ..
        }] => (*ticket, *limit_hint),
        other => panic!("unexpected effects {other:?}"),
    };
    assert_eq!(limit_hint, 2);

    let result = fetcher.fetch(&key(5), limit_hint).await;
    resolve(&mut r, ticket, key(5), result);

    assert_region_items(r.store(), r.region(), &[10, 20]);
    assert_eq!(source.calls(), vec![(key(5), 4)]);
}

#[test]
fn rapid_switch_converges_to_latest_key() {
    let mut r = built(key(5), &[1, 2, 3]);
    let for_7 = fetch_ticket(&r.select(Some(key(7))));

    assert_region_items(r.store(), r.region(), &[]);
    resolve(&mut r, for_7, key(7), found(&[70, 71]));

    assert_region_items(r.store(), r.region(), &[70, 71]);
    assert_eq!(r.state().structural_key(), Some(&key(7)));
    assert!(r.check_invariants().is_ok());
}

#[test]
fn switch_during_debounce_never_mixes() {
    let mut r = reconciler(150);
    let for_5 = fetch_ticket(&r.select(Some(key(5))));
    let armed = resolve(&mut r, for_5, key(5), found(&[1, 2, 3]));
    let stale_timer = match armed.as_slice() {
        [Effect::ArmDebounce { ticket, .. }] => *ticket,
        other => panic!("unexpected effects {other:?}"),
    };

    let for_7 = fetch_ticket(&r.select(Some(key(7))));
    r.dispatch(Event::DebounceElapsed { ticket: stale_timer });
    assert_region_items(r.store(), r.region(), &[]);

    let armed = resolve(&mut r, for_7, key(7), found(&[70]));
    let timer = match armed.as_slice() {
        [Effect::ArmDebounce { ticket, .. }] => *ticket,
        other => panic!("unexpected effects {other:?}"),
    };
    r.dispatch(Event::DebounceElapsed { ticket: timer });

    assert_region_items(r.store(), r.region(), &[70]);
}

#[test]
fn config_change_is_not_structural() {
    let mut r = built(key(5), &[1, 2, 3, 4]);
    let containers_before = r.store().containers(r.region());
    let contents_before = content_nodes(r.store(), r.region());

    let config = SharedConfig::default()
        .with_heading("Tonight only")
        .with_tags([3, 9])
        .with_translation("fr", "Ce soir");
    let effects = r.set_shared_config(config.clone());

    assert!(effects.is_empty());
    assert_eq!(r.phase(), Phase::Steady);
    assert_eq!(r.store().containers(r.region()), containers_before);
    assert_eq!(content_nodes(r.store(), r.region()), contents_before);
    assert_eq!(r.store().rendered_items(r.region()), ids(&[1, 2, 3, 4]));
    assert_eq!(r.store().rendered_configs(r.region()), vec![config; 4]);
    assert!(r.check_invariants().is_ok());
}

#[test]
fn not_found_reports_display_name() {
    let desserts = named_key(5, "Desserts");
    let mut r = built(key(4), &[1, 2]);
    let ticket = fetch_ticket(&r.select(Some(desserts.clone())));

    resolve(&mut r, ticket, desserts.clone(), Ok(FetchOutcome::NotFound));

    assert!(r.store().containers(r.region()).is_empty());
    assert!(!r.state().structure_present());
    assert_eq!(r.phase(), Phase::Error);
    let err = r.error().unwrap();
    assert_eq!(err, &ReconcileError::NotFound { key: desserts });
    assert!(err.to_string().contains("collection \"Desserts\" (#5)"));
}

#[derive(Debug, Clone)]
enum Op {
    Select(Option<u64>),
    Retrigger,
    /// Resolve the n-th outstanding fetch (mod count)
    Resolve(usize),
    /// Resolve the n-th outstanding fetch as a transport failure
    Fail(usize),
    /// Fire the n-th timer ever armed (mod count)
    Fire(usize),
    Config(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop::option::weighted(0.85, 1..5u64).prop_map(Op::Select),
        1 => Just(Op::Retrigger),
        4 => any::<usize>().prop_map(Op::Resolve),
        1 => any::<usize>().prop_map(Op::Fail),
        3 => any::<usize>().prop_map(Op::Fire),
        2 => (1..6u32).prop_map(Op::Config),
    ]
}

/// Deterministic item list of collection `k`
fn catalog(k: u64) -> Vec<u64> {
    (1..=k).map(|i| k * 10 + i).collect()
}

struct Harness {
    r: Reconciler<MemoryDocument>,
    outstanding: Vec<(FetchTicket, SelectionKey)>,
    timers: Vec<TimerTicket>,
}

impl Harness {
    fn absorb(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartFetch { ticket, key, .. } => {
                    // cleared before the fetch can possibly resolve
                    assert!(self.r.state().applied_items().is_empty());
                    assert!(!self.r.state().structure_present() || self.r.needs_sweep());
                    self.outstanding.push((ticket, key));
                }
                Effect::ArmDebounce { ticket, .. } => self.timers.push(ticket),
                Effect::CancelDebounce { .. } => {}
            }
        }
    }

    fn resolve_at(&mut self, n: usize, fail: bool) {
        if self.outstanding.is_empty() {
            return;
        }
        let (ticket, k) = self.outstanding.remove(n % self.outstanding.len());
        let result = if fail {
            Err(TransportError::network("reset"))
        } else {
            let id = k.collection_id().map_or(0, |c| c.0);
            found(&catalog(id))
        };
        let effects = self.r.dispatch(Event::ItemListResolved {
            ticket,
            key: k,
            result,
        });
        self.absorb(effects);
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Select(k) => {
                let effects = self.r.select(k.map(key));
                self.absorb(effects);
            }
            Op::Retrigger => {
                let effects = self.r.retrigger();
                self.absorb(effects);
            }
            Op::Resolve(n) => self.resolve_at(n, false),
            Op::Fail(n) => self.resolve_at(n, true),
            Op::Fire(n) => {
                if !self.timers.is_empty() {
                    let ticket = self.timers[n % self.timers.len()];
                    let effects = self.r.dispatch(Event::DebounceElapsed { ticket });
                    self.absorb(effects);
                }
            }
            Op::Config(columns) => {
                let effects = self
                    .r
                    .set_shared_config(SharedConfig::default().with_columns(columns));
                self.absorb(effects);
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_invariants_hold_and_latest_key_wins(
        ops in prop::collection::vec(op(), 1..60),
        debounce in prop_oneof![Just(0u64), Just(150u64)],
    ) {
        let mut h = Harness { r: reconciler(debounce), outstanding: Vec::new(), timers: Vec::new() };

        for op in ops {
            h.apply(op);
            prop_assert!(h.r.check_invariants().is_ok(), "{:?}", h.r.check_invariants());
            prop_assert!(h.r.journal().verify_brackets().is_ok());
        }

        // settle: answer every outstanding fetch successfully, then fire what is armed
        while !h.outstanding.is_empty() {
            h.resolve_at(0, false);
        }
        if let Some(ticket) = h.r.pending_debounce() {
            let effects = h.r.dispatch(Event::DebounceElapsed { ticket });
            h.absorb(effects);
        }
        prop_assert!(h.r.check_invariants().is_ok());

        let expected: Vec<u64> = match (h.r.desired().key.clone(), h.r.phase()) {
            (Some(k), Phase::Steady) => catalog(k.collection_id().map_or(0, |c| c.0)),
            _ => Vec::new(),
        };
        let shown: Vec<u64> = h.r.rendered_items().unwrap().into_iter().map(|i| i.0).collect();
        prop_assert_eq!(shown, expected);
        if let Some(k) = h.r.desired().key.clone() {
            if h.r.phase() == Phase::Steady {
                prop_assert_eq!(h.r.state().structural_key(), Some(&k));
            }
        }
    }
}
