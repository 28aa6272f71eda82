use mockall::mock;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use treesync_core::{
    spawn_region, JournalEntry, Phase, ReconcileError, Reconciler, RegionError, SyncConfig,
};
use treesync_fetch::{FetchResponse, ItemFetcher, ItemSource, TransportError};
use treesync_model::{ItemList, SelectionKey, SharedConfig};
use treesync_test_utils::{assert_region_items, key, region_document, Reply, ScriptedSource};
use treesync_tree::MemoryDocument;

mock! {
    Source {}

    #[async_trait::async_trait]
    impl ItemSource for Source {
        async fn fetch_item_list(
            &self,
            key: &SelectionKey,
            limit: usize,
        ) -> Result<FetchResponse, TransportError>;
    }
}

fn reconciler(config: SyncConfig) -> Reconciler<MemoryDocument> {
    let (doc, region) = region_document();
    Reconciler::new(doc, region, config)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn fetch_then_debounce_then_build() {
    let source = ScriptedSource::new().with(key(5), Reply::items([1, 2, 3]).after(ms(50)));
    let (handle, task) = spawn_region(
        reconciler(SyncConfig::new().with_debounce(ms(150))),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(5))).await.unwrap();
    tokio::time::sleep(ms(10)).await;
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Loading);
    assert!(snap.pending_fetch.is_some());

    // fetch resolved, debounce still running
    tokio::time::sleep(ms(100)).await;
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Loading);
    assert!(snap.pending_debounce.is_some());
    assert!(!snap.state.structure_present());

    tokio::time::sleep(ms(200)).await;
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Steady);
    assert_eq!(snap.state.applied_items(), &ItemList::from_ids([1, 2, 3]));

    let r = handle.shutdown().await.unwrap();
    assert_region_items(r.store(), r.region(), &[1, 2, 3]);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_stale_fetch_is_discarded() {
    let source = ScriptedSource::new()
        .with(key(1), Reply::items([11, 12]).after(ms(300)))
        .with(key(2), Reply::items([21]).after(ms(20)));
    let (handle, _task) = spawn_region(
        reconciler(SyncConfig::new().with_debounce(Duration::ZERO)),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(1))).await.unwrap();
    handle.select(Some(key(2))).await.unwrap();
    tokio::time::sleep(ms(1000)).await;

    let r = handle.shutdown().await.unwrap();
    assert_eq!(r.phase(), Phase::Steady);
    assert_region_items(r.store(), r.region(), &[21]);
    assert!(r
        .journal()
        .entries()
        .contains(&JournalEntry::FetchDiscarded { ticket: 0 }));
}

#[tokio::test(start_paused = true)]
async fn rapid_switch_during_debounce_converges() {
    let source = ScriptedSource::new()
        .with(key(5), Reply::items([1, 2, 3]).after(ms(10)))
        .with(key(7), Reply::items([70, 71]).after(ms(10)));
    let (handle, _task) = spawn_region(
        reconciler(SyncConfig::new().with_debounce(ms(150))),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(5))).await.unwrap();
    tokio::time::sleep(ms(50)).await;
    handle.select(Some(key(7))).await.unwrap();
    tokio::time::sleep(ms(1000)).await;

    let r = handle.shutdown().await.unwrap();
    assert_region_items(r.store(), r.region(), &[70, 71]);
    assert_eq!(r.state().structural_key(), Some(&key(7)));
    assert!(r.journal().verify_brackets().is_ok());
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout_surfaces_as_transport_error() {
    let source = ScriptedSource::new().with(key(5), Reply::items([1]).after(ms(5_000)));
    let (handle, _task) = spawn_region(
        reconciler(SyncConfig::new().with_fetch_timeout(ms(100))),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(5))).await.unwrap();
    tokio::time::sleep(ms(200)).await;

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Error);
    match snap.error {
        Some(ReconcileError::Transport { key: k, source }) => {
            assert_eq!(k, key(5));
            assert_eq!(source, TransportError::Timeout { after_ms: 100 });
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn config_edits_propagate_through_handle() {
    let source = ScriptedSource::new().with(key(5), Reply::items([1, 2]));
    let (handle, _task) = spawn_region(
        reconciler(SyncConfig::new().with_debounce(Duration::ZERO)),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(5))).await.unwrap();
    tokio::time::sleep(ms(10)).await;
    handle
        .set_config_json(&serde_json::json!({ "heading": "Chef's picks", "show_badges": "yes" }))
        .await
        .unwrap();

    let r = handle.shutdown().await.unwrap();
    let expected = SharedConfig {
        show_badges: true,
        ..SharedConfig::default().with_heading("Chef's picks")
    };
    assert_eq!(r.store().rendered_configs(r.region()), vec![expected; 2]);
}

#[tokio::test(start_paused = true)]
async fn fetch_requests_configured_oversubscription() {
    let source = Arc::new(ScriptedSource::new().with(key(5), Reply::items(1..=20)));
    let config = SyncConfig {
        oversubscribe_factor: 5,
        ..SyncConfig::new().with_limit(2).with_debounce(Duration::ZERO)
    };
    let (handle, _task) = spawn_region(reconciler(config), ItemFetcher::new(source.clone()));

    handle.select(Some(key(5))).await.unwrap();
    tokio::time::sleep(ms(10)).await;

    let r = handle.shutdown().await.unwrap();
    assert_eq!(source.calls(), vec![(key(5), 10)]);
    assert_region_items(r.store(), r.region(), &[1, 2]);
}

#[tokio::test]
async fn retrigger_fetches_again() {
    let mut source = MockSource::new();
    source
        .expect_fetch_item_list()
        .with(eq(key(5)), eq(24))
        .times(2)
        .returning(|_, _| Ok(FetchResponse::found(ItemList::from_ids([4, 5]))));

    let (handle, _task) = spawn_region(
        reconciler(SyncConfig::new().with_debounce(Duration::ZERO)),
        ItemFetcher::new(Arc::new(source)),
    );

    handle.select(Some(key(5))).await.unwrap();
    wait_for_phase(&handle, Phase::Steady).await;
    handle.retrigger().await.unwrap();
    wait_for_phase(&handle, Phase::Steady).await;

    let r = handle.shutdown().await.unwrap();
    assert_region_items(r.store(), r.region(), &[4, 5]);
    let started = r
        .journal()
        .entries()
        .into_iter()
        .filter(|e| matches!(e, JournalEntry::FetchStarted { .. }))
        .count();
    assert_eq!(started, 2);
}

#[tokio::test]
async fn closed_region_reports_closed() {
    let (handle, task) = spawn_region(
        reconciler(SyncConfig::new()),
        ItemFetcher::new(Arc::new(ScriptedSource::new())),
    );
    let other = handle.clone();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(other.select(None).await, Err(RegionError::Closed));
    assert_eq!(other.snapshot().await.unwrap_err(), RegionError::Closed);
}

async fn wait_for_phase(handle: &treesync_core::RegionHandle<MemoryDocument>, phase: Phase) {
    for _ in 0..100 {
        if handle.snapshot().await.unwrap().phase == phase {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("region never reached {phase:?}");
}
