//! Testing utilities for the treesync workspace
//!
//! Shared test helpers, fixtures, and assertions:
//! - [`ScriptedSource`]: item source answering from a per-key script, with delays
//! - [`FaultyStore`]: document store wrapper that refuses chosen writes
//! - fixtures building a region and keys

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use treesync_fetch::{FetchResponse, ItemSource, TransportError};
use treesync_model::{CollectionId, ItemId, ItemList, SelectionKey, SharedConfig};
use treesync_tree::{DocumentStore, Handle, MemoryDocument, NewNode, NodeView, StoreError};

/// One scripted answer
#[derive(Debug, Clone)]
pub struct Reply {
    pub result: Result<FetchResponse, TransportError>,
    pub delay: Duration,
}

impl Reply {
    pub fn items(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            result: Ok(FetchResponse::found(ItemList::from_ids(ids))),
            delay: Duration::ZERO,
        }
    }

    pub fn not_found() -> Self {
        Self {
            result: Ok(FetchResponse::not_found()),
            delay: Duration::ZERO,
        }
    }

    pub fn error(err: TransportError) -> Self {
        Self {
            result: Err(err),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Item source answering from a per-key script.
///
/// Replies for a key are consumed in order; the last one is repeated.
/// Unscripted keys answer "not found".
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<SelectionKey, VecDeque<Reply>>>,
    calls: Mutex<Vec<(SelectionKey, usize)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reply for `key`
    #[must_use]
    pub fn with(self, key: SelectionKey, reply: Reply) -> Self {
        self.push(key, reply);
        self
    }

    pub fn push(&self, key: SelectionKey, reply: Reply) {
        self.script.lock().entry(key).or_default().push_back(reply);
    }

    /// Every `(key, limit)` requested so far
    pub fn calls(&self) -> Vec<(SelectionKey, usize)> {
        self.calls.lock().clone()
    }

    fn next_reply(&self, key: &SelectionKey) -> Reply {
        let mut script = self.script.lock();
        match script.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(Reply::not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(Reply::not_found),
            None => Reply::not_found(),
        }
    }
}

#[async_trait::async_trait]
impl ItemSource for ScriptedSource {
    async fn fetch_item_list(
        &self,
        key: &SelectionKey,
        limit: usize,
    ) -> Result<FetchResponse, TransportError> {
        self.calls.lock().push((key.clone(), limit));
        let reply = self.next_reply(key);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// Which writes a [`FaultyStore`] refuses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Refuse inserts once this many have succeeded
    pub inserts_allowed: Option<usize>,
    pub refuse_removals: bool,
    /// Refuse config updates aimed at these nodes
    pub refuse_config_on: Vec<Handle>,
    /// Refuse config updates once this many have succeeded
    pub config_updates_allowed: Option<usize>,
}

/// Document store wrapper injecting write faults
#[derive(Debug, Clone)]
pub struct FaultyStore<S> {
    inner: S,
    plan: FaultPlan,
    inserts: usize,
    config_updates: usize,
}

impl<S: DocumentStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
            inserts: 0,
            config_updates: 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Replace the fault plan; the write counts restart
    pub fn set_plan(&mut self, plan: FaultPlan) {
        self.plan = plan;
        self.inserts = 0;
        self.config_updates = 0;
    }

    /// Stop refusing anything
    pub fn heal(&mut self) {
        self.set_plan(FaultPlan::default());
    }
}

impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    fn insert_node(
        &mut self,
        node: NewNode,
        index: usize,
        parent: Handle,
    ) -> Result<Handle, StoreError> {
        if self
            .plan
            .inserts_allowed
            .is_some_and(|allowed| self.inserts >= allowed)
        {
            return Err(StoreError::rejected("insert refused"));
        }
        let handle = self.inner.insert_node(node, index, parent)?;
        self.inserts += 1;
        Ok(handle)
    }

    fn remove_nodes(&mut self, handles: &[Handle]) -> Result<(), StoreError> {
        if self.plan.refuse_removals {
            return Err(StoreError::rejected("removal refused"));
        }
        self.inner.remove_nodes(handles)
    }

    fn update_node_config(
        &mut self,
        handle: Handle,
        config: &SharedConfig,
    ) -> Result<(), StoreError> {
        let exhausted = self
            .plan
            .config_updates_allowed
            .is_some_and(|allowed| self.config_updates >= allowed);
        if exhausted || self.plan.refuse_config_on.contains(&handle) {
            return Err(StoreError::rejected("config update refused"));
        }
        self.inner.update_node_config(handle, config)?;
        self.config_updates += 1;
        Ok(())
    }

    fn query_children(&self, parent: Handle) -> Result<Vec<NodeView>, StoreError> {
        self.inner.query_children(parent)
    }

    fn ancestor_chain(&self, handle: Handle) -> Result<Vec<NodeView>, StoreError> {
        self.inner.ancestor_chain(handle)
    }
}

/// Document with one top-level region
pub fn region_document() -> (MemoryDocument, Handle) {
    let mut doc = MemoryDocument::new();
    let region = doc.create_region(doc.root()).unwrap();
    (doc, region)
}

/// Document whose region sits inside a container of another region
pub fn embedded_region_document() -> (MemoryDocument, Handle) {
    let mut doc = MemoryDocument::new();
    let outer = doc.create_region(doc.root()).unwrap();
    let container = doc.insert_node(NewNode::Container, 0, outer).unwrap();
    let region = doc.create_region(container).unwrap();
    (doc, region)
}

pub fn key(id: u64) -> SelectionKey {
    SelectionKey::unnamed(CollectionId(id))
}

pub fn named_key(id: u64, name: &str) -> SelectionKey {
    SelectionKey::collection(CollectionId(id), name)
}

pub fn items(ids: &[u64]) -> ItemList {
    ItemList::from_ids(ids.iter().copied())
}

pub fn ids(ids: &[u64]) -> Vec<ItemId> {
    ids.iter().copied().map(ItemId).collect()
}

/// Content node handles under `region`, in container order
pub fn content_nodes<S: DocumentStore>(store: &S, region: Handle) -> Vec<Handle> {
    store
        .query_children(region)
        .unwrap()
        .into_iter()
        .filter(|v| v.kind.is_container())
        .filter_map(|c| {
            store
                .query_children(c.handle)
                .unwrap()
                .into_iter()
                .find(|v| v.kind.content().is_some())
                .map(|v| v.handle)
        })
        .collect()
}

/// Assert the region shows exactly `expected`, one container each, in order
#[track_caller]
pub fn assert_region_items<S: DocumentStore>(store: &S, region: Handle, expected: &[u64]) {
    let containers: Vec<NodeView> = store
        .query_children(region)
        .unwrap()
        .into_iter()
        .filter(|v| v.kind.is_container())
        .collect();
    let shown: Vec<ItemId> = containers
        .iter()
        .map(|c| {
            let children = store.query_children(c.handle).unwrap();
            assert_eq!(children.len(), 1, "{} should hold exactly one node", c.handle);
            children[0]
                .kind
                .item_id()
                .unwrap_or_else(|| panic!("{} does not hold a content node", c.handle))
        })
        .collect();
    assert_eq!(shown, ids(expected));
}
