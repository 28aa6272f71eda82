//! Treesync Core
//!
//! Keeps the container/content nodes of one document region in step with
//! an asynchronously fetched item list, while shared display config is
//! edited alongside.
//!
//! # Core Concepts
//!
//! - [`Reconciler`]: explicit state machine over a closed event set,
//!   processed one event at a time from an ordered queue
//! - [`ReconciliationState`]: structural key, applied items, structure flag
//!   and the single mutation flag
//! - [`TreeMutator`]: the only structural writer; every teardown/build runs
//!   inside one [`MutationGuard`] bracket
//! - [`AttributePropagator`]: all-or-nothing config rewrite, never structural
//! - [`DesiredState`]: single-slot "latest desired" register; requests
//!   arriving while the flag is held are dropped, not queued
//! - [`DebounceTimer`]: cancellable timer, with tickets rejecting stale firings
//! - [`spawn_region`]: tokio driver running a reconciler as one actor
//! - [`Journal`]: bounded record of phases and mutation brackets
//!
//! # Example
//!
//! ```rust,ignore
//! use treesync_core::{spawn_region, Reconciler, SyncConfig};
//! use treesync_fetch::{HttpItemSource, ItemFetcher};
//! use treesync_model::{CollectionId, SelectionKey};
//! use treesync_tree::MemoryDocument;
//!
//! let mut doc = MemoryDocument::new();
//! let region = doc.create_region(doc.root())?;
//! let reconciler = Reconciler::new(doc, region, SyncConfig::new());
//! let fetcher = ItemFetcher::new(Arc::new(HttpItemSource::new("http://catalog.local/api")?));
//!
//! let (handle, _task) = spawn_region(reconciler, fetcher);
//! handle.select(Some(SelectionKey::collection(CollectionId(5), "Desserts"))).await?;
//! let snapshot = handle.snapshot().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod journal;
pub mod mutator;
pub mod propagator;
pub mod reconciler;
pub mod region;
pub mod state;
pub mod timer;

pub use config::SyncConfig;
pub use error::{
    ConfigError, IllegalTransition, InvariantViolation, MutationFault, PropagationError,
    ReconcileError, RegionError,
};
pub use journal::{BracketViolation, Journal, JournalEntry, Record};
pub use mutator::{BuildOutcome, TreeMutator};
pub use propagator::AttributePropagator;
pub use reconciler::{Effect, Event, Reconciler, Snapshot};
pub use region::{spawn_region, RegionHandle};
pub use state::{
    validate_transition, BuildPlan, DesiredState, MutationGuard, MutationKind, Phase,
    ReconciliationState,
};
pub use timer::{DebounceTimer, FetchTicket, TimerTicket};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{
        spawn_region, Effect, Event, Phase, ReconcileError, Reconciler, RegionHandle, Snapshot,
        SyncConfig,
    };
}
