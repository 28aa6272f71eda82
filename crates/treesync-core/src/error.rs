//! Error types for treesync core
//!
//! Provides error handling for:
//! - Fetch failures and "no items" results surfaced to observers
//! - Faults raised by the host store during structural mutation
//! - Faults raised while propagating shared config
//! - Configuration loading
//! - The async region driver

use crate::state::Phase;
use treesync_fetch::TransportError;
use treesync_model::{ItemId, SelectionKey};
use treesync_tree::{Handle, StoreError};

/// What observers of a region see when something went wrong
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// The fetch failed outright
    #[error("could not load {}: {source}", .key.display_name())]
    Transport {
        key: SelectionKey,
        #[source]
        source: TransportError,
    },

    /// The fetch succeeded but reported no such collection or zero items
    #[error("no items found for {}", .key.display_name())]
    NotFound { key: SelectionKey },

    /// The host store threw during teardown or build
    #[error("tree mutation failed: {0}")]
    Mutation(#[from] MutationFault),

    /// The host store threw during config propagation
    #[error("config propagation failed: {0}")]
    Propagation(#[from] PropagationError),
}

impl ReconcileError {
    /// Whether this came from the fetch layer (terminal for that attempt)
    #[inline]
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::NotFound { .. })
    }

    /// Selection key the error refers to, if any
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&SelectionKey> {
        match self {
            Self::Transport { key, .. } | Self::NotFound { key } => Some(key),
            Self::Mutation(_) | Self::Propagation(_) => None,
        }
    }
}

/// Host store fault caught at the tree mutator boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationFault {
    /// Removing existing structure failed
    #[error("teardown failed: {0}")]
    Teardown(#[source] StoreError),

    /// Writing the node group for item number `index` failed
    #[error("build failed at item {index}: {source}")]
    Build {
        index: usize,
        #[source]
        source: StoreError,
    },
}

/// Faults of the attribute propagator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropagationError {
    /// No structure, or a structural mutation holds the flag
    #[error("propagation not allowed: structure absent or mutation in progress")]
    NotReady,

    /// A container does not hold exactly one content node
    #[error("{container} holds {contents} content nodes, expected 1")]
    Inconsistent { container: Handle, contents: usize },

    /// Reading the tree failed before any write
    #[error("could not read tree: {0}")]
    Read(#[source] StoreError),

    /// A write failed; earlier writes were rolled back if `rolled_back`
    #[error("write {failed_at} failed (rolled back: {rolled_back}): {source}")]
    Commit {
        failed_at: usize,
        rolled_back: bool,
        #[source]
        source: StoreError,
    },
}

/// Phase change outside the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: Phase,
    pub to: Phase,
}

/// A broken state/tree invariant, as found by
/// [`Reconciler::check_invariants`](crate::Reconciler::check_invariants)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// Flag still held between events
    #[error("mutation flag held while idle")]
    FlagHeld,

    /// Tree shape disagrees with the applied item list
    #[error("tree shows {found:?}, state expects {expected:?}")]
    StructureMismatch {
        expected: Vec<ItemId>,
        found: Vec<ItemId>,
    },

    /// `structural_key` set without structure, or the reverse
    #[error("structural key present = {key_present}, structure present = {structure_present}")]
    KeyWithoutStructure {
        key_present: bool,
        structure_present: bool,
    },

    /// A content node carries something other than the last written config
    #[error("content node under {container} carries a stale config")]
    StaleConfig { container: Handle },

    /// Reading the tree failed
    #[error("could not read tree: {0}")]
    Read(#[source] StoreError),
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Text is not valid TOML for the config shape
    #[error("config parse error: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl ConfigError {
    /// Create invalid value error
    #[inline]
    pub fn invalid(key: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors talking to a running region
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// The region task has stopped
    #[error("region task is no longer running")]
    Closed,
}
