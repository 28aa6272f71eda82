//! Transition journal
//!
//! Bounded, append-only record of what the reconciler did: phase changes,
//! fetch tickets, mutation brackets and propagations. Oldest entries are
//! dropped once capacity is reached; sequence numbers keep counting.

use crate::state::{MutationKind, Phase};
use parking_lot::Mutex;
use std::collections::VecDeque;
use treesync_model::SelectionKey;

/// One journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// Phase changed
    Phase { from: Phase, to: Phase },
    /// Applied list and structure flag cleared for a new selection
    Cleared { key: Option<SelectionKey> },
    /// Fetch issued
    FetchStarted { ticket: u64, key: SelectionKey },
    /// Fetch result ignored because it no longer matches the selection
    FetchDiscarded { ticket: u64 },
    /// Mutation flag acquired
    MutationBegin { kind: MutationKind },
    /// Mutation flag released
    MutationEnd { kind: MutationKind },
    /// Shared config written onto `nodes` content nodes
    Propagated { nodes: usize },
}

/// Entry with its sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub seq: u64,
    pub entry: JournalEntry,
}

/// Problems found by [`Journal::verify_brackets`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BracketViolation {
    /// Begin while another mutation was open
    #[error("mutation began at seq {seq} while another was open")]
    Overlap { seq: u64 },
    /// End without a matching begin
    #[error("mutation ended at seq {seq} without a begin")]
    Unopened { seq: u64 },
    /// End of a different kind than the open begin
    #[error("mutation end at seq {seq} does not match open {open:?}")]
    Mismatch { seq: u64, open: MutationKind },
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<Record>,
    next_seq: u64,
}

/// Bounded in-memory journal
#[derive(Debug)]
pub struct Journal {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl Journal {
    /// Create journal keeping at most `capacity` entries
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, returning its sequence number
    pub fn record(&self, entry: JournalEntry) -> u64 {
        let mut guard = self.inner.lock();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        if guard.entries.len() == self.capacity {
            guard.entries.pop_front();
        }
        guard.entries.push_back(Record { seq, entry });
        seq
    }

    /// Retained entries, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// Retained entries without sequence numbers
    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|r| r.entry.clone())
            .collect()
    }

    /// Number of entries ever recorded
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Check that mutation brackets never overlap and always close.
    ///
    /// A bracket open at the very end is allowed (mutation in flight).
    /// If older entries were evicted, checking starts at the first begin.
    ///
    /// # Errors
    /// The first [`BracketViolation`] found
    pub fn verify_brackets(&self) -> Result<(), BracketViolation> {
        let guard = self.inner.lock();
        let evicted = guard.next_seq > guard.entries.len() as u64;
        let mut open: Option<MutationKind> = None;
        let mut synced = !evicted;

        for record in &guard.entries {
            match &record.entry {
                JournalEntry::MutationBegin { kind } => {
                    if open.is_some() {
                        return Err(BracketViolation::Overlap { seq: record.seq });
                    }
                    open = Some(*kind);
                    synced = true;
                }
                JournalEntry::MutationEnd { kind } => match open.take() {
                    Some(o) if o == *kind => {}
                    Some(o) => {
                        return Err(BracketViolation::Mismatch {
                            seq: record.seq,
                            open: o,
                        })
                    }
                    None if synced => return Err(BracketViolation::Unopened { seq: record.seq }),
                    None => {}
                },
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_sequenced() {
        let journal = Journal::default();
        assert_eq!(journal.record(JournalEntry::FetchDiscarded { ticket: 1 }), 0);
        assert_eq!(journal.record(JournalEntry::FetchDiscarded { ticket: 2 }), 1);
        assert_eq!(journal.records()[1].seq, 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let journal = Journal::with_capacity(2);
        for ticket in 0..5 {
            journal.record(JournalEntry::FetchDiscarded { ticket });
        }
        assert_eq!(
            journal.entries(),
            vec![
                JournalEntry::FetchDiscarded { ticket: 3 },
                JournalEntry::FetchDiscarded { ticket: 4 },
            ]
        );
        assert_eq!(journal.total_recorded(), 5);
    }

    #[test]
    fn well_formed_brackets_verify() {
        let journal = Journal::default();
        journal.record(JournalEntry::MutationBegin { kind: MutationKind::Teardown });
        journal.record(JournalEntry::MutationEnd { kind: MutationKind::Teardown });
        journal.record(JournalEntry::MutationBegin { kind: MutationKind::Build });
        assert!(journal.verify_brackets().is_ok());
    }

    #[test]
    fn overlapping_brackets_are_detected() {
        let journal = Journal::default();
        journal.record(JournalEntry::MutationBegin { kind: MutationKind::Build });
        journal.record(JournalEntry::MutationBegin { kind: MutationKind::Teardown });
        assert_eq!(
            journal.verify_brackets(),
            Err(BracketViolation::Overlap { seq: 1 })
        );
    }

    #[test]
    fn unopened_end_is_detected() {
        let journal = Journal::default();
        journal.record(JournalEntry::MutationEnd { kind: MutationKind::Build });
        assert_eq!(
            journal.verify_brackets(),
            Err(BracketViolation::Unopened { seq: 0 })
        );
    }

    #[test]
    fn eviction_tolerates_leading_end() {
        let journal = Journal::with_capacity(2);
        journal.record(JournalEntry::MutationBegin { kind: MutationKind::Build });
        journal.record(JournalEntry::MutationEnd { kind: MutationKind::Build });
        journal.record(JournalEntry::Propagated { nodes: 3 });
        assert!(journal.verify_brackets().is_ok());
    }
}
