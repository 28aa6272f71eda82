//! Item identifiers and ordered item lists

use crate::config::SharedConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of one external entity, rendered as one container/content pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Ordered sequence of item ids. Order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemList(Vec<ItemId>);

impl ItemList {
    /// Create empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw numeric ids
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self(ids.into_iter().map(ItemId).collect())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ItemId> {
        self.0.iter()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[ItemId] {
        &self.0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Drop repeated ids, keeping the first occurrence in place
    #[must_use]
    pub fn dedup_stable(self) -> Self {
        let mut seen = HashSet::with_capacity(self.0.len());
        Self(self.0.into_iter().filter(|id| seen.insert(*id)).collect())
    }

    /// Keep at most `limit` ids from the front
    #[must_use]
    pub fn truncated(mut self, limit: usize) -> Self {
        self.0.truncate(limit);
        self
    }
}

impl From<Vec<ItemId>> for ItemList {
    fn from(ids: Vec<ItemId>) -> Self {
        Self(ids)
    }
}

impl FromIterator<ItemId> for ItemList {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ItemList {
    type Item = &'a ItemId;
    type IntoIter = std::slice::Iter<'a, ItemId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for ItemList {
    type Item = ItemId;
    type IntoIter = std::vec::IntoIter<ItemId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Payload of a content node: the item it represents plus the shared config.
///
/// `item_id` is fixed at creation; only `config` is ever rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub config: SharedConfig,
}

impl ContentPayload {
    #[inline]
    #[must_use]
    pub fn new(item_id: ItemId, config: SharedConfig) -> Self {
        Self { item_id, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let list = ItemList::from_ids([3, 1, 3, 2, 1]).dedup_stable();
        assert_eq!(list, ItemList::from_ids([3, 1, 2]));
    }

    #[test]
    fn truncated_keeps_prefix() {
        let list = ItemList::from_ids([10, 20, 30]).truncated(2);
        assert_eq!(list, ItemList::from_ids([10, 20]));
        assert_eq!(ItemList::from_ids([10]).truncated(5).len(), 1);
    }

    #[test]
    fn payload_flattens_config() {
        let payload = ContentPayload::new(ItemId(4), SharedConfig::default());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["item_id"], 4);
        assert_eq!(json["show_title"], true);
    }

    proptest! {
        #[test]
        fn prop_dedup_then_truncate_is_ordered_subsequence(
            ids in proptest::collection::vec(0u64..20, 0..40),
            limit in 0usize..10,
        ) {
            let original = ItemList::from_ids(ids.clone());
            let trimmed = original.clone().dedup_stable().truncated(limit);

            prop_assert!(trimmed.len() <= limit);

            let mut cursor = original.iter();
            for id in &trimmed {
                prop_assert!(cursor.any(|o| o == id));
            }

            let unique: HashSet<_> = trimmed.iter().collect();
            prop_assert_eq!(unique.len(), trimmed.len());
        }
    }
}
