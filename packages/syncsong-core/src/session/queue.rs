//! Ordered shared queue of a session.

use std::collections::HashSet;

use crate::model::{QueueId, QueueItem};

/// Playback-ordered queue. Mutated only by append, remove-by-id and
/// reorder-by-id-list; no operation ever drops an item it was not asked to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queue {
    items: Vec<QueueItem>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    /// Removes the item with `queue_id`, returning it if present.
    pub fn remove(&mut self, queue_id: &str) -> Option<QueueItem> {
        let index = self.position(queue_id)?;
        Some(self.items.remove(index))
    }

    pub fn position(&self, queue_id: &str) -> Option<usize> {
        self.items.iter().position(|q| q.queue_id == queue_id)
    }

    /// Rebuilds the queue following `order`.
    ///
    /// Unknown and repeated ids are ignored; items missing from `order` are
    /// appended in their prior relative order.
    pub fn reorder(&mut self, order: &[QueueId]) {
        let mut placed: HashSet<&str> = HashSet::with_capacity(self.items.len());
        let mut next: Vec<usize> = Vec::with_capacity(self.items.len());

        for id in order {
            if placed.contains(id.as_str()) {
                continue;
            }
            if let Some(index) = self.position(id) {
                placed.insert(id.as_str());
                next.push(index);
            }
        }
        for (index, item) in self.items.iter().enumerate() {
            if !placed.contains(item.queue_id.as_str()) {
                next.push(index);
            }
        }

        let mut old: Vec<Option<QueueItem>> = std::mem::take(&mut self.items)
            .into_iter()
            .map(Some)
            .collect();
        self.items = next.into_iter().filter_map(|i| old[i].take()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddedBy, Track};

    fn item(id: &str) -> QueueItem {
        QueueItem {
            queue_id: id.into(),
            track: Track {
                title: format!("title-{id}"),
                artist: "artist".into(),
                ..Default::default()
            },
            added_by: AddedBy {
                user_id: "u".into(),
                display_name: "U".into(),
            },
            added_at: 0,
        }
    }

    fn queue(ids: &[&str]) -> Queue {
        let mut q = Queue::new();
        for id in ids {
            q.push(item(id));
        }
        q
    }

    fn ids(q: &Queue) -> Vec<&str> {
        q.items().iter().map(|i| i.queue_id.as_str()).collect()
    }

    fn order(ids: &[&str]) -> Vec<QueueId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_reorder_is_applied() {
        let mut q = queue(&["a", "b", "c"]);
        q.reorder(&order(&["c", "a", "b"]));
        assert_eq!(ids(&q), ["c", "a", "b"]);
    }

    #[test]
    fn partial_reorder_appends_missing_in_prior_order() {
        let mut q = queue(&["a", "b", "c", "d"]);
        q.reorder(&order(&["d", "b"]));
        assert_eq!(ids(&q), ["d", "b", "a", "c"]);
    }

    #[test]
    fn reorder_never_changes_length() {
        let all = ["a", "b", "c", "d", "e"];
        for take in 0..all.len() {
            let mut q = queue(&all);
            let subset: Vec<&str> = all.iter().rev().take(take).copied().collect();
            q.reorder(&order(&subset));
            assert_eq!(q.len(), all.len());
        }
    }

    #[test]
    fn unknown_and_repeated_ids_are_ignored() {
        let mut q = queue(&["a", "b"]);
        q.reorder(&order(&["zzz", "b", "b", "a", "b"]));
        assert_eq!(ids(&q), ["b", "a"]);
    }

    #[test]
    fn remove_returns_item_and_keeps_order() {
        let mut q = queue(&["a", "b", "c"]);
        assert_eq!(q.remove("b").map(|i| i.queue_id), Some("b".to_string()));
        assert!(q.remove("b").is_none());
        assert_eq!(ids(&q), ["a", "c"]);
    }
}
