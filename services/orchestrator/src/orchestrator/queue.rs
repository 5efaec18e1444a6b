//! Pending task queue.
//!
//! Ordered by priority (higher first), then by submission sequence. A task
//! that goes back into the queue keeps its original sequence, so it returns
//! to the position it held instead of jumping ahead of older work.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use eco_id::TaskId;

use crate::model::TaskRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    sequence: u64,
}

impl QueueKey {
    fn of(task: &TaskRequest) -> Self {
        Self {
            priority: Reverse(task.priority),
            sequence: task.sequence,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: BTreeMap<QueueKey, TaskRequest>,
    index: HashMap<TaskId, QueueKey>,
}

impl PendingQueue {
    pub(crate) fn push(&mut self, task: TaskRequest) {
        let key = QueueKey::of(&task);
        self.index.insert(task.id, key);
        self.entries.insert(key, task);
    }

    pub(crate) fn pop_front(&mut self) -> Option<TaskRequest> {
        let (_, task) = self.entries.pop_first()?;
        self.index.remove(&task.id);
        Some(task)
    }

    pub(crate) fn get(&self, id: &TaskId) -> Option<&TaskRequest> {
        self.index.get(id).and_then(|key| self.entries.get(key))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tasks in dequeue order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &TaskRequest> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CapabilitySet;

    fn task(priority: i32, sequence: u64) -> TaskRequest {
        let mut task = TaskRequest::new("t", CapabilitySet::new(), priority);
        task.sequence = sequence;
        task
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PendingQueue::default();
        let first = task(0, 1);
        let second = task(0, 2);
        let (first_id, second_id) = (first.id, second.id);
        queue.push(second);
        queue.push(first);

        assert_eq!(queue.pop_front().unwrap().id, first_id);
        assert_eq!(queue.pop_front().unwrap().id, second_id);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PendingQueue::default();
        let low = task(1, 1);
        let high = task(5, 2);
        let high_id = high.id;
        queue.push(low);
        queue.push(high);
        assert_eq!(queue.pop_front().unwrap().id, high_id);
    }

    #[test]
    fn test_reinsert_restores_position() {
        let mut queue = PendingQueue::default();
        for seq in 1..=3 {
            queue.push(task(0, seq));
        }
        let head = queue.pop_front().unwrap();
        let head_id = head.id;
        queue.push(task(0, 4));
        queue.push(head);
        assert_eq!(queue.iter().next().unwrap().id, head_id);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_get_tracks_membership() {
        let mut queue = PendingQueue::default();
        let t = task(0, 1);
        let id = t.id;
        queue.push(t);
        assert!(queue.get(&id).is_some());
        queue.pop_front();
        assert!(queue.get(&id).is_none());
        assert_eq!(queue.len(), 0);
    }
}
