//! Pending queue: three priority bands drained High, Normal, Low.
//!
//! High keeps arrival order, Low appends, and Normal follows the configured
//! execution order (FIFO appends, LIFO prepends).

use std::collections::VecDeque;

use crate::config::ExecutionOrder;
use crate::request::Priority;

use super::operation::OperationId;

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    high: VecDeque<OperationId>,
    normal: VecDeque<OperationId>,
    low: VecDeque<OperationId>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, id: OperationId, priority: Priority, order: ExecutionOrder) {
        match (priority, order) {
            (Priority::High, _) => self.high.push_back(id),
            (Priority::Low, _) => self.low.push_back(id),
            (Priority::Normal, ExecutionOrder::Fifo) => self.normal.push_back(id),
            (Priority::Normal, ExecutionOrder::Lifo) => self.normal.push_front(id),
        }
    }

    /// Head of the queue: first entry of the highest non-empty band.
    pub(crate) fn pop_next(&mut self) -> Option<OperationId> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    pub(crate) fn remove(&mut self, id: OperationId) -> bool {
        for band in [&mut self.high, &mut self.normal, &mut self.low] {
            if let Some(pos) = band.iter().position(|&x| x == id) {
                band.remove(pos);
                return true;
            }
        }
        false
    }

    /// Move a queued entry into a different band. No-op if `id` is not queued.
    pub(crate) fn promote(&mut self, id: OperationId, priority: Priority, order: ExecutionOrder) -> bool {
        if !self.remove(id) {
            return false;
        }
        self.push(id, priority, order);
        true
    }

    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.iter().any(|x| x == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in the order they would start.
    pub(crate) fn iter(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.high
            .iter()
            .chain(self.normal.iter())
            .chain(self.low.iter())
            .copied()
    }

    pub(crate) fn clear(&mut self) {
        self.high.clear();
        self.normal.clear();
        self.low.clear();
    }
}
