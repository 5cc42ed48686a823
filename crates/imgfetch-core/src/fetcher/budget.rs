//! Concurrency slots for executing operations.
//!
//! Lives inside the scheduler lock, so plain counters are enough. The limit
//! can change at any time; lowering it never interrupts running operations,
//! it only delays new starts until usage drops below the new limit.

#[derive(Debug)]
pub(crate) struct ConcurrencyBudget {
    limit: usize,
    in_use: usize,
    peak: usize,
}

impl ConcurrencyBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            in_use: 0,
            peak: 0,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    /// Highest `in_use` ever observed.
    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    /// Free slots. Zero while usage is at or above the limit.
    pub(crate) fn available(&self) -> usize {
        self.limit.saturating_sub(self.in_use)
    }

    /// Take one slot if any is free.
    pub(crate) fn try_acquire(&mut self) -> bool {
        if self.available() == 0 {
            return false;
        }
        self.in_use += 1;
        self.peak = self.peak.max(self.in_use);
        true
    }

    pub(crate) fn release(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let mut budget = ConcurrencyBudget::new(2);
        assert_eq!(budget.available(), 2);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.in_use(), 2);
        budget.release();
        assert_eq!(budget.available(), 1);
        budget.release();
        budget.release();
        assert_eq!(budget.in_use(), 0);
        assert_eq!(budget.peak(), 2);
    }

    #[test]
    fn lowering_limit_blocks_until_drained() {
        let mut budget = ConcurrencyBudget::new(3);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        budget.set_limit(1);
        assert_eq!(budget.available(), 0);
        budget.release();
        budget.release();
        assert!(!budget.try_acquire());
        budget.release();
        assert!(budget.try_acquire());
    }

    #[test]
    fn limit_is_at_least_one() {
        let mut budget = ConcurrencyBudget::new(0);
        assert_eq!(budget.limit(), 1);
        budget.set_limit(0);
        assert_eq!(budget.limit(), 1);
    }
}
