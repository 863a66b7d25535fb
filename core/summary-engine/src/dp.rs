//! FILENAME: core/summary-engine/src/dp.rs
//! DP Array - bounded knapsack table used per hierarchy level.
//!
//! Slot `n` holds the smallest residual cost reachable when at most `n` of
//! the processed nodes are marked "explained", together with those nodes.
//! Slot 0 never explains anything and accumulates the cost of every node.
//! The answer of the array is the answer of its last active slot.

use cube::NodeId;
use rustc_hash::FxHashSet;

/// Cost and chosen nodes of one slot.
#[derive(Debug, Clone, Default)]
pub struct DpSlot {
    pub cost: f64,
    pub answer: FxHashSet<NodeId>,
}

/// How a candidate row enters a [`DpArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Always run the knapsack sweep for the node.
    Plain,
    /// Only nodes on `side`, or nodes below a selected ancestor on `side`,
    /// are swept; everything else is skipped.
    OneSide { side: bool },
}

#[derive(Debug, Clone)]
pub struct DpArray {
    slots: Vec<DpSlot>,
    shrink_size: usize,
    /// Change ratio the slots were last evaluated against.
    pub target_ratio: f64,
}

impl DpArray {
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "a DP array needs at least one slot");
        DpArray {
            slots: vec![DpSlot::default(); capacity],
            shrink_size: capacity,
            target_ratio: 1.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active slots.
    pub fn size(&self) -> usize {
        self.shrink_size
    }

    /// Limits the active slots; ignored unless `1 <= size <= capacity`.
    pub fn set_shrink_size(&mut self, size: usize) {
        if size >= 1 && size <= self.capacity() {
            self.shrink_size = size;
        }
    }

    pub fn slot(&self, n: usize) -> &DpSlot {
        &self.slots[n]
    }

    pub fn answer(&self) -> &FxHashSet<NodeId> {
        &self.slots[self.shrink_size - 1].answer
    }

    pub fn answer_mut(&mut self) -> &mut FxHashSet<NodeId> {
        &mut self.slots[self.shrink_size - 1].answer
    }

    /// Clears costs and answers, keeping the active size.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.cost = 0.0;
            slot.answer.clear();
        }
    }

    /// Clears everything and re-opens every slot.
    pub fn full_reset(&mut self) {
        self.reset();
        self.shrink_size = self.capacity();
        self.target_ratio = 1.0;
    }

    /// One knapsack sweep for a node whose residual cost is `cost`.
    ///
    /// For `n` from the last active slot down to 1 the node is either
    /// explained (`dp[n-1]` plus the node) or left unexplained (`dp[n]` plus
    /// `cost`), whichever is cheaper. NaN costs lose every comparison.
    pub fn sweep(&mut self, node: NodeId, cost: f64) {
        for n in (1..self.shrink_size).rev() {
            let keep_cost = self.slots[n - 1].cost;
            let skip_cost = self.slots[n].cost + cost;
            if cube::compare_f64(keep_cost, skip_cost).is_lt() {
                let (lower, upper) = self.slots.split_at_mut(n);
                let slot = &mut upper[0];
                slot.cost = keep_cost;
                slot.answer.clone_from(&lower[n - 1].answer);
                slot.answer.insert(node);
            } else {
                self.slots[n].cost = skip_cost;
            }
        }
        self.slots[0].cost += cost;
    }
}
