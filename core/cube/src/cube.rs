//! FILENAME: core/cube/src/cube.rs
//! Cube - the tree container handed to the summary engine.
//!
//! Holds the global totals used to normalize costs, the node arena, and the
//! single-dimension cost list used for gainer/loser ranking.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cost::compare_f64;
use crate::dimensions::Dimensions;
use crate::node::{CubeNode, CubeTree, NodeId};

// ============================================================================
// COST ENTRIES
// ============================================================================

/// Cost of one single-dimension slice, e.g. `country = US`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimNameValueCostEntry {
    pub dimension_name: String,
    pub dimension_value: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub baseline_size: f64,
    pub current_size: f64,
    /// Share of the global size: (baseline + current size) / global sizes.
    pub size_factor: f64,
    pub cost: f64,
}

impl fmt::Display for DimNameValueCostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} baseline={} current={} size_factor={:.4} cost={:.4}",
            self.dimension_name,
            self.dimension_value,
            self.baseline_value,
            self.current_value,
            self.size_factor,
            self.cost
        )
    }
}

/// Sum of the slice costs of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCost {
    pub name: String,
    pub cost: f64,
}

impl DimensionCost {
    pub fn new(name: impl Into<String>, cost: f64) -> Self {
        DimensionCost {
            name: name.into(),
            cost,
        }
    }
}

/// Sorts cost entries by cost, largest first. The sort is stable, so ties
/// keep their input order; NaN costs rank above every finite cost.
pub fn sort_cost_entries(entries: &mut [DimNameValueCostEntry]) {
    entries.sort_by(|a, b| compare_f64(b.cost, a.cost));
}

/// Sums slice costs per dimension and sorts the dimensions by that sum,
/// largest first. Dimensions keep first-appearance order on ties.
pub fn calculate_sorted_dimension_cost(cost_set: &[DimNameValueCostEntry]) -> Vec<DimensionCost> {
    let mut position: FxHashMap<&str, usize> = FxHashMap::default();
    let mut dimension_costs: Vec<DimensionCost> = Vec::new();
    for entry in cost_set {
        match position.get(entry.dimension_name.as_str()) {
            Some(&i) => dimension_costs[i].cost += entry.cost,
            None => {
                position.insert(entry.dimension_name.as_str(), dimension_costs.len());
                dimension_costs.push(DimensionCost::new(entry.dimension_name.clone(), entry.cost));
            }
        }
    }
    dimension_costs.sort_by(|a, b| compare_f64(b.cost, a.cost));
    dimension_costs
}

// ============================================================================
// CUBE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Cube {
    dimensions: Dimensions,
    tree: CubeTree,
    baseline_total: f64,
    current_total: f64,
    baseline_total_size: f64,
    current_total_size: f64,
    cost_set: Vec<DimNameValueCostEntry>,
    dimension_costs: Vec<DimensionCost>,
}

impl Cube {
    /// Assembles a cube from an already linked tree. Totals are taken from
    /// the root's original values; `cost_set` is sorted here.
    pub fn new(dimensions: Dimensions, tree: CubeTree, mut cost_set: Vec<DimNameValueCostEntry>) -> Self {
        let totals = *tree.node(tree.root()).original_values();
        sort_cost_entries(&mut cost_set);
        let dimension_costs = calculate_sorted_dimension_cost(&cost_set);
        Cube {
            dimensions,
            tree,
            baseline_total: totals.baseline_value(),
            current_total: totals.current_value(),
            baseline_total_size: totals.baseline_size(),
            current_total_size: totals.current_size(),
            cost_set,
            dimension_costs,
        }
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn tree(&self) -> &CubeTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut CubeTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn root_node(&self) -> &CubeNode {
        self.tree.node(self.tree.root())
    }

    pub fn baseline_total(&self) -> f64 {
        self.baseline_total
    }

    pub fn current_total(&self) -> f64 {
        self.current_total
    }

    pub fn baseline_total_size(&self) -> f64 {
        self.baseline_total_size
    }

    pub fn current_total_size(&self) -> f64 {
        self.current_total_size
    }

    /// Single-dimension slices sorted by cost, largest first.
    pub fn cost_set(&self) -> &[DimNameValueCostEntry] {
        &self.cost_set
    }

    /// Per-dimension cost totals sorted by cost, largest first.
    pub fn sorted_dimension_costs(&self) -> &[DimensionCost] {
        &self.dimension_costs
    }

    /// Restores every node from its original snapshot so the cube can be
    /// summarized again.
    pub fn reset_working_values(&mut self) {
        self.tree.reset_working_values();
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deepest = self.tree.iter().map(|(_, n)| n.level()).max().unwrap_or(0);
        let detailed_rows = self.tree.iter().filter(|(_, n)| n.level() == deepest).count();
        writeln!(f, "Baseline Value: {}", self.baseline_total)?;
        writeln!(f, "Current Value: {}", self.current_total)?;
        writeln!(f, "Change Ratio: {}", self.current_total / self.baseline_total)?;
        writeln!(f, "Dimensions: {}", self.dimensions)?;
        write!(f, "#Detailed Rows: {}", detailed_rows)
    }
}
