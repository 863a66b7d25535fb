//! FILENAME: core/cube/src/builder.rs
//! Cube Builder - links pre-aggregated rows into a cube tree.
//!
//! The data source delivers one row per (partial) dimension-value combination
//! at every level of the hierarchy (`GROUP BY` the first L dimensions for
//! L = 0..=N). The builder:
//! 1. Groups the rows by level and sorts each level by [`DimensionValues`]
//! 2. Links every row to the row one level up whose values are its prefix
//! 3. Orders every child list by size, largest first
//! 4. Scores every single-dimension slice against the root's change ratio

use std::collections::BTreeMap;

use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cost::CostFunction;
use crate::cube::{Cube, DimNameValueCostEntry};
use crate::dimensions::{DimensionValues, Dimensions};
use crate::error::{CubeError, Result};
use crate::node::{CubeTree, NodeId, NodeValues};

/// Number of slice cost entries written to the log after a build.
const TOP_COST_ENTRIES_TO_LOG: usize = 20;

// ============================================================================
// INPUT ROWS
// ============================================================================

/// Numerator and denominator sums of a ratio metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioParts {
    pub baseline_numerator: f64,
    pub current_numerator: f64,
    pub baseline_denominator: f64,
    pub current_denominator: f64,
}

impl RatioParts {
    pub fn new(
        baseline_numerator: f64,
        current_numerator: f64,
        baseline_denominator: f64,
        current_denominator: f64,
    ) -> Self {
        RatioParts {
            baseline_numerator,
            current_numerator,
            baseline_denominator,
            current_denominator,
        }
    }

    pub fn node_values(&self) -> NodeValues {
        NodeValues::ratio(
            self.baseline_numerator,
            self.current_numerator,
            self.baseline_denominator,
            self.current_denominator,
        )
    }
}

/// One pre-aggregated row. Sizes default to the values (additive metric).
///
/// A row carrying `ratio` parts describes a ratio metric; its values and
/// sizes are derived from the parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeRow {
    /// Values of the first L dimensions; empty for the root row.
    #[serde(default)]
    pub dimension_values: DimensionValues,
    #[serde(default)]
    pub baseline_value: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioParts>,
}

impl CubeRow {
    pub fn new<I, S>(dimension_values: I, baseline_value: f64, current_value: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CubeRow {
            dimension_values: DimensionValues::new(dimension_values),
            baseline_value,
            current_value,
            baseline_size: None,
            current_size: None,
            ratio: None,
        }
    }

    /// A row of a ratio metric.
    pub fn ratio<I, S>(dimension_values: I, parts: RatioParts) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = parts.node_values();
        CubeRow {
            dimension_values: DimensionValues::new(dimension_values),
            baseline_value: values.baseline_value(),
            current_value: values.current_value(),
            baseline_size: Some(values.baseline_size()),
            current_size: Some(values.current_size()),
            ratio: Some(parts),
        }
    }

    /// Sets explicit sizes for a non-additive metric.
    pub fn with_sizes(mut self, baseline_size: f64, current_size: f64) -> Self {
        self.baseline_size = Some(baseline_size);
        self.current_size = Some(current_size);
        self
    }

    pub fn level(&self) -> usize {
        self.dimension_values.len()
    }

    pub fn node_values(&self) -> NodeValues {
        match &self.ratio {
            Some(parts) => parts.node_values(),
            None => NodeValues::new(
                self.baseline_value,
                self.current_value,
                self.baseline_size.unwrap_or(self.baseline_value),
                self.current_size.unwrap_or(self.current_value),
            ),
        }
    }
}

/// Aggregate of a single dimension value over the whole data set,
/// e.g. every row where `browser = chrome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSlice {
    pub dimension_name: String,
    pub dimension_value: String,
    #[serde(default)]
    pub baseline_value: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioParts>,
}

impl DimensionSlice {
    pub fn new(
        dimension_name: impl Into<String>,
        dimension_value: impl Into<String>,
        baseline_value: f64,
        current_value: f64,
    ) -> Self {
        DimensionSlice {
            dimension_name: dimension_name.into(),
            dimension_value: dimension_value.into(),
            baseline_value,
            current_value,
            baseline_size: None,
            current_size: None,
            ratio: None,
        }
    }

    /// Slice of a ratio metric.
    pub fn with_ratio(mut self, parts: RatioParts) -> Self {
        self.ratio = Some(parts);
        self
    }

    fn node_values(&self) -> NodeValues {
        match &self.ratio {
            Some(parts) => parts.node_values(),
            None => NodeValues::new(
                self.baseline_value,
                self.current_value,
                self.baseline_size.unwrap_or(self.baseline_value),
                self.current_size.unwrap_or(self.current_value),
            ),
        }
    }
}

/// Serialized form of a cube, as read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeSource {
    pub dimensions: Dimensions,
    pub rows: Vec<CubeRow>,
    /// Explicit single-dimension aggregates. Derived from the deepest rows
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_slices: Option<Vec<DimensionSlice>>,
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone)]
pub struct CubeBuilder {
    dimensions: Dimensions,
    rows: Vec<CubeRow>,
    slices: Option<Vec<DimensionSlice>>,
}

impl CubeBuilder {
    pub fn new(dimensions: Dimensions) -> Self {
        CubeBuilder {
            dimensions,
            rows: Vec::new(),
            slices: None,
        }
    }

    pub fn from_source(source: CubeSource) -> Self {
        CubeBuilder {
            dimensions: source.dimensions,
            rows: source.rows,
            slices: source.dimension_slices,
        }
    }

    pub fn row(mut self, row: CubeRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn rows<I: IntoIterator<Item = CubeRow>>(mut self, rows: I) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn dimension_slices(mut self, slices: Vec<DimensionSlice>) -> Self {
        self.slices = Some(slices);
        self
    }

    /// Links the rows into a cube and scores the single-dimension slices.
    pub fn build<C: CostFunction>(self, cost_function: &C) -> Result<Cube> {
        let CubeBuilder {
            dimensions,
            rows,
            slices,
        } = self;

        if dimensions.is_empty() {
            return Err(CubeError::EmptyDimensions);
        }
        if let Some(slices) = &slices {
            if let Some(unknown) = slices
                .iter()
                .find(|s| dimensions.index_of(&s.dimension_name).is_none())
            {
                return Err(CubeError::UnknownDimension(unknown.dimension_name.clone()));
            }
        }

        let ratio_rows = rows.iter().filter(|r| r.ratio.is_some()).count();
        if ratio_rows != 0 && ratio_rows != rows.len() {
            return Err(CubeError::MixedMetricKinds);
        }
        if let Some(slices) = &slices {
            let is_ratio = ratio_rows != 0;
            if slices.iter().any(|s| s.ratio.is_some() != is_ratio) {
                return Err(CubeError::MixedMetricKinds);
            }
        }

        let max_level = dimensions.len();
        let mut levels: Vec<Vec<CubeRow>> = vec![Vec::new(); max_level + 1];
        for row in rows {
            let level = row.level();
            if level > max_level {
                return Err(CubeError::RowTooDeep {
                    level,
                    max: max_level,
                });
            }
            levels[level].push(row);
        }

        let mut roots = std::mem::take(&mut levels[0]);
        let root_row = match roots.len() {
            0 => return Err(CubeError::MissingRoot),
            1 => roots.swap_remove(0),
            n => return Err(CubeError::MultipleRoots(n)),
        };

        let tree = link_rows(root_row.node_values(), &mut levels[1..]);
        info!("Size of the cube for generating summary: {}", tree.len());

        let totals = *tree.node(tree.root()).original_values();
        let slice_values = match slices {
            Some(slices) => slices
                .iter()
                .map(|s| (s.dimension_name.clone(), s.dimension_value.clone(), s.node_values()))
                .collect(),
            None => derive_slices(&dimensions, &tree),
        };
        let cost_set = compute_one_dimension_cost(&totals, slice_values, cost_function);

        let cube = Cube::new(dimensions, tree, cost_set);
        info!("Top {} nodes (depth=1):", TOP_COST_ENTRIES_TO_LOG);
        for entry in cube.cost_set().iter().take(TOP_COST_ENTRIES_TO_LOG) {
            info!("\t{}", entry);
        }
        Ok(cube)
    }
}

/// Links level 1..=N rows below the root. `levels[i]` holds the rows of level i+1.
fn link_rows(root_values: NodeValues, levels: &mut [Vec<CubeRow>]) -> CubeTree {
    let mut tree = CubeTree::with_root(root_values);
    let mut parents: FxHashMap<Vec<String>, NodeId> = FxHashMap::default();
    parents.insert(Vec::new(), tree.root());

    for rows in levels.iter_mut() {
        rows.sort_by(|a, b| a.dimension_values.cmp(&b.dimension_values));
        let mut next_parents: FxHashMap<Vec<String>, NodeId> = FxHashMap::default();
        for row in rows.iter() {
            let Some(&parent) = parents.get(row.dimension_values.parent_values()) else {
                debug!("Discarding row {} without a matching parent", row.dimension_values);
                continue;
            };
            let id = tree.add_child(parent, row.dimension_values.clone(), row.node_values());
            next_parents.insert(row.dimension_values.values().to_vec(), id);
        }
        parents = next_parents;
    }

    tree.sort_children_by_size();
    tree
}

/// Sums the deepest linked nodes per (dimension, value), values in order.
fn derive_slices(dimensions: &Dimensions, tree: &CubeTree) -> Vec<(String, String, NodeValues)> {
    let deepest = tree.iter().map(|(_, n)| n.level()).max().unwrap_or(0);
    let mut slices = Vec::new();
    for (i, name) in dimensions.names_to_depth(deepest).iter().enumerate() {
        let mut by_value: BTreeMap<&str, NodeValues> = BTreeMap::new();
        for (_, node) in tree.iter().filter(|(_, n)| n.level() == deepest) {
            if let Some(value) = node.dimension_values().get(i) {
                let values = node.original_values();
                by_value.entry(value).or_insert_with(|| values.empty_like()).add(values);
            }
        }
        slices.extend(
            by_value
                .into_iter()
                .map(|(value, values)| (name.clone(), value.to_string(), values)),
        );
    }
    slices
}

fn compute_one_dimension_cost<C: CostFunction>(
    totals: &NodeValues,
    slices: Vec<(String, String, NodeValues)>,
    cost_function: &C,
) -> Vec<DimNameValueCostEntry> {
    let top_ratio = totals.change_ratio();
    info!(
        "topBaselineValue:{}, topCurrentValue:{}, changeRatio:{}",
        totals.baseline_value(),
        totals.current_value(),
        top_ratio
    );
    let global_size = totals.total_size();

    slices
        .into_iter()
        .map(|(dimension_name, dimension_value, values)| {
            let cost = cost_function.compute_cost(
                top_ratio,
                values.baseline_value(),
                values.current_value(),
                values.baseline_size(),
                values.current_size(),
                totals.baseline_value(),
                totals.current_value(),
                totals.baseline_size(),
                totals.current_size(),
            );
            DimNameValueCostEntry {
                dimension_name,
                dimension_value,
                baseline_value: values.baseline_value(),
                current_value: values.current_value(),
                baseline_size: values.baseline_size(),
                current_size: values.current_size(),
                size_factor: values.total_size() / global_size,
                cost,
            }
        })
        .collect()
}
