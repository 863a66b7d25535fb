//! FILENAME: core/cube/src/lib.rs
//! Cube - hierarchical baseline/current aggregates for root-cause summaries.
//!
//! Architecture:
//! - dimensions: ordered dimension names and per-node value vectors
//! - node: the arena tree with working and original aggregates
//! - cost: the cost-function contract and the balanced cost function
//! - cube: the container with global totals and single-dimension costs
//! - builder: links pre-aggregated rows into a cube

pub mod builder;
pub mod cost;
pub mod cube;
pub mod dimensions;
pub mod error;
pub mod node;

pub use builder::{CubeBuilder, CubeRow, CubeSource, DimensionSlice, RatioParts};
pub use cost::{compare_f64, BalancedCostFunction, CostFunction, DEFAULT_MIN_CONTRIBUTION_PERCENTAGE};
pub use cube::{calculate_sorted_dimension_cost, Cube, DimNameValueCostEntry, DimensionCost};
pub use dimensions::{DimensionValues, Dimensions, ALL, EMPTY, NOT_ALL};
pub use error::{CubeError, Result};
pub use node::{CubeNode, CubeTree, NodeId, NodeValues};
