//! FILENAME: core/summary-engine/src/lib.rs
//! Root-cause summary of a cube diff.
//!
//! Given a [`cube::Cube`] with baseline and current aggregates at every level
//! of a dimension hierarchy, this crate picks a small set of dimension-value
//! combinations that best explain the overall change and renders them as a
//! nested, ranked report with top gainers and losers.
//!
//! Layers:
//! - `definition`: Serializable request parameters (WHAT to summarize)
//! - `dp`: Bounded knapsack table used per hierarchy level
//! - `engine`: Bottom-up selection over the cube tree (HOW we select)
//! - `response_tree`: Display order of the selected rows
//! - `report`: Name tags, statistics, gainers and losers
//! - `view`: Display-ready output (WHAT we show)

pub mod definition;
pub mod dp;
pub mod engine;
pub mod error;
pub mod report;
pub mod response_tree;
pub mod view;

pub use definition::*;
pub use engine::{
    calculate_summary, calculate_summary_from_source, compute_summary, ConservationViolation,
    Summarizer,
};
pub use error::{Result, SummaryError};
pub use report::{
    compute_contribution_change, compute_contribution_to_overall_change,
    compute_percentage_change, round4,
};
pub use view::*;
