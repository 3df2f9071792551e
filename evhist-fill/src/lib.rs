//! evhist-fill: Histogram fill engine.
//!
//! For every chunk of events the [`HistManager`] walks
//! histograms × categories × subsamples and:
//! - resolves the raw axis values ([`AxisResolver`]),
//! - applies the combined mask at the right level and flattens the
//!   columns, dropping rows with missing values ([`reconcile`]),
//! - plans one fill per variation slot ([`VariationDispatcher`]),
//! - aligns per-event weights with the flattened rows ([`WeightCache`]).
//!
//! Chunks are independent; [`accumulate_chunks`] fills them in parallel and
//! merges the results.
#![warn(missing_docs)]

pub mod correction;
pub mod dispatch;
pub mod manager;
pub mod reconcile;
pub mod resolver;
mod scheduler;
pub mod strategy;
pub mod weights;

pub use correction::{BinnedCorrection, BinnedFactors, CorrectionProvider};
pub use dispatch::{FillWeight, PlannedFill, ProcessingPass, SampleKind, VariationDispatcher};
pub use manager::{count_rows, FillInputs, FillSummary, HistManager, SampleInfo};
pub use reconcile::{reconcile, FillPlan, PlanColumn, SelectionKind};
pub use resolver::{AxisResolver, ResolvedAxes};
pub use scheduler::accumulate_chunks;
pub use strategy::{CategoryStrategy, RemappedView, StrategyTable};
pub use weights::{
    FillContext, WeightCache, WeightKey, WeightOrigin, WeightProvider, WeightSet,
    WeightVariationTable,
};

// Re-export the data model
pub use evhist_core::{Error, Result};
