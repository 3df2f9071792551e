//! evhist-core: Core types for category and systematic aware histogramming.
//!
//! This crate provides the data model used by the fill engine: ragged
//! per-event values, event and object masks, typed event views, axis and
//! histogram configuration, and weighted histogram storage.
//!

pub mod axis;
pub mod config;
pub mod error;
pub mod event;
pub mod histogram;
pub mod mask;
pub mod ragged;

pub use axis::{AxisKind, AxisSource, AxisSpec};
pub use config::{HistogramSpec, SystematicSet, VariationConfig, NOMINAL};
pub use error::{Error, Result};
pub use event::{Collection, Column, EventTable, EventView, FieldSource, MetaValue, Metadata};
pub use histogram::{FillColumn, Histogram, HistogramSet};
pub use mask::{CollapseMode, Mask, MaskProvider, Selection};
pub use ragged::{Ragged, Structure};
