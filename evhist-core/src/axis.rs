//! Axis specifications and binning.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where an axis reads its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource<'a> {
    /// Event-level field.
    Events,
    /// Chunk metadata, broadcast to every event.
    Metadata,
    /// Caller-supplied per-event array.
    Custom,
    /// Field of a sub-object collection.
    Collection(&'a str),
}

/// Binning of one histogram axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum AxisKind {
    /// `bins` equal-width bins over `[start, stop)`.
    Regular {
        bins: usize,
        start: f64,
        stop: f64,
        #[cfg_attr(feature = "serde", serde(default = "default_flow"))]
        flow: bool,
    },
    /// Bins bounded by strictly increasing `edges`.
    Variable {
        edges: Vec<f64>,
        #[cfg_attr(feature = "serde", serde(default = "default_flow"))]
        flow: bool,
    },
    /// One bin per integer in `[start, stop)`.
    Integer {
        start: i64,
        stop: i64,
        #[cfg_attr(feature = "serde", serde(default = "default_flow"))]
        flow: bool,
    },
    /// Fixed string categories; unknown labels go to a trailing overflow slot.
    StrCategory { categories: Vec<String> },
}

#[cfg(feature = "serde")]
fn default_flow() -> bool {
    true
}

enum Located {
    Under,
    Bin(usize),
    Over,
}

impl AxisKind {
    /// Returns true for string category axes.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::StrCategory { .. })
    }

    /// Number of regular bins (categories for a category axis).
    #[must_use]
    pub fn bins(&self) -> usize {
        match self {
            Self::Regular { bins, .. } => *bins,
            Self::Variable { edges, .. } => edges.len().saturating_sub(1),
            Self::Integer { start, stop, .. } => (stop - start).max(0) as usize,
            Self::StrCategory { categories } => categories.len(),
        }
    }

    /// Returns true if the axis carries under/overflow bins.
    #[must_use]
    pub fn has_flow(&self) -> bool {
        match self {
            Self::Regular { flow, .. } | Self::Variable { flow, .. } | Self::Integer { flow, .. } => {
                *flow
            }
            Self::StrCategory { .. } => false,
        }
    }

    /// Number of storage slots, including flow bins.
    #[must_use]
    pub fn extent(&self) -> usize {
        match self {
            Self::StrCategory { categories } => categories.len() + 1,
            _ if self.has_flow() => self.bins() + 2,
            _ => self.bins(),
        }
    }

    /// Checks the binning definition.
    ///
    /// # Errors
    /// Returns an error if the axis has no bins or its bounds or edges are not increasing.
    pub fn validate(&self, axis: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidBinning {
            axis: axis.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::Regular {
                bins, start, stop, ..
            } => {
                if *bins == 0 {
                    return Err(invalid("at least one bin is required"));
                }
                if !(start.is_finite() && stop.is_finite() && start < stop) {
                    return Err(invalid("start must be finite and below stop"));
                }
            }
            Self::Variable { edges, .. } => {
                if edges.len() < 2 {
                    return Err(invalid("at least two edges are required"));
                }
                if edges.windows(2).any(|w| !(w[0] < w[1])) {
                    return Err(invalid("edges must be strictly increasing"));
                }
            }
            Self::Integer { start, stop, .. } => {
                if start >= stop {
                    return Err(invalid("start must be below stop"));
                }
            }
            Self::StrCategory { .. } => {}
        }
        Ok(())
    }

    fn locate(&self, value: f64) -> Located {
        if value.is_nan() {
            return Located::Over;
        }
        match self {
            Self::Regular {
                bins, start, stop, ..
            } => {
                if value < *start {
                    Located::Under
                } else if value >= *stop {
                    Located::Over
                } else {
                    let bin = ((value - start) / (stop - start) * *bins as f64) as usize;
                    Located::Bin(bin.min(bins - 1))
                }
            }
            Self::Variable { edges, .. } => {
                if value < edges[0] {
                    Located::Under
                } else if value >= edges[edges.len() - 1] {
                    Located::Over
                } else {
                    Located::Bin(edges.partition_point(|&edge| edge <= value) - 1)
                }
            }
            Self::Integer { start, stop, .. } => {
                let value = value.floor();
                if value < *start as f64 {
                    Located::Under
                } else if value >= *stop as f64 {
                    Located::Over
                } else {
                    Located::Bin((value as i64 - start) as usize)
                }
            }
            Self::StrCategory { .. } => Located::Over,
        }
    }

    /// Storage slot of a numeric value, or `None` if it falls outside an
    /// axis without flow bins.
    #[must_use]
    pub fn index(&self, value: f64) -> Option<usize> {
        let flow = self.has_flow();
        match self.locate(value) {
            Located::Bin(bin) => Some(if flow { bin + 1 } else { bin }),
            Located::Under => flow.then_some(0),
            Located::Over => flow.then(|| self.bins() + 1),
        }
    }

    /// Storage slot of a label on a category axis.
    #[must_use]
    pub fn label_index(&self, label: &str) -> Option<usize> {
        match self {
            Self::StrCategory { categories } => Some(
                categories
                    .iter()
                    .position(|c| c == label)
                    .unwrap_or(categories.len()),
            ),
            _ => None,
        }
    }
}

/// Specification of one histogram axis: where its values come from and how
/// they are binned.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisSpec {
    /// Collection name, or one of `events`, `metadata`, `custom`.
    pub coll: String,
    /// Field name within the collection.
    pub field: String,
    /// Fixed sub-object index; `None` takes all objects.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pos: Option<i64>,
    /// Binning.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: AxisKind,
    /// Axis name; defaults to `coll.field`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    /// Display label.
    #[cfg_attr(feature = "serde", serde(default))]
    pub label: Option<String>,
}

impl AxisSpec {
    /// Sentinel collection for event-level fields.
    pub const EVENTS: &'static str = "events";
    /// Sentinel collection for chunk metadata.
    pub const METADATA: &'static str = "metadata";
    /// Sentinel collection for caller-supplied fields.
    pub const CUSTOM: &'static str = "custom";

    /// Creates an axis reading `coll.field` with the given binning.
    pub fn new(coll: impl Into<String>, field: impl Into<String>, kind: AxisKind) -> Self {
        Self {
            coll: coll.into(),
            field: field.into(),
            pos: None,
            kind,
            name: None,
            label: None,
        }
    }

    /// Regular binning with flow bins.
    pub fn regular(
        coll: impl Into<String>,
        field: impl Into<String>,
        bins: usize,
        start: f64,
        stop: f64,
    ) -> Self {
        Self::new(
            coll,
            field,
            AxisKind::Regular {
                bins,
                start,
                stop,
                flow: true,
            },
        )
    }

    /// Variable binning with flow bins.
    pub fn variable(coll: impl Into<String>, field: impl Into<String>, edges: Vec<f64>) -> Self {
        Self::new(coll, field, AxisKind::Variable { edges, flow: true })
    }

    /// Integer binning with flow bins.
    pub fn integer(coll: impl Into<String>, field: impl Into<String>, start: i64, stop: i64) -> Self {
        Self::new(
            coll,
            field,
            AxisKind::Integer {
                start,
                stop,
                flow: true,
            },
        )
    }

    /// String category axis.
    pub fn categorical(
        coll: impl Into<String>,
        field: impl Into<String>,
        categories: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::new(
            coll,
            field,
            AxisKind::StrCategory {
                categories: categories.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Reads only the object at `pos`.
    #[must_use]
    pub fn with_pos(mut self, pos: i64) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Sets the axis name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Drops the under/overflow bins; out-of-range values are not filled.
    #[must_use]
    pub fn without_flow(mut self) -> Self {
        match &mut self.kind {
            AxisKind::Regular { flow, .. }
            | AxisKind::Variable { flow, .. }
            | AxisKind::Integer { flow, .. } => *flow = false,
            AxisKind::StrCategory { .. } => {}
        }
        self
    }

    /// Axis name.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.pos.is_some() => {
                format!("{}.{}[{}]", self.coll, self.field, self.pos.unwrap_or_default())
            }
            None => format!("{}.{}", self.coll, self.field),
        }
    }

    /// Parsed source of the axis values.
    #[must_use]
    pub fn source(&self) -> AxisSource<'_> {
        match self.coll.as_str() {
            Self::EVENTS => AxisSource::Events,
            Self::METADATA => AxisSource::Metadata,
            Self::CUSTOM => AxisSource::Custom,
            coll => AxisSource::Collection(coll),
        }
    }

    /// Returns true for string category axes.
    #[must_use]
    pub fn is_categorical(&self) -> bool {
        self.kind.is_categorical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_index_with_flow() {
        let axis = AxisSpec::regular("Jet", "pt", 4, 0.0, 100.0);
        assert_eq!(axis.kind.extent(), 6);
        assert_eq!(axis.kind.index(-1.0), Some(0));
        assert_eq!(axis.kind.index(0.0), Some(1));
        assert_eq!(axis.kind.index(24.9), Some(1));
        assert_eq!(axis.kind.index(25.0), Some(2));
        assert_eq!(axis.kind.index(99.9), Some(4));
        assert_eq!(axis.kind.index(100.0), Some(5));
        assert_eq!(axis.kind.index(f64::NAN), Some(5));
    }

    #[test]
    fn test_regular_index_without_flow() {
        let axis = AxisSpec::regular("Jet", "pt", 4, 0.0, 100.0).without_flow();
        assert_eq!(axis.kind.extent(), 4);
        assert_eq!(axis.kind.index(-1.0), None);
        assert_eq!(axis.kind.index(0.0), Some(0));
        assert_eq!(axis.kind.index(100.0), None);
    }

    #[test]
    fn test_variable_index() {
        let axis = AxisSpec::variable("Photon", "pt", vec![30.0, 40.0, 70.0, 200.0]);
        assert_eq!(axis.kind.bins(), 3);
        assert_eq!(axis.kind.index(35.0), Some(1));
        assert_eq!(axis.kind.index(40.0), Some(2));
        assert_eq!(axis.kind.index(150.0), Some(3));
        assert_eq!(axis.kind.index(250.0), Some(4));
        assert_eq!(axis.kind.index(10.0), Some(0));
    }

    #[test]
    fn test_integer_index() {
        let axis = AxisSpec::integer("events", "nJet", 0, 5);
        assert_eq!(axis.kind.bins(), 5);
        assert_eq!(axis.kind.index(0.0), Some(1));
        assert_eq!(axis.kind.index(4.0), Some(5));
        assert_eq!(axis.kind.index(5.0), Some(6));
        assert_eq!(axis.kind.index(-1.0), Some(0));
    }

    #[test]
    fn test_category_index() {
        let axis = AxisSpec::categorical("metadata", "year", ["2017", "2018"]);
        assert_eq!(axis.kind.extent(), 3);
        assert_eq!(axis.kind.label_index("2018"), Some(1));
        assert_eq!(axis.kind.label_index("2016"), Some(2));
    }

    #[test]
    fn test_validate() {
        assert!(AxisSpec::regular("a", "b", 0, 0.0, 1.0).kind.validate("x").is_err());
        assert!(AxisSpec::regular("a", "b", 2, 1.0, 1.0).kind.validate("x").is_err());
        assert!(AxisSpec::variable("a", "b", vec![1.0, 1.0]).kind.validate("x").is_err());
        assert!(AxisSpec::integer("a", "b", 3, 3).kind.validate("x").is_err());
        assert!(AxisSpec::variable("a", "b", vec![0.0, 1.0]).kind.validate("x").is_ok());
    }

    #[test]
    fn test_source_and_name() {
        assert_eq!(AxisSpec::regular("events", "met", 1, 0.0, 1.0).source(), AxisSource::Events);
        assert_eq!(AxisSpec::regular("custom", "x", 1, 0.0, 1.0).source(), AxisSource::Custom);
        let jet = AxisSpec::regular("JetGood", "pt", 1, 0.0, 1.0).with_pos(1);
        assert_eq!(jet.source(), AxisSource::Collection("JetGood"));
        assert_eq!(jet.name(), "JetGood.pt[1]");
        assert_eq!(jet.with_name("jet2_pt").name(), "jet2_pt");
    }
}
