//! Histogram and systematic-variation configuration.

use indexmap::{IndexMap, IndexSet};

use crate::axis::AxisSpec;
use crate::error::{Error, Result};
use crate::mask::CollapseMode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label of the central variation.
pub const NOMINAL: &str = "nominal";

/// Configuration of one histogram variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HistogramSpec {
    /// Variable name.
    pub name: String,
    /// Filled axes, in fill order.
    pub axes: Vec<AxisSpec>,
    /// Filled by the orchestrator; otherwise the caller fills it by hand.
    pub autofill: bool,
    /// Fill with unit weights.
    pub no_weights: bool,
    /// Bookkeeping histogram filled outside the event loop.
    pub metadata_hist: bool,
    /// Allow reducing per-object masks to per-event masks.
    pub collapse_2d_masks: bool,
    /// Reduction used when `collapse_2d_masks` is set.
    pub collapse_2d_masks_mode: CollapseMode,
    /// Categories to book; `None` books all.
    pub only_categories: Option<Vec<String>>,
    /// Categories never booked.
    pub exclude_categories: Vec<String>,
    /// Variations to book besides nominal; `None` books all.
    pub only_variations: Option<Vec<String>>,
    /// Samples this histogram is booked for; `None` books all.
    pub only_samples: Option<Vec<String>>,
    /// Samples this histogram is never booked for.
    pub exclude_samples: Vec<String>,
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            axes: Vec::new(),
            autofill: true,
            no_weights: false,
            metadata_hist: false,
            collapse_2d_masks: false,
            collapse_2d_masks_mode: CollapseMode::Or,
            only_categories: None,
            exclude_categories: Vec::new(),
            only_variations: None,
            only_samples: None,
            exclude_samples: Vec::new(),
        }
    }
}

impl HistogramSpec {
    /// Creates a weighted, auto-filled histogram configuration.
    pub fn new(name: impl Into<String>, axes: Vec<AxisSpec>) -> Self {
        Self {
            name: name.into(),
            axes,
            ..Self::default()
        }
    }

    /// Fills with unit weights.
    #[must_use]
    pub fn with_no_weights(mut self) -> Self {
        self.no_weights = true;
        self
    }

    /// Excludes the histogram from automatic filling.
    #[must_use]
    pub fn with_autofill(mut self, autofill: bool) -> Self {
        self.autofill = autofill;
        self
    }

    /// Marks the histogram as a metadata histogram.
    #[must_use]
    pub fn with_metadata_hist(mut self) -> Self {
        self.metadata_hist = true;
        self
    }

    /// Allows per-object masks on per-event data, reduced with `mode`.
    #[must_use]
    pub fn with_collapse_2d_masks(mut self, mode: CollapseMode) -> Self {
        self.collapse_2d_masks = true;
        self.collapse_2d_masks_mode = mode;
        self
    }

    /// Restricts the booked categories.
    #[must_use]
    pub fn with_only_categories(mut self, categories: &[&str]) -> Self {
        self.only_categories = Some(categories.iter().map(ToString::to_string).collect());
        self
    }

    /// Excludes categories.
    #[must_use]
    pub fn with_exclude_categories(mut self, categories: &[&str]) -> Self {
        self.exclude_categories = categories.iter().map(ToString::to_string).collect();
        self
    }

    /// Restricts the booked variations (nominal is always booked).
    #[must_use]
    pub fn with_only_variations(mut self, variations: &[&str]) -> Self {
        self.only_variations = Some(variations.iter().map(ToString::to_string).collect());
        self
    }

    /// Restricts the samples the histogram is booked for.
    #[must_use]
    pub fn with_only_samples(mut self, samples: &[&str]) -> Self {
        self.only_samples = Some(samples.iter().map(ToString::to_string).collect());
        self
    }

    /// Excludes samples.
    #[must_use]
    pub fn with_exclude_samples(mut self, samples: &[&str]) -> Self {
        self.exclude_samples = samples.iter().map(ToString::to_string).collect();
        self
    }

    /// Returns true if `category` belongs on the category axis.
    #[must_use]
    pub fn accepts_category(&self, category: &str) -> bool {
        let allowed = self
            .only_categories
            .as_ref()
            .map_or(true, |only| only.iter().any(|c| c == category));
        allowed && !self.exclude_categories.iter().any(|c| c == category)
    }

    /// Returns true if `variation` belongs on the variation axis.
    #[must_use]
    pub fn accepts_variation(&self, variation: &str) -> bool {
        variation == NOMINAL
            || self
                .only_variations
                .as_ref()
                .map_or(true, |only| only.iter().any(|v| v == variation))
    }

    /// Returns true if the histogram is booked for `sample`.
    #[must_use]
    pub fn accepts_sample(&self, sample: &str) -> bool {
        let allowed = self
            .only_samples
            .as_ref()
            .map_or(true, |only| only.iter().any(|s| s == sample));
        allowed && !self.exclude_samples.iter().any(|s| s == sample)
    }

    /// Checks axes and names.
    ///
    /// # Errors
    /// Returns an error if the name is empty, there are no axes, or an axis name is reserved, duplicated or badly binned.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::ConfigError("histogram name is empty".to_string()));
        }
        if self.axes.is_empty() {
            return Err(Error::ConfigError(format!(
                "histogram `{}` has no axes",
                self.name
            )));
        }
        let mut names = IndexSet::new();
        for axis in &self.axes {
            let name = axis.name();
            if name == "cat" || name == "variation" {
                return Err(Error::ConfigError(format!(
                    "axis name `{name}` of histogram `{}` is reserved",
                    self.name
                )));
            }
            if !names.insert(name.clone()) {
                return Err(Error::ConfigError(format!(
                    "duplicate axis `{name}` in histogram `{}`",
                    self.name
                )));
            }
            axis.kind.validate(&name)?;
        }
        Ok(())
    }

    /// Short description used in error context.
    #[must_use]
    pub fn describe(&self) -> String {
        let axes: Vec<String> = self.axes.iter().map(AxisSpec::name).collect();
        format!(
            "axes=[{}], no_weights={}, collapse_2d_masks={}",
            axes.join(", "),
            self.no_weights,
            self.collapse_2d_masks
        )
    }
}

/// Systematic names, applied to every category or to selected ones.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SystematicSet {
    /// Variation labels for every category.
    pub inclusive: Vec<String>,
    /// Additional variation labels per category.
    pub by_category: IndexMap<String, Vec<String>>,
}

impl SystematicSet {
    fn push_unique(labels: &mut Vec<String>, name: &str) {
        for label in [format!("{name}Up"), format!("{name}Down")] {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
    }

    /// Variation labels relevant for `category`.
    #[must_use]
    pub fn for_category(&self, category: &str) -> Vec<String> {
        let mut labels = self.inclusive.clone();
        if let Some(extra) = self.by_category.get(category) {
            for label in extra {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }

    /// Every variation label, in declaration order.
    #[must_use]
    pub fn all(&self) -> IndexSet<String> {
        self.inclusive
            .iter()
            .chain(self.by_category.values().flatten())
            .cloned()
            .collect()
    }
}

/// Weight and shape systematics of a sample.
///
/// Each systematic `name` contributes the labels `nameUp` and `nameDown`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VariationConfig {
    /// Systematics that only change the event weight.
    pub weights: SystematicSet,
    /// Systematics that change the histogrammed values.
    pub shapes: SystematicSet,
}

impl VariationConfig {
    /// Creates an empty configuration (nominal only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a weight systematic for every category.
    #[must_use]
    pub fn with_weight_systematic(mut self, name: &str) -> Self {
        SystematicSet::push_unique(&mut self.weights.inclusive, name);
        self
    }

    /// Adds a weight systematic for one category.
    #[must_use]
    pub fn with_weight_systematic_for(mut self, category: &str, name: &str) -> Self {
        let labels = self.weights.by_category.entry(category.to_string()).or_default();
        SystematicSet::push_unique(labels, name);
        self
    }

    /// Adds a shape systematic for every category.
    #[must_use]
    pub fn with_shape_systematic(mut self, name: &str) -> Self {
        SystematicSet::push_unique(&mut self.shapes.inclusive, name);
        self
    }

    /// Adds a shape systematic for one category.
    #[must_use]
    pub fn with_shape_systematic_for(mut self, category: &str, name: &str) -> Self {
        let labels = self.shapes.by_category.entry(category.to_string()).or_default();
        SystematicSet::push_unique(labels, name);
        self
    }

    /// Weight variation labels of `category`.
    #[must_use]
    pub fn weight_variations(&self, category: &str) -> Vec<String> {
        self.weights.for_category(category)
    }

    /// Shape variation labels of `category`.
    #[must_use]
    pub fn shape_variations(&self, category: &str) -> Vec<String> {
        self.shapes.for_category(category)
    }

    /// Every shape variation label.
    #[must_use]
    pub fn all_shape_variations(&self) -> IndexSet<String> {
        self.shapes.all()
    }
}
