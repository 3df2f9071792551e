//! Variation dispatch: which variation slots a histogram is filled into for
//! one category, and with which weights.

use evhist_core::config::{HistogramSpec, VariationConfig, NOMINAL};
use evhist_core::histogram::Histogram;
use indexmap::IndexSet;
use log::debug;

use crate::weights::WeightVariationTable;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether a sample is simulated or recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SampleKind {
    /// Simulated sample: histograms carry a variation axis.
    Simulated,
    /// Observed data: no variation axis.
    Observed,
}

impl SampleKind {
    /// Returns true for simulated samples.
    #[must_use]
    pub fn is_simulated(self) -> bool {
        self == Self::Simulated
    }
}

/// The systematic pass a chunk is processed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProcessingPass {
    /// Central values; weight variations are filled here.
    #[default]
    Nominal,
    /// Events recomputed under a shape variation (e.g. `JESUp`).
    Shape(String),
}

impl ProcessingPass {
    /// Creates a pass from its label; `"nominal"` is the nominal pass.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label == NOMINAL {
            Self::Nominal
        } else {
            Self::Shape(label.to_string())
        }
    }

    /// Label of the pass.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Nominal => NOMINAL,
            Self::Shape(label) => label,
        }
    }

    /// Returns true for the nominal pass.
    #[must_use]
    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::Nominal)
    }
}

/// Weights applied by one planned fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillWeight {
    /// Every row counts 1.
    Unit,
    /// Table weights of the given variation.
    Table(String),
}

/// One histogram fill planned for a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFill {
    /// Variation slot, `None` for histograms without a variation axis.
    pub slot: Option<String>,
    /// Base weights.
    pub weight: FillWeight,
}

impl PlannedFill {
    fn weighted(slot: Option<&str>, variation: &str) -> Self {
        Self {
            slot: slot.map(ToString::to_string),
            weight: FillWeight::Table(variation.to_string()),
        }
    }

    fn unit(slot: Option<&str>) -> Self {
        Self {
            slot: slot.map(ToString::to_string),
            weight: FillWeight::Unit,
        }
    }
}

/// Plans the fills of a histogram for one category under one pass.
#[derive(Debug, Clone, Copy)]
pub struct VariationDispatcher<'a> {
    kind: SampleKind,
    pass: &'a ProcessingPass,
    variations: &'a VariationConfig,
    shape_variations: &'a IndexSet<String>,
}

impl<'a> VariationDispatcher<'a> {
    /// Creates a dispatcher. `shape_variations` is every shape label of the
    /// sample, which are never filled on the nominal pass.
    pub fn new(
        kind: SampleKind,
        pass: &'a ProcessingPass,
        variations: &'a VariationConfig,
        shape_variations: &'a IndexSet<String>,
    ) -> Self {
        Self {
            kind,
            pass,
            variations,
            shape_variations,
        }
    }

    /// Fills of `histogram` for `category`.
    ///
    /// Simulated weighted histograms get one fill per booked weight
    /// variation on the nominal pass, falling back to nominal weights when
    /// the table lacks the variation for this category, and a single
    /// nominal-weight fill into the shape slot on a shape pass. Unweighted
    /// histograms fill unit weights into the slot of the pass, so on a shape
    /// pass their counts land under the shape label and `nominal` is left
    /// untouched. Observed data fills once with nominal weights.
    #[must_use]
    pub fn plan(
        &self,
        histogram: &Histogram,
        spec: &HistogramSpec,
        category: &str,
        table: &WeightVariationTable,
    ) -> Vec<PlannedFill> {
        match self.kind {
            SampleKind::Observed => {
                if !self.pass.is_nominal() {
                    return Vec::new();
                }
                if spec.no_weights {
                    vec![PlannedFill::unit(None)]
                } else {
                    vec![PlannedFill::weighted(None, NOMINAL)]
                }
            }
            SampleKind::Simulated => match self.pass {
                ProcessingPass::Shape(shape) => {
                    let relevant = self
                        .variations
                        .shape_variations(category)
                        .iter()
                        .any(|label| label == shape);
                    if !relevant || !histogram.has_variation(shape) {
                        return Vec::new();
                    }
                    if spec.no_weights {
                        vec![PlannedFill::unit(Some(shape.as_str()))]
                    } else {
                        vec![PlannedFill::weighted(Some(shape.as_str()), NOMINAL)]
                    }
                }
                ProcessingPass::Nominal if spec.no_weights => {
                    vec![PlannedFill::unit(Some(NOMINAL))]
                }
                ProcessingPass::Nominal => histogram
                    .variations()
                    .unwrap_or_default()
                    .iter()
                    .filter(|label| !self.shape_variations.contains(label.as_str()))
                    .map(|label| {
                        if table.has_variation(category, label) {
                            PlannedFill::weighted(Some(label.as_str()), label)
                        } else {
                            debug!(
                                "variation {label} undefined for category {category} of {}, \
                                 filling with nominal weights",
                                histogram.name()
                            );
                            PlannedFill::weighted(Some(label.as_str()), NOMINAL)
                        }
                    })
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightSet;
    use evhist_core::axis::AxisSpec;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn spec() -> HistogramSpec {
        HistogramSpec::new(
            "photon_pt",
            vec![AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0)],
        )
    }

    fn histogram(variations: Option<&[&str]>) -> Histogram {
        let spec = spec();
        Histogram::new(
            spec.name,
            labels(&["SR", "CR"]),
            variations.map(labels),
            spec.axes,
        )
        .unwrap()
    }

    fn table() -> WeightVariationTable {
        let weights = WeightSet::new(vec![1.0, 1.0])
            .with_category_variation("SR", "pileupUp", vec![1.1, 1.1])
            .with_category_variation("SR", "pileupDown", vec![0.9, 0.9]);
        WeightVariationTable::prefetch(&weights, ["SR", "CR"], &ProcessingPass::Nominal, 2)
            .unwrap()
    }

    fn config() -> VariationConfig {
        VariationConfig::new()
            .with_weight_systematic("pileup")
            .with_shape_systematic_for("SR", "JES")
    }

    #[test]
    fn test_pass_labels() {
        assert_eq!(ProcessingPass::from_label("nominal"), ProcessingPass::Nominal);
        assert_eq!(ProcessingPass::from_label("JESUp").label(), "JESUp");
    }

    #[test]
    fn test_nominal_pass_with_fallback() {
        let config = config();
        let shapes = config.all_shape_variations();
        let pass = ProcessingPass::Nominal;
        let dispatcher = VariationDispatcher::new(SampleKind::Simulated, &pass, &config, &shapes);
        let hist = histogram(Some(&["nominal", "pileupUp", "pileupDown", "JESUp", "JESDown"][..]));
        let table = table();

        let sr = dispatcher.plan(&hist, &spec(), "SR", &table);
        assert_eq!(sr.len(), 3);
        assert_eq!(sr[1].weight, FillWeight::Table("pileupUp".to_string()));

        let cr = dispatcher.plan(&hist, &spec(), "CR", &table);
        assert_eq!(cr.len(), 3);
        assert_eq!(cr[1].slot.as_deref(), Some("pileupUp"));
        assert_eq!(cr[1].weight, FillWeight::Table(NOMINAL.to_string()));
    }

    #[test]
    fn test_shape_pass_only_relevant_categories() {
        let config = config();
        let shapes = config.all_shape_variations();
        let pass = ProcessingPass::Shape("JESUp".to_string());
        let dispatcher = VariationDispatcher::new(SampleKind::Simulated, &pass, &config, &shapes);
        let hist = histogram(Some(&["nominal", "JESUp", "JESDown"][..]));
        let table = table();

        let sr = dispatcher.plan(&hist, &spec(), "SR", &table);
        assert_eq!(sr, vec![PlannedFill::weighted(Some("JESUp"), NOMINAL)]);
        assert!(dispatcher.plan(&hist, &spec(), "CR", &table).is_empty());

        let unweighted = spec().with_no_weights();
        assert_eq!(
            dispatcher.plan(&hist, &unweighted, "SR", &table),
            vec![PlannedFill::unit(Some("JESUp"))]
        );
    }

    #[test]
    fn test_unweighted_and_observed() {
        let config = config();
        let shapes = config.all_shape_variations();
        let pass = ProcessingPass::Nominal;
        let table = table();

        let simulated = VariationDispatcher::new(SampleKind::Simulated, &pass, &config, &shapes);
        let hist = histogram(Some(&["nominal", "JESUp", "JESDown"][..]));
        assert_eq!(
            simulated.plan(&hist, &spec().with_no_weights(), "SR", &table),
            vec![PlannedFill::unit(Some(NOMINAL))]
        );

        let observed = VariationDispatcher::new(SampleKind::Observed, &pass, &config, &shapes);
        let data = histogram(None);
        assert_eq!(
            observed.plan(&data, &spec(), "SR", &table),
            vec![PlannedFill::weighted(None, NOMINAL)]
        );
    }
}
