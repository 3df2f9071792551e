//! The fill orchestrator.
//!
//! [`HistManager`] books one histogram per variable and subsample and, for
//! each chunk of events, walks histograms × categories × subsamples:
//! resolve the axes, reconcile them with the combined mask, plan the
//! variation fills and accumulate with broadcast weights.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use evhist_core::config::{HistogramSpec, VariationConfig, NOMINAL};
use evhist_core::error::{Error, Result};
use evhist_core::event::{Column, EventView};
use evhist_core::histogram::{Histogram, HistogramSet};
use evhist_core::mask::{Mask, MaskProvider};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::correction::CorrectionProvider;
use crate::dispatch::{FillWeight, ProcessingPass, SampleKind, VariationDispatcher};
use crate::reconcile::{reconcile, FillPlan};
use crate::resolver::{AxisResolver, ResolvedAxes};
use crate::strategy::StrategyTable;
use crate::weights::{FillContext, WeightKey, WeightOrigin, WeightProvider, WeightVariationTable};

/// The sample a manager books histograms for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    /// Sample name.
    pub name: String,
    /// Simulated or observed.
    pub kind: SampleKind,
    /// Subsamples, each with its own histograms. Defaults to the sample itself.
    pub subsamples: Vec<String>,
}

impl SampleInfo {
    /// A simulated sample without subsamples.
    pub fn simulated(name: impl Into<String>) -> Self {
        Self::new(name, SampleKind::Simulated)
    }

    /// An observed-data sample without subsamples.
    pub fn observed(name: impl Into<String>) -> Self {
        Self::new(name, SampleKind::Observed)
    }

    fn new(name: impl Into<String>, kind: SampleKind) -> Self {
        let name = name.into();
        Self {
            subsamples: vec![name.clone()],
            name,
            kind,
        }
    }

    /// Splits the sample into subsamples.
    #[must_use]
    pub fn with_subsamples(mut self, subsamples: &[&str]) -> Self {
        self.subsamples = subsamples.iter().map(ToString::to_string).collect();
        self
    }
}

/// Inputs of one fill call.
pub struct FillInputs<'a> {
    /// Events of the chunk.
    pub events: &'a dyn EventView,
    /// Category masks.
    pub categories: &'a dyn MaskProvider,
    /// Subsample masks; `None` selects every event for a single subsample.
    pub subsamples: Option<&'a dyn MaskProvider>,
    /// Event weights.
    pub weights: &'a dyn WeightProvider,
    /// Pass the chunk was processed under.
    pub pass: ProcessingPass,
    /// Extra columns readable by `custom` axes.
    pub custom_fields: Option<&'a IndexMap<String, Column>>,
    /// Extra per-event weights, keyed by histogram name.
    pub custom_weights: Option<&'a IndexMap<String, Vec<f64>>>,
}

impl<'a> FillInputs<'a> {
    /// Inputs of a nominal-pass fill.
    pub fn new(
        events: &'a dyn EventView,
        categories: &'a dyn MaskProvider,
        weights: &'a dyn WeightProvider,
    ) -> Self {
        Self {
            events,
            categories,
            subsamples: None,
            weights,
            pass: ProcessingPass::Nominal,
            custom_fields: None,
            custom_weights: None,
        }
    }

    /// Sets the subsample masks.
    #[must_use]
    pub fn with_subsamples(mut self, subsamples: &'a dyn MaskProvider) -> Self {
        self.subsamples = Some(subsamples);
        self
    }

    /// Sets the processing pass.
    #[must_use]
    pub fn with_pass(mut self, pass: ProcessingPass) -> Self {
        self.pass = pass;
        self
    }

    /// Sets the custom fields.
    #[must_use]
    pub fn with_custom_fields(mut self, fields: &'a IndexMap<String, Column>) -> Self {
        self.custom_fields = Some(fields);
        self
    }

    /// Sets the custom weights.
    #[must_use]
    pub fn with_custom_weights(mut self, weights: &'a IndexMap<String, Vec<f64>>) -> Self {
        self.custom_weights = Some(weights);
        self
    }
}

/// Counters of one fill call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillSummary {
    /// Histogram fill calls made.
    pub fills: usize,
    /// Rows accumulated over all fills.
    pub rows: usize,
    /// Histogram × category × subsample combinations skipped for an empty mask.
    pub skipped_empty: usize,
}

/// Books and fills the histograms of one sample.
#[derive(Clone)]
pub struct HistManager {
    sample: SampleInfo,
    categories: Vec<String>,
    specs: IndexMap<String, HistogramSpec>,
    variations: VariationConfig,
    shape_variations: IndexSet<String>,
    strategies: StrategyTable,
    corrections: IndexMap<String, Arc<dyn CorrectionProvider>>,
    histograms: HistogramSet,
}

impl fmt::Debug for HistManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistManager")
            .field("sample", &self.sample)
            .field("categories", &self.categories)
            .field("variables", &self.specs.keys().collect::<Vec<_>>())
            .field("corrections", &self.corrections.keys().collect::<Vec<_>>())
            .field("histograms", &self.histograms.len())
            .finish_non_exhaustive()
    }
}

impl HistManager {
    /// Books the histograms of `specs` for `sample`.
    ///
    /// A histogram's category axis holds the accepted `categories`; its
    /// variation axis (simulated samples only) holds nominal, the accepted
    /// weight variations unless it is unweighted, then the accepted shape
    /// variations.
    ///
    /// # Errors
    /// Returns an error if the sample has no subsamples or a histogram
    /// definition is invalid.
    pub fn new(
        specs: Vec<HistogramSpec>,
        sample: SampleInfo,
        categories: &[&str],
        variations: VariationConfig,
    ) -> Result<Self> {
        if sample.subsamples.is_empty() {
            return Err(Error::ConfigError(format!(
                "sample `{}` has no subsamples",
                sample.name
            )));
        }
        let categories: Vec<String> = categories.iter().map(ToString::to_string).collect();
        let mut by_name = IndexMap::new();
        let mut histograms = HistogramSet::new();
        for spec in specs {
            spec.validate()?;
            if by_name.contains_key(&spec.name) {
                return Err(Error::ConfigError(format!(
                    "histogram `{}` configured twice",
                    spec.name
                )));
            }
            if !spec.accepts_sample(&sample.name) {
                debug!("histogram {} not booked for sample {}", spec.name, sample.name);
                by_name.insert(spec.name.clone(), spec);
                continue;
            }
            let booked: Vec<String> = categories
                .iter()
                .filter(|category| spec.accepts_category(category))
                .cloned()
                .collect();
            if booked.is_empty() {
                debug!("histogram {} has no categories to book", spec.name);
                by_name.insert(spec.name.clone(), spec);
                continue;
            }
            let slots = match sample.kind {
                SampleKind::Simulated => Some(variation_slots(&spec, &booked, &variations)),
                SampleKind::Observed => None,
            };
            for subsample in &sample.subsamples {
                let hist =
                    Histogram::new(spec.name.clone(), booked.clone(), slots.clone(), spec.axes.clone())?;
                histograms.insert(spec.name.clone(), subsample.clone(), hist);
            }
            trace!(
                "booked {} with {} categories and {} variations",
                spec.name,
                booked.len(),
                slots.as_ref().map_or(0, Vec::len)
            );
            by_name.insert(spec.name.clone(), spec);
        }
        debug!(
            "booked {} histograms for sample {}",
            histograms.len(),
            sample.name
        );
        Ok(Self {
            sample,
            categories,
            specs: by_name,
            shape_variations: variations.all_shape_variations(),
            variations,
            strategies: StrategyTable::new(),
            corrections: IndexMap::new(),
            histograms,
        })
    }

    /// Sets the per-category strategies.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = strategies;
        self
    }

    /// Registers a named correction.
    #[must_use]
    pub fn with_correction(
        mut self,
        name: impl Into<String>,
        correction: Arc<dyn CorrectionProvider>,
    ) -> Self {
        self.corrections.insert(name.into(), correction);
        self
    }

    /// The sample.
    #[must_use]
    pub fn sample(&self) -> &SampleInfo {
        &self.sample
    }

    /// All booked histograms.
    #[must_use]
    pub fn histograms(&self) -> &HistogramSet {
        &self.histograms
    }

    /// One booked histogram.
    #[must_use]
    pub fn histogram(&self, variable: &str, subsample: &str) -> Option<&Histogram> {
        self.histograms.get(variable, subsample)
    }

    /// One booked histogram, for filling by hand (e.g. metadata histograms).
    pub fn histogram_mut(&mut self, variable: &str, subsample: &str) -> Option<&mut Histogram> {
        self.histograms.get_mut(variable, subsample)
    }

    /// Configuration of one variable.
    #[must_use]
    pub fn spec(&self, variable: &str) -> Option<&HistogramSpec> {
        self.specs.get(variable)
    }

    /// Consumes the manager, returning its histograms.
    #[must_use]
    pub fn into_histograms(self) -> HistogramSet {
        self.histograms
    }

    /// Same booking and configuration with every bin empty.
    #[must_use]
    pub fn fresh(&self) -> Self {
        let mut manager = self.clone();
        manager.histograms.reset();
        manager
    }

    /// Fills every auto-filled histogram with one chunk of events.
    ///
    /// Fills are additive: calling this for several chunks accumulates.
    ///
    /// # Errors
    /// Returns an error if an axis cannot be resolved, a mask or weight does not
    /// line up with the events, or a correction cannot be computed.
    #[allow(clippy::too_many_lines)]
    pub fn fill_histograms(&mut self, inputs: &FillInputs<'_>) -> Result<FillSummary> {
        let num_events = inputs.events.num_events();
        let category_masks = inputs.categories.get_masks();
        let inclusive;
        let subsample_masks: Vec<(&str, &Mask)> = match inputs.subsamples {
            Some(provider) => provider.get_masks(),
            None if self.sample.subsamples.len() == 1 => {
                inclusive = Mask::all(num_events);
                vec![(self.sample.subsamples[0].as_str(), &inclusive)]
            }
            None => {
                return Err(Error::ConfigError(format!(
                    "sample `{}` has subsamples but no subsample masks were given",
                    self.sample.name
                )))
            }
        };
        for (name, mask) in category_masks.iter().chain(&subsample_masks) {
            if mask.num_events() != num_events {
                return Err(Error::length_mismatch(
                    format!("mask `{name}`"),
                    num_events,
                    mask.num_events(),
                ));
            }
        }
        for (subsample, _) in &subsample_masks {
            if !self.sample.subsamples.iter().any(|s| s == *subsample) {
                return Err(Error::UnknownSubsample((*subsample).to_string()));
            }
        }

        let active: Vec<(&str, &Mask)> = category_masks
            .into_iter()
            .filter(|(category, _)| {
                let known = self.categories.iter().any(|c| c == *category);
                if !known {
                    trace!("category {category} is not booked, skipping");
                }
                known
            })
            .collect();
        let table = WeightVariationTable::prefetch(
            inputs.weights,
            active.iter().map(|(category, _)| *category),
            &inputs.pass,
            num_events,
        )?;
        let mut context = FillContext::new(table);
        let dispatcher = VariationDispatcher::new(
            self.sample.kind,
            &inputs.pass,
            &self.variations,
            &self.shape_variations,
        );
        let mut summary = FillSummary::default();

        for (variable, spec) in &self.specs {
            if !spec.autofill || spec.metadata_hist {
                continue;
            }
            let Some(booked) = self.histograms.variable(variable) else {
                continue;
            };
            if let ProcessingPass::Shape(shape) = &inputs.pass {
                let has_slot = booked.values().next().is_some_and(|h| h.has_variation(shape));
                if !has_slot {
                    trace!("{variable} has no slot for {shape}, skipping");
                    continue;
                }
            }
            let custom_weights = match inputs.custom_weights.and_then(|w| w.get(variable)) {
                Some(weights) if !spec.no_weights => Some(weights.as_slice()),
                _ => None,
            };

            for &(category, category_mask) in &active {
                if !spec.accepts_category(category) {
                    continue;
                }
                let strategy = self.strategies.get(category);
                let view = self.strategies.view(category, inputs.events);
                let mut resolved: Option<ResolvedAxes> = None;

                for &(subsample, subsample_mask) in &subsample_masks {
                    let mask = category_mask.and(subsample_mask)?;
                    if mask.is_empty() {
                        summary.skipped_empty += 1;
                        trace!("{variable}/{category}/{subsample}: empty mask");
                        continue;
                    }
                    let axes = match resolved.take() {
                        Some(axes) => axes,
                        None => AxisResolver::new(variable, &view, inputs.custom_fields)
                            .resolve_all(&spec.axes)?,
                    };
                    let plan = reconcile(spec, &axes, &mask)?;
                    resolved = Some(axes);

                    let hist = self
                        .histograms
                        .get(variable, subsample)
                        .ok_or_else(|| Error::UnknownSubsample(subsample.to_string()))?;
                    let fills = dispatcher.plan(hist, spec, category, context.table());
                    if fills.is_empty() {
                        continue;
                    }

                    let mut extra: Option<Vec<f64>> = None;
                    if let Some(weights) = custom_weights {
                        let key = WeightKey {
                            origin: &WeightOrigin::Custom(variable.clone()),
                            category,
                            subsample,
                            variation: NOMINAL,
                        };
                        extra = Some(context.weights(key, weights, &plan)?);
                    }
                    let correction = match (self.sample.kind, strategy) {
                        (SampleKind::Observed, Some(strategy)) if !spec.no_weights => {
                            strategy.correction.as_deref()
                        }
                        _ => None,
                    };
                    if let Some(name) = correction {
                        let factors =
                            self.correction_weights(&mut context, name, category, subsample, &view, &plan)?;
                        extra = Some(multiply(extra, factors));
                    }

                    let columns = plan.fill_columns();
                    for fill in fills {
                        let weights = match &fill.weight {
                            FillWeight::Unit => None,
                            FillWeight::Table(variation) => {
                                let base =
                                    context.table_weights(category, subsample, variation, &plan)?;
                                Some(match &extra {
                                    Some(extra) => multiply(Some(base), extra.clone()),
                                    None => base,
                                })
                            }
                        };
                        let hist = self
                            .histograms
                            .get_mut(variable, subsample)
                            .ok_or_else(|| Error::UnknownSubsample(subsample.to_string()))?;
                        let filled = hist
                            .fill(category, fill.slot.as_deref(), &columns, weights.as_deref())
                            .map_err(|e| Error::fill(variable.clone(), spec.describe(), e))?;
                        summary.fills += 1;
                        summary.rows += filled;
                    }
                }
            }
        }

        debug!(
            "filled {} histograms ({} rows, {} empty masks) for {} on pass {}, weight cache {}/{}",
            summary.fills,
            summary.rows,
            summary.skipped_empty,
            self.sample.name,
            inputs.pass.label(),
            context.cache().hits(),
            context.cache().misses()
        );
        Ok(summary)
    }

    fn correction_weights(
        &self,
        context: &mut FillContext,
        name: &str,
        category: &str,
        subsample: &str,
        view: &dyn EventView,
        plan: &FillPlan,
    ) -> Result<Vec<f64>> {
        let provider = self
            .corrections
            .get(name)
            .ok_or_else(|| Error::MissingCorrection(name.to_string()))?;
        let factors = context
            .correction(name, category, || {
                let year = view.metadata().year()?;
                trace!("computing correction {name} for {category}, year {year}");
                let factors = provider.compute_correction(view, &year)?;
                if factors.len() == view.num_events() {
                    Ok(factors)
                } else {
                    Err(Error::length_mismatch(
                        format!("correction `{name}`"),
                        view.num_events(),
                        factors.len(),
                    ))
                }
            })?
            .to_vec();
        let key = WeightKey {
            origin: &WeightOrigin::Correction(name.to_string()),
            category,
            subsample,
            variation: NOMINAL,
        };
        context.weights(key, &factors, plan)
    }
}

fn variation_slots(
    spec: &HistogramSpec,
    categories: &[String],
    variations: &VariationConfig,
) -> Vec<String> {
    let mut slots: IndexSet<String> = IndexSet::new();
    slots.insert(NOMINAL.to_string());
    if !spec.no_weights {
        for category in categories {
            for label in variations.weight_variations(category) {
                if spec.accepts_variation(&label) {
                    slots.insert(label);
                }
            }
        }
    }
    for category in categories {
        for label in variations.shape_variations(category) {
            if spec.accepts_variation(&label) {
                slots.insert(label);
            }
        }
    }
    slots.into_iter().collect()
}

fn multiply(base: Option<Vec<f64>>, factors: Vec<f64>) -> Vec<f64> {
    match base {
        Some(mut base) => {
            for (w, f) in base.iter_mut().zip(factors) {
                *w *= f;
            }
            base
        }
        None => factors,
    }
}

/// Per-category counts of the rows a fill call would accumulate, without
/// filling. Useful to check selections before booking.
///
/// # Errors
/// Returns an error if an axis cannot be resolved or a category mask does
/// not line up with the events.
pub fn count_rows(
    spec: &HistogramSpec,
    events: &dyn EventView,
    categories: &dyn MaskProvider,
) -> Result<HashMap<String, usize>> {
    let resolved = AxisResolver::new(&spec.name, events, None).resolve_all(&spec.axes)?;
    let mut counts = HashMap::new();
    for (category, mask) in categories.get_masks() {
        let rows = if mask.is_empty() {
            0
        } else {
            reconcile(spec, &resolved, mask)?.rows()
        };
        counts.insert(category.to_string(), rows);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightSet;
    use approx::assert_relative_eq;
    use evhist_core::axis::AxisSpec;
    use evhist_core::event::{Collection, EventTable};
    use evhist_core::mask::Selection;

    fn events() -> EventTable {
        let photons = Collection::from_counts(&[1, 2, 0])
            .with_values("pt", vec![45.0, 120.0, 60.0])
            .unwrap();
        EventTable::new(3)
            .with_field("met", vec![20.0, 40.0, 60.0])
            .unwrap()
            .with_collection("PhotonGood", photons)
            .unwrap()
    }

    fn specs() -> Vec<HistogramSpec> {
        vec![
            HistogramSpec::new(
                "photon_pt",
                vec![AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0)],
            ),
            HistogramSpec::new(
                "met",
                vec![AxisSpec::regular("events", "met", 10, 0.0, 100.0)],
            )
            .with_no_weights()
            .with_only_categories(&["SR"]),
        ]
    }

    #[test]
    fn test_booking() {
        let variations = VariationConfig::new()
            .with_weight_systematic("pileup")
            .with_shape_systematic("JES");
        let manager = HistManager::new(
            specs(),
            SampleInfo::simulated("TTG").with_subsamples(&["TTG_had", "TTG_lep"]),
            &["SR", "CR"],
            variations,
        )
        .unwrap();
        assert_eq!(manager.histograms().len(), 4);

        let pt = manager.histogram("photon_pt", "TTG_had").unwrap();
        assert_eq!(pt.categories(), &["SR".to_string(), "CR".to_string()]);
        assert_eq!(
            pt.variations().unwrap(),
            &["nominal", "pileupUp", "pileupDown", "JESUp", "JESDown"].map(String::from)
        );

        let met = manager.histogram("met", "TTG_lep").unwrap();
        assert_eq!(met.categories(), &["SR".to_string()]);
        assert_eq!(
            met.variations().unwrap(),
            &["nominal", "JESUp", "JESDown"].map(String::from)
        );
    }

    #[test]
    fn test_observed_booking_has_no_variation_axis() {
        let manager = HistManager::new(
            specs(),
            SampleInfo::observed("DATA_EGamma"),
            &["SR"],
            VariationConfig::new().with_weight_systematic("pileup"),
        )
        .unwrap();
        assert!(manager
            .histogram("photon_pt", "DATA_EGamma")
            .unwrap()
            .variations()
            .is_none());
    }

    #[test]
    fn test_duplicate_histogram_rejected() {
        let mut specs = specs();
        specs.push(specs[0].clone());
        assert!(HistManager::new(
            specs,
            SampleInfo::simulated("TTG"),
            &["SR"],
            VariationConfig::new()
        )
        .is_err());
    }

    #[test]
    fn test_fill_nominal() {
        let events = events();
        let mut manager = HistManager::new(
            specs(),
            SampleInfo::simulated("TTG"),
            &["SR", "CR"],
            VariationConfig::new(),
        )
        .unwrap();
        let categories = Selection::new()
            .with_mask("SR", vec![true, true, false])
            .with_mask("CR", vec![false, false, false]);
        let weights = WeightSet::new(vec![2.0, 3.0, 4.0]);
        let summary = manager
            .fill_histograms(&FillInputs::new(&events, &categories, &weights))
            .unwrap();

        assert_eq!(summary.fills, 2);
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.skipped_empty, 1);
        let pt = manager.histogram("photon_pt", "TTG").unwrap();
        assert_relative_eq!(pt.sum("SR", Some(NOMINAL)).unwrap(), 8.0);
        let met = manager.histogram("met", "TTG").unwrap();
        assert_relative_eq!(met.sum("SR", Some(NOMINAL)).unwrap(), 2.0);
    }

    #[test]
    fn test_count_rows() {
        let events = events();
        let categories = Selection::new()
            .with_mask("SR", vec![true, true, false])
            .with_mask("CR", vec![false, false, true]);
        let counts = count_rows(&specs()[0], &events, &categories).unwrap();
        assert_eq!(counts["SR"], 3);
        assert_eq!(counts["CR"], 0);
    }
}
