//! Event weights: providers, the per-call variation table and the weight
//! cache shared by the histograms of one fill call.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use evhist_core::config::NOMINAL;
use evhist_core::error::{Error, Result};
use indexmap::IndexMap;
use log::trace;

use crate::dispatch::ProcessingPass;
use crate::reconcile::{FillPlan, SelectionKind};

/// Source of per-event weights.
pub trait WeightProvider {
    /// Weights of `category` for the current pass, keyed by variation label.
    /// The map must contain [`NOMINAL`].
    ///
    /// # Errors
    /// Returns an error if weights for `category` cannot be produced.
    fn weights(&self, category: &str, pass: &ProcessingPass) -> Result<IndexMap<String, Vec<f64>>>;
}

/// In-memory weights: one inclusive set plus per-category overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSet {
    inclusive: IndexMap<String, Vec<f64>>,
    by_category: IndexMap<String, IndexMap<String, Vec<f64>>>,
}

impl WeightSet {
    /// Creates a set with the nominal weights.
    #[must_use]
    pub fn new(nominal: Vec<f64>) -> Self {
        let mut inclusive = IndexMap::new();
        inclusive.insert(NOMINAL.to_string(), nominal);
        Self {
            inclusive,
            by_category: IndexMap::new(),
        }
    }

    /// Unit nominal weights for `num_events` events.
    #[must_use]
    pub fn unit(num_events: usize) -> Self {
        Self::new(vec![1.0; num_events])
    }

    /// Adds a variation applied to every category.
    #[must_use]
    pub fn with_variation(mut self, variation: impl Into<String>, weights: Vec<f64>) -> Self {
        self.inclusive.insert(variation.into(), weights);
        self
    }

    /// Adds (or overrides) a variation for one category.
    #[must_use]
    pub fn with_category_variation(
        mut self,
        category: impl Into<String>,
        variation: impl Into<String>,
        weights: Vec<f64>,
    ) -> Self {
        self.by_category
            .entry(category.into())
            .or_default()
            .insert(variation.into(), weights);
        self
    }
}

impl WeightProvider for WeightSet {
    fn weights(&self, category: &str, _pass: &ProcessingPass) -> Result<IndexMap<String, Vec<f64>>> {
        let mut weights = self.inclusive.clone();
        if let Some(extra) = self.by_category.get(category) {
            for (variation, values) in extra {
                weights.insert(variation.clone(), values.clone());
            }
        }
        Ok(weights)
    }
}

/// Weights of every category for one fill call, fetched once up front.
#[derive(Debug, Clone, Default)]
pub struct WeightVariationTable {
    by_category: IndexMap<String, IndexMap<String, Vec<f64>>>,
}

impl WeightVariationTable {
    /// Fetches the weights of `categories` and checks that each carries a
    /// nominal entry of `num_events` values.
    ///
    /// # Errors
    /// Returns an error if a provider fails, a category lacks nominal weights,
    /// or a weight array has the wrong length.
    pub fn prefetch<'c>(
        provider: &dyn WeightProvider,
        categories: impl IntoIterator<Item = &'c str>,
        pass: &ProcessingPass,
        num_events: usize,
    ) -> Result<Self> {
        let mut by_category = IndexMap::new();
        for category in categories {
            if by_category.contains_key(category) {
                continue;
            }
            let weights = provider.weights(category, pass)?;
            if !weights.contains_key(NOMINAL) {
                return Err(Error::MissingNominalWeight(category.to_string()));
            }
            for (variation, values) in &weights {
                if values.len() != num_events {
                    return Err(Error::length_mismatch(
                        format!("weights `{variation}` of category `{category}`"),
                        num_events,
                        values.len(),
                    ));
                }
            }
            by_category.insert(category.to_string(), weights);
        }
        Ok(Self { by_category })
    }

    /// Returns true if `variation` is defined for `category`.
    #[must_use]
    pub fn has_variation(&self, category: &str, variation: &str) -> bool {
        self.by_category
            .get(category)
            .is_some_and(|weights| weights.contains_key(variation))
    }

    /// Weights of one variation.
    ///
    /// # Errors
    /// Returns an error if the category or variation was not fetched.
    pub fn get(&self, category: &str, variation: &str) -> Result<&[f64]> {
        let weights = self
            .by_category
            .get(category)
            .ok_or_else(|| Error::UnknownCategory(category.to_string()))?;
        weights
            .get(variation)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownVariation(variation.to_string()))
    }
}

/// Where a cached weight vector came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WeightOrigin {
    /// The variation table.
    Table,
    /// Caller-supplied weights of one histogram.
    Custom(String),
    /// A named correction.
    Correction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    origin: WeightOrigin,
    category: String,
    subsample: String,
    variation: String,
    selection: SelectionKind,
}

/// Identifies one weight vector restricted to one mask.
#[derive(Debug, Clone, Copy)]
pub struct WeightKey<'k> {
    /// Origin of the weights.
    pub origin: &'k WeightOrigin,
    /// Category of the mask.
    pub category: &'k str,
    /// Subsample of the mask.
    pub subsample: &'k str,
    /// Variation label of the weights.
    pub variation: &'k str,
}

/// Masked weights reused across the histograms of one fill call.
///
/// Entries hold the weights restricted to the selected events, before
/// broadcasting, so histograms sharing a mask but differing in layout share
/// one entry.
#[derive(Debug, Default)]
pub struct WeightCache {
    entries: HashMap<CacheKey, Vec<f64>>,
    hits: usize,
    misses: usize,
}

impl WeightCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights aligned with the rows of `plan`.
    ///
    /// # Errors
    /// Returns an error if `weights` does not hold one value per event of `plan`.
    pub fn broadcast(&mut self, key: WeightKey<'_>, weights: &[f64], plan: &FillPlan) -> Result<Vec<f64>> {
        if weights.len() != plan.num_events() {
            return Err(Error::length_mismatch(
                format!("weights `{}`", key.variation),
                plan.num_events(),
                weights.len(),
            ));
        }
        let cache_key = CacheKey {
            origin: key.origin.clone(),
            category: key.category.to_string(),
            subsample: key.subsample.to_string(),
            variation: key.variation.to_string(),
            selection: plan.selection(),
        };
        let selected = match self.entries.entry(cache_key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                trace!(
                    "caching weights {} for {}/{}",
                    key.variation,
                    key.category,
                    key.subsample
                );
                entry.insert(match plan.event_mask() {
                    Some(mask) => weights
                        .iter()
                        .zip(mask)
                        .filter_map(|(&w, &keep)| keep.then_some(w))
                        .collect(),
                    None => weights.to_vec(),
                })
            }
        };
        let expanded = match plan.structure() {
            Some(structure) => structure.broadcast(selected.as_slice())?,
            None => selected.clone(),
        };
        plan.filter_rows(expanded)
    }

    /// Number of lookups served from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of lookups that had to restrict the weights.
    #[must_use]
    pub fn misses(&self) -> usize {
        self.misses
    }
}

/// State of one fill call: the variation table, the weight cache and the
/// correction vectors computed so far. Dropped when the call returns.
#[derive(Debug)]
pub struct FillContext {
    table: WeightVariationTable,
    cache: WeightCache,
    corrections: HashMap<(String, String), Vec<f64>>,
}

impl FillContext {
    /// Creates the context of one fill call.
    #[must_use]
    pub fn new(table: WeightVariationTable) -> Self {
        Self {
            table,
            cache: WeightCache::new(),
            corrections: HashMap::new(),
        }
    }

    /// The variation table.
    #[must_use]
    pub fn table(&self) -> &WeightVariationTable {
        &self.table
    }

    /// The weight cache.
    #[must_use]
    pub fn cache(&self) -> &WeightCache {
        &self.cache
    }

    /// Table weights of `variation` aligned with `plan`.
    ///
    /// # Errors
    /// Returns an error if the variation is unknown or its weights do not match
    /// the plan.
    pub fn table_weights(
        &mut self,
        category: &str,
        subsample: &str,
        variation: &str,
        plan: &FillPlan,
    ) -> Result<Vec<f64>> {
        let weights = self.table.get(category, variation)?;
        let key = WeightKey {
            origin: &WeightOrigin::Table,
            category,
            subsample,
            variation,
        };
        self.cache.broadcast(key, weights, plan)
    }

    /// Arbitrary per-event weights aligned with `plan`.
    ///
    /// # Errors
    /// Returns an error if `weights` does not hold one value per event of `plan`.
    pub fn weights(
        &mut self,
        key: WeightKey<'_>,
        weights: &[f64],
        plan: &FillPlan,
    ) -> Result<Vec<f64>> {
        self.cache.broadcast(key, weights, plan)
    }

    /// Per-event correction factors of `name` for `category`, computed at most
    /// once per call.
    ///
    /// # Errors
    /// Returns an error if `compute` fails.
    pub fn correction(
        &mut self,
        name: &str,
        category: &str,
        compute: impl FnOnce() -> Result<Vec<f64>>,
    ) -> Result<&[f64]> {
        let key = (name.to_string(), category.to_string());
        if !self.corrections.contains_key(&key) {
            let factors = compute()?;
            self.corrections.insert(key.clone(), factors);
        }
        self.corrections
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingCorrection(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::resolver::ResolvedAxes;
    use evhist_core::axis::AxisSpec;
    use evhist_core::config::HistogramSpec;
    use evhist_core::event::Column;
    use evhist_core::mask::Mask;
    use evhist_core::ragged::Ragged;

    fn ragged_plan(mask: &Mask) -> FillPlan {
        let spec = HistogramSpec::new(
            "jet_pt",
            vec![AxisSpec::regular("JetGood", "pt", 10, 0.0, 200.0)],
        );
        let resolved = ResolvedAxes {
            columns: vec![Column::Numeric(Ragged::from_nested(vec![
                vec![10.0, 20.0],
                vec![30.0],
                vec![40.0, 50.0, 60.0],
            ]))],
            data_ndim: 2,
        };
        reconcile(&spec, &resolved, mask).unwrap()
    }

    #[test]
    fn test_weight_set_category_override() {
        let set = WeightSet::new(vec![1.0, 2.0])
            .with_variation("pileupUp", vec![1.1, 2.2])
            .with_category_variation("SR", "pileupUp", vec![1.5, 2.5]);
        let cr = set.weights("CR", &ProcessingPass::Nominal).unwrap();
        let sr = set.weights("SR", &ProcessingPass::Nominal).unwrap();
        assert_eq!(cr["pileupUp"], vec![1.1, 2.2]);
        assert_eq!(sr["pileupUp"], vec![1.5, 2.5]);
    }

    #[test]
    fn test_prefetch_validates() {
        let good = WeightSet::new(vec![1.0, 2.0]);
        let table =
            WeightVariationTable::prefetch(&good, ["SR", "CR"], &ProcessingPass::Nominal, 2)
                .unwrap();
        assert!(table.has_variation("SR", NOMINAL));
        assert!(!table.has_variation("SR", "pileupUp"));

        let short = WeightSet::new(vec![1.0]);
        assert!(matches!(
            WeightVariationTable::prefetch(&short, ["SR"], &ProcessingPass::Nominal, 2),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_broadcast_follows_event_mask() {
        let plan = ragged_plan(&Mask::Event(vec![true, false, true]));
        let mut cache = WeightCache::new();
        let key = WeightKey {
            origin: &WeightOrigin::Table,
            category: "SR",
            subsample: "TTG",
            variation: NOMINAL,
        };
        let weights = cache.broadcast(key, &[2.0, 3.0, 4.0], &plan).unwrap();
        assert_eq!(weights, vec![2.0, 2.0, 4.0, 4.0, 4.0]);

        let again = cache.broadcast(key, &[2.0, 3.0, 4.0], &plan).unwrap();
        assert_eq!(again, weights);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_broadcast_follows_object_mask() {
        let mask = Mask::Object(Ragged::from_nested(vec![
            vec![true, false],
            vec![false],
            vec![true, true, false],
        ]));
        let plan = ragged_plan(&mask);
        let mut cache = WeightCache::new();
        let key = WeightKey {
            origin: &WeightOrigin::Custom("jet_pt".to_string()),
            category: "SR",
            subsample: "TTG",
            variation: NOMINAL,
        };
        let weights = cache.broadcast(key, &[2.0, 3.0, 4.0], &plan).unwrap();
        assert_eq!(weights, vec![2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_correction_computed_once() {
        let mut context = FillContext::new(WeightVariationTable::default());
        let mut calls = 0;
        for _ in 0..2 {
            let factors = context
                .correction("extrapolation", "PLJ", || {
                    calls += 1;
                    Ok(vec![1.2, 0.8])
                })
                .unwrap();
            assert_eq!(factors, &[1.2, 0.8]);
        }
        assert_eq!(calls, 1);
    }
}
