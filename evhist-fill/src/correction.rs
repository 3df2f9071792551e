//! Per-event corrections applied to observed data in selected categories.
//!
//! The main user is the photon extrapolation factor of the ABCD-style
//! misidentification estimate: events of the loose-photon region are scaled
//! by a factor binned in the leading photon pT, per data-taking year.

use evhist_core::error::{Error, Result};
use evhist_core::event::{Column, EventView};
use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Computes one multiplicative factor per event.
pub trait CorrectionProvider: Send + Sync {
    /// Factors for every event of `events`, for the data-taking `year`.
    ///
    /// # Errors
    /// Returns an error if the year has no factors or the input field is missing.
    fn compute_correction(&self, events: &dyn EventView, year: &str) -> Result<Vec<f64>>;
}

/// Factors of one year: `factors[i]` applies to `edges[i] <= x < edges[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinnedFactors {
    edges: Vec<f64>,
    factors: Vec<f64>,
}

impl BinnedFactors {
    /// Creates binned factors; needs one factor per bin and increasing edges.
    ///
    /// # Errors
    /// Returns an error if the edges are not strictly increasing or there is not
    /// one factor per bin.
    pub fn new(edges: Vec<f64>, factors: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidBinning {
                axis: "correction".to_string(),
                reason: "edges must be strictly increasing with at least two entries".to_string(),
            });
        }
        if factors.len() + 1 != edges.len() {
            return Err(Error::length_mismatch(
                "correction factors",
                edges.len() - 1,
                factors.len(),
            ));
        }
        Ok(Self { edges, factors })
    }

    /// Derives the factors from ABCD region yields per bin:
    /// `(b * c / d) / a`, where `a` is the region being corrected.
    ///
    /// # Errors
    /// Returns an error if a region does not hold one yield per bin or a bin
    /// of region A or D is empty.
    pub fn from_abcd(edges: Vec<f64>, a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> Result<Self> {
        let bins = edges.len().saturating_sub(1);
        for (region, yields) in [("A", a), ("B", b), ("C", c), ("D", d)] {
            if yields.len() != bins {
                return Err(Error::length_mismatch(
                    format!("region {region} yields"),
                    bins,
                    yields.len(),
                ));
            }
        }
        let mut factors = Vec::with_capacity(bins);
        for i in 0..bins {
            if a[i] == 0.0 || d[i] == 0.0 {
                return Err(Error::ConfigError(format!(
                    "empty reference region in correction bin {i}"
                )));
            }
            factors.push(b[i] * c[i] / d[i] / a[i]);
        }
        Self::new(edges, factors)
    }

    /// Factor for `value`, `None` outside the edges.
    #[must_use]
    pub fn factor(&self, value: f64) -> Option<f64> {
        let last = *self.edges.last()?;
        if value.is_nan() || value < self.edges[0] || value >= last {
            return None;
        }
        let bin = self.edges.partition_point(|&edge| edge <= value) - 1;
        self.factors.get(bin).copied()
    }
}

/// A correction binned in one field of the object at a fixed position of a
/// collection (the leading object by default).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinnedCorrection {
    collection: String,
    field: String,
    pos: usize,
    default: f64,
    by_year: IndexMap<String, BinnedFactors>,
}

impl BinnedCorrection {
    /// Creates a correction binned in `collection.field` of the leading object.
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            pos: 0,
            default: 1.0,
            by_year: IndexMap::new(),
        }
    }

    /// Uses the object at `pos` instead of the leading one.
    #[must_use]
    pub fn with_pos(mut self, pos: usize) -> Self {
        self.pos = pos;
        self
    }

    /// Factor for events without the object or outside the bins.
    #[must_use]
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = default;
        self
    }

    /// Sets the factors of `year`.
    #[must_use]
    pub fn with_year(mut self, year: impl Into<String>, factors: BinnedFactors) -> Self {
        self.by_year.insert(year.into(), factors);
        self
    }

    /// Photon-pT extrapolation factors of the 2018 electron channel.
    ///
    /// # Errors
    /// Returns an error if the built-in binning is rejected.
    pub fn photon_extrapolation() -> Result<Self> {
        let factors = BinnedFactors::new(
            vec![30.0, 40.0, 50.0, 70.0, 100.0, 140.0, 200.0, 300.0],
            vec![
                1.283_241_599_073_001,
                1.185_843_164_469_118_7,
                1.224_145_917_776_491,
                1.010_957_792_207_792_1,
                0.713_837_574_067_619_4,
                0.441_379_310_344_827_64,
                0.119_047_619_047_619_04,
            ],
        )?;
        Ok(Self::new("PhotonGood", "pt").with_year("2018", factors))
    }
}

impl CorrectionProvider for BinnedCorrection {
    fn compute_correction(&self, events: &dyn EventView, year: &str) -> Result<Vec<f64>> {
        let factors = self.by_year.get(year).ok_or_else(|| {
            Error::ConfigError(format!(
                "no correction factors for year {year} in {}.{}",
                self.collection, self.field
            ))
        })?;
        let source = events
            .collection(&self.collection)
            .ok_or_else(|| Error::MissingCollection(self.collection.clone()))?;
        let column = source
            .get_field(&self.field)
            .ok_or_else(|| Error::MissingField {
                source_name: format!("collection `{}`", self.collection),
                field: self.field.clone(),
            })?;
        let Column::Numeric(values) = column else {
            return Err(Error::TypeMismatch {
                axis: format!("{}.{}", self.collection, self.field),
                expected: "numeric",
            });
        };
        let values = if values.ndim() > 1 {
            values.pad_take(self.pos)?
        } else {
            values.clone()
        };
        Ok(values
            .values()
            .iter()
            .map(|value| {
                value
                    .and_then(|v| factors.factor(v))
                    .unwrap_or(self.default)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use evhist_core::event::{Collection, EventTable};

    #[test]
    fn test_factor_lookup() {
        let factors = BinnedFactors::new(vec![30.0, 40.0, 50.0], vec![1.5, 0.5]).unwrap();
        assert_eq!(factors.factor(30.0), Some(1.5));
        assert_eq!(factors.factor(45.0), Some(0.5));
        assert_eq!(factors.factor(50.0), None);
        assert_eq!(factors.factor(10.0), None);
        assert_eq!(factors.factor(f64::NAN), None);
    }

    #[test]
    fn test_invalid_factors() {
        assert!(BinnedFactors::new(vec![30.0, 20.0], vec![1.0]).is_err());
        assert!(BinnedFactors::new(vec![30.0, 40.0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_from_abcd() {
        let factors =
            BinnedFactors::from_abcd(vec![0.0, 1.0], &[10.0], &[6.0], &[4.0], &[2.0]).unwrap();
        assert_relative_eq!(factors.factor(0.5).unwrap(), 1.2);
        assert!(BinnedFactors::from_abcd(vec![0.0, 1.0], &[0.0], &[1.0], &[1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_leading_photon_correction() {
        let photons = Collection::from_counts(&[2, 0, 1, 1])
            .with_values("pt", vec![45.0, 32.0, 150.0, 500.0])
            .unwrap();
        let events = EventTable::new(4)
            .with_collection("PhotonGood", photons)
            .unwrap();
        let correction = BinnedCorrection::photon_extrapolation().unwrap();
        let factors = correction.compute_correction(&events, "2018").unwrap();
        assert_eq!(factors.len(), 4);
        assert_relative_eq!(factors[0], 1.185_843_164_469_118_7);
        assert_relative_eq!(factors[1], 1.0);
        assert_relative_eq!(factors[2], 0.441_379_310_344_827_64);
        assert_relative_eq!(factors[3], 1.0);

        assert!(correction.compute_correction(&events, "2017").is_err());
    }
}
