//! Weighted histograms with category and variation axes.
//!
//! Storage is dense: one `ndarray` block of shape
//! `[categories, variations, axis extents...]` for the sum of weights and a
//! second one for the sum of squared weights. Histograms without a variation
//! axis (observed data) use a single variation slot.

use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::axis::AxisSpec;
use crate::error::{Error, Result};

/// One fill-ready column, aligned row by row with the other columns and
/// the weights.
#[derive(Debug, Clone, Copy)]
pub enum FillColumn<'a> {
    /// Values for a binned numeric axis.
    Numeric(&'a [f64]),
    /// Labels for a string category axis.
    Labels(&'a [String]),
}

impl FillColumn<'_> {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Labels(labels) => labels.len(),
        }
    }

    /// Returns true if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A weighted histogram over category × variation × configured axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    name: String,
    categories: Vec<String>,
    variations: Option<Vec<String>>,
    axes: Vec<AxisSpec>,
    sumw: ArrayD<f64>,
    sumw2: ArrayD<f64>,
}

impl Histogram {
    /// Books an empty histogram.
    ///
    /// `variations` is `None` for histograms without a variation axis.
    ///
    /// # Errors
    /// Returns an error if the categories are empty or repeated, the variation
    /// axis is empty or repeated, or an axis binning is invalid.
    pub fn new(
        name: impl Into<String>,
        categories: Vec<String>,
        variations: Option<Vec<String>>,
        axes: Vec<AxisSpec>,
    ) -> Result<Self> {
        let name = name.into();
        if categories.is_empty() {
            return Err(Error::ConfigError(format!(
                "histogram `{name}` has no categories"
            )));
        }
        check_unique(&name, "category", &categories)?;
        if let Some(variations) = &variations {
            if variations.is_empty() {
                return Err(Error::ConfigError(format!(
                    "histogram `{name}` has an empty variation axis"
                )));
            }
            check_unique(&name, "variation", variations)?;
        }
        for axis in &axes {
            axis.kind.validate(&axis.name())?;
        }

        let mut shape = Vec::with_capacity(axes.len() + 2);
        shape.push(categories.len());
        shape.push(variations.as_ref().map_or(1, Vec::len));
        shape.extend(axes.iter().map(|axis| axis.kind.extent()));

        Ok(Self {
            name,
            categories,
            variations,
            axes,
            sumw: ArrayD::zeros(IxDyn(&shape)),
            sumw2: ArrayD::zeros(IxDyn(&shape)),
        })
    }

    /// Histogram name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category labels.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Variation labels, if the histogram has a variation axis.
    #[must_use]
    pub fn variations(&self) -> Option<&[String]> {
        self.variations.as_deref()
    }

    /// Returns true if `variation` is on the variation axis.
    #[must_use]
    pub fn has_variation(&self, variation: &str) -> bool {
        self.variations
            .as_ref()
            .is_some_and(|variations| variations.iter().any(|v| v == variation))
    }

    /// Configured axes.
    #[must_use]
    pub fn axes(&self) -> &[AxisSpec] {
        &self.axes
    }

    fn category_index(&self, category: &str) -> Result<usize> {
        self.categories
            .iter()
            .position(|c| c == category)
            .ok_or_else(|| Error::UnknownCategory(category.to_string()))
    }

    fn variation_index(&self, variation: Option<&str>) -> Result<usize> {
        match (variation, &self.variations) {
            (None, None) => Ok(0),
            (Some(variation), Some(variations)) => variations
                .iter()
                .position(|v| v == variation)
                .ok_or_else(|| Error::UnknownVariation(variation.to_string())),
            (Some(variation), None) => Err(Error::UnknownVariation(variation.to_string())),
            (None, Some(_)) => Err(Error::UnknownVariation(
                "<none> on a histogram with a variation axis".to_string(),
            )),
        }
    }

    /// Accumulates rows into the `(category, variation)` slice.
    ///
    /// `columns` follow the axis order. Without `weights` each row counts 1.
    /// Rows falling outside an axis without flow bins are dropped. Returns
    /// the number of rows accumulated.
    ///
    /// # Errors
    /// Returns an error if the category or variation is unknown, or the columns
    /// or weights do not match the axes in count, length or type.
    pub fn fill(
        &mut self,
        category: &str,
        variation: Option<&str>,
        columns: &[FillColumn<'_>],
        weights: Option<&[f64]>,
    ) -> Result<usize> {
        let cat = self.category_index(category)?;
        let var = self.variation_index(variation)?;
        if columns.len() != self.axes.len() {
            return Err(Error::length_mismatch(
                "fill columns",
                self.axes.len(),
                columns.len(),
            ));
        }
        let rows = columns.first().map_or(0, FillColumn::len);
        for (axis, column) in self.axes.iter().zip(columns) {
            if column.len() != rows {
                return Err(Error::length_mismatch(
                    format!("column `{}`", axis.name()),
                    rows,
                    column.len(),
                ));
            }
            let matches = match column {
                FillColumn::Numeric(_) => !axis.is_categorical(),
                FillColumn::Labels(_) => axis.is_categorical(),
            };
            if !matches {
                return Err(Error::TypeMismatch {
                    axis: axis.name(),
                    expected: if axis.is_categorical() {
                        "label"
                    } else {
                        "numeric"
                    },
                });
            }
        }
        if let Some(weights) = weights {
            if weights.len() != rows {
                return Err(Error::length_mismatch("weights", rows, weights.len()));
            }
        }

        let mut index = vec![0usize; self.axes.len() + 2];
        index[0] = cat;
        index[1] = var;
        let mut filled = 0;
        'rows: for row in 0..rows {
            for (slot, (axis, column)) in index[2..].iter_mut().zip(self.axes.iter().zip(columns)) {
                let located = match column {
                    FillColumn::Numeric(values) => axis.kind.index(values[row]),
                    FillColumn::Labels(labels) => axis.kind.label_index(&labels[row]),
                };
                match located {
                    Some(bin) => *slot = bin,
                    None => continue 'rows,
                }
            }
            let weight = weights.map_or(1.0, |w| w[row]);
            self.sumw[index.as_slice()] += weight;
            self.sumw2[index.as_slice()] += weight * weight;
            filled += 1;
        }
        Ok(filled)
    }

    /// Sum of weights of one `(category, variation)` slice, including flow bins.
    ///
    /// # Errors
    /// Returns an error if the category or variation is unknown.
    pub fn values(&self, category: &str, variation: Option<&str>) -> Result<ArrayViewD<'_, f64>> {
        let cat = self.category_index(category)?;
        let var = self.variation_index(variation)?;
        Ok(self
            .sumw
            .index_axis(Axis(0), cat)
            .index_axis_move(Axis(0), var))
    }

    /// Sum of squared weights of one `(category, variation)` slice.
    ///
    /// # Errors
    /// Returns an error if the category or variation is unknown.
    pub fn variances(
        &self,
        category: &str,
        variation: Option<&str>,
    ) -> Result<ArrayViewD<'_, f64>> {
        let cat = self.category_index(category)?;
        let var = self.variation_index(variation)?;
        Ok(self
            .sumw2
            .index_axis(Axis(0), cat)
            .index_axis_move(Axis(0), var))
    }

    /// Total weight of one `(category, variation)` slice, including flow bins.
    ///
    /// # Errors
    /// Returns an error if the category or variation is unknown.
    pub fn sum(&self, category: &str, variation: Option<&str>) -> Result<f64> {
        Ok(self.values(category, variation)?.sum())
    }

    /// Total weight over every slice.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.sumw.sum()
    }

    /// Returns true if both histograms have identical binning and labels.
    #[must_use]
    pub fn is_compatible(&self, other: &Histogram) -> bool {
        self.name == other.name
            && self.categories == other.categories
            && self.variations == other.variations
            && self.axes == other.axes
    }

    /// Adds the contents of `other` bin by bin.
    ///
    /// # Errors
    /// Returns an error if the histograms differ in axes or labels.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if !self.is_compatible(other) {
            return Err(Error::IncompatibleHistograms(format!(
                "`{}` and `{}` differ in axes or labels",
                self.name, other.name
            )));
        }
        self.sumw += &other.sumw;
        self.sumw2 += &other.sumw2;
        Ok(())
    }

    /// Clears all bins.
    pub fn reset(&mut self) {
        self.sumw.fill(0.0);
        self.sumw2.fill(0.0);
    }
}

fn check_unique(histogram: &str, what: &str, labels: &[String]) -> Result<()> {
    for (i, label) in labels.iter().enumerate() {
        if labels[..i].contains(label) {
            return Err(Error::ConfigError(format!(
                "duplicate {what} `{label}` in histogram `{histogram}`"
            )));
        }
    }
    Ok(())
}

/// Filled histograms keyed by variable, then subsample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSet {
    histograms: IndexMap<String, IndexMap<String, Histogram>>,
}

impl HistogramSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) the histogram of `variable` for `subsample`.
    pub fn insert(&mut self, variable: impl Into<String>, subsample: impl Into<String>, histogram: Histogram) {
        self.histograms
            .entry(variable.into())
            .or_default()
            .insert(subsample.into(), histogram);
    }

    /// Looks up a histogram.
    #[must_use]
    pub fn get(&self, variable: &str, subsample: &str) -> Option<&Histogram> {
        self.histograms.get(variable)?.get(subsample)
    }

    /// Looks up a histogram for filling.
    pub fn get_mut(&mut self, variable: &str, subsample: &str) -> Option<&mut Histogram> {
        self.histograms.get_mut(variable)?.get_mut(subsample)
    }

    /// Histograms of one variable, keyed by subsample.
    #[must_use]
    pub fn variable(&self, variable: &str) -> Option<&IndexMap<String, Histogram>> {
        self.histograms.get(variable)
    }

    /// Variable names in booking order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    /// Iterator over `(variable, subsample, histogram)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Histogram)> {
        self.histograms.iter().flat_map(|(variable, by_subsample)| {
            by_subsample
                .iter()
                .map(move |(subsample, hist)| (variable.as_str(), subsample.as_str(), hist))
        })
    }

    /// Number of histograms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histograms.values().map(IndexMap::len).sum()
    }

    /// Returns true if the set holds no histograms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears every bin, keeping the booking.
    pub fn reset(&mut self) {
        for by_subsample in self.histograms.values_mut() {
            for hist in by_subsample.values_mut() {
                hist.reset();
            }
        }
    }

    /// Adds `other` into this set. Histograms only present in `other` are
    /// moved over.
    ///
    /// # Errors
    /// Returns an error if a histogram present in both sets is incompatible.
    pub fn merge(&mut self, other: HistogramSet) -> Result<()> {
        for (variable, by_subsample) in other.histograms {
            let target = self.histograms.entry(variable).or_default();
            for (subsample, hist) in by_subsample {
                match target.get_mut(&subsample) {
                    Some(existing) => existing.merge(&hist)?,
                    None => {
                        target.insert(subsample, hist);
                    }
                }
            }
        }
        Ok(())
    }

    /// Consumes the set.
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, IndexMap<String, Histogram>> {
        self.histograms
    }
}
