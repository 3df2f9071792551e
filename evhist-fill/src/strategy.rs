//! Per-category fill strategies.
//!
//! Control-region categories often read the same histogram definitions from
//! a different object collection (e.g. loose photons instead of tight ones)
//! and may scale data by a correction. A [`CategoryStrategy`] records both;
//! [`RemappedView`] applies the collection substitution transparently.

use evhist_core::event::{EventView, FieldSource, Metadata};
use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How one category is filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CategoryStrategy {
    /// Collections read from a substitute: configured name to actual name.
    pub collection_remap: IndexMap<String, String>,
    /// Named correction applied to observed data in this category.
    pub correction: Option<String>,
}

impl CategoryStrategy {
    /// Creates a strategy that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads collection `from` from `to` instead.
    #[must_use]
    pub fn with_remap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.collection_remap.insert(from.into(), to.into());
        self
    }

    /// Applies the named correction to observed data.
    #[must_use]
    pub fn with_correction(mut self, name: impl Into<String>) -> Self {
        self.correction = Some(name.into());
        self
    }
}

/// Strategies keyed by category. Categories without an entry are filled
/// as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StrategyTable {
    strategies: IndexMap<String, CategoryStrategy>,
}

impl StrategyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strategy of `category`.
    #[must_use]
    pub fn with_strategy(mut self, category: impl Into<String>, strategy: CategoryStrategy) -> Self {
        self.strategies.insert(category.into(), strategy);
        self
    }

    /// Strategy of `category`, if any.
    #[must_use]
    pub fn get(&self, category: &str) -> Option<&CategoryStrategy> {
        self.strategies.get(category)
    }

    /// Correction names referenced by any category.
    pub fn corrections(&self) -> impl Iterator<Item = &str> {
        self.strategies
            .values()
            .filter_map(|strategy| strategy.correction.as_deref())
    }

    /// Event view of `category`, with its collection remapping applied.
    #[must_use]
    pub fn view<'a>(&'a self, category: &str, events: &'a dyn EventView) -> RemappedView<'a> {
        RemappedView {
            inner: events,
            remap: self.get(category).map(|strategy| &strategy.collection_remap),
        }
    }
}

/// An event view that serves some collections under another name.
pub struct RemappedView<'a> {
    inner: &'a dyn EventView,
    remap: Option<&'a IndexMap<String, String>>,
}

impl<'a> RemappedView<'a> {
    /// Wraps `inner`, serving collection `k` from `remap[k]`.
    pub fn new(inner: &'a dyn EventView, remap: &'a IndexMap<String, String>) -> Self {
        Self {
            inner,
            remap: Some(remap),
        }
    }
}

impl EventView for RemappedView<'_> {
    fn num_events(&self) -> usize {
        self.inner.num_events()
    }

    fn events(&self) -> &dyn FieldSource {
        self.inner.events()
    }

    fn collection(&self, name: &str) -> Option<&dyn FieldSource> {
        let actual = self
            .remap
            .and_then(|remap| remap.get(name))
            .map_or(name, String::as_str);
        self.inner.collection(actual)
    }

    fn metadata(&self) -> &Metadata {
        self.inner.metadata()
    }
}
