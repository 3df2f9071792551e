//! Event views: typed, name-based access to per-event data.
//!
//! The fill engine never touches a concrete data format. It reads through
//! [`EventView`], which hands out [`FieldSource`] capabilities for the event
//! level and for each sub-object collection. [`EventTable`] is the columnar
//! in-memory implementation.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::ragged::{Ragged, Structure};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A column of event data: numeric values or string labels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Column {
    /// Numeric values (kinematics, counts, flags).
    Numeric(Ragged<f64>),
    /// String labels (sample names, eras, process tags).
    Labels(Ragged<String>),
}

impl Column {
    /// Nesting depth of the column.
    #[must_use]
    pub fn ndim(&self) -> usize {
        match self {
            Self::Numeric(values) => values.ndim(),
            Self::Labels(values) => values.ndim(),
        }
    }

    /// Number of events.
    #[must_use]
    pub fn num_events(&self) -> usize {
        match self {
            Self::Numeric(values) => values.num_events(),
            Self::Labels(values) => values.num_events(),
        }
    }

    /// Per-event layout, if ragged.
    #[must_use]
    pub fn structure(&self) -> Option<Structure> {
        match self {
            Self::Numeric(values) => values.structure(),
            Self::Labels(values) => values.structure(),
        }
    }

    /// Keeps the selected events.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the event count.
    pub fn select_events(&self, mask: &[bool]) -> Result<Self> {
        Ok(match self {
            Self::Numeric(values) => Self::Numeric(values.select_events(mask)?),
            Self::Labels(values) => Self::Labels(values.select_events(mask)?),
        })
    }
}

impl From<Ragged<f64>> for Column {
    fn from(values: Ragged<f64>) -> Self {
        Self::Numeric(values)
    }
}

impl From<Ragged<String>> for Column {
    fn from(values: Ragged<String>) -> Self {
        Self::Labels(values)
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Self::Numeric(Ragged::from_values(values))
    }
}

/// Capability to read named fields.
pub trait FieldSource {
    /// Returns the named field, if present.
    fn get_field(&self, name: &str) -> Option<&Column>;
}

/// A scalar metadata value attached to a chunk of events.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetaValue {
    /// Numeric entry.
    Number(f64),
    /// Boolean entry.
    Flag(bool),
    /// Text entry.
    Text(String),
}

impl MetaValue {
    /// Numeric interpretation (text is parsed, flags are 0/1).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Flag(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Label interpretation.
    #[must_use]
    pub fn as_label(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Flag(flag) => flag.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Per-chunk sample metadata (year, sample name, data/simulation flag, ...).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Metadata {
    entries: IndexMap<String, MetaValue>,
}

impl Metadata {
    /// Key holding the data-taking year.
    pub const YEAR: &'static str = "year";

    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// The data-taking year, as a label.
    ///
    /// # Errors
    /// Returns an error if no year entry is present.
    pub fn year(&self) -> Result<String> {
        self.get(Self::YEAR)
            .map(MetaValue::as_label)
            .ok_or_else(|| Error::MissingMetadata(Self::YEAR.to_string()))
    }

    /// Iterator over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Read access to one chunk of events.
pub trait EventView {
    /// Number of events in the chunk.
    fn num_events(&self) -> usize;

    /// Event-level fields.
    fn events(&self) -> &dyn FieldSource;

    /// A sub-object collection, if present.
    fn collection(&self, name: &str) -> Option<&dyn FieldSource>;

    /// Chunk metadata.
    fn metadata(&self) -> &Metadata;
}

/// Named fields of one sub-object collection, all sharing one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    structure: Structure,
    fields: IndexMap<String, Column>,
}

impl Collection {
    /// Creates an empty collection with the given per-event object counts.
    #[must_use]
    pub fn from_counts(counts: &[usize]) -> Self {
        Self {
            structure: Structure::from_counts(counts),
            fields: IndexMap::new(),
        }
    }

    /// Creates an empty collection with the given structure.
    #[must_use]
    pub fn with_structure(structure: Structure) -> Self {
        Self {
            structure,
            fields: IndexMap::new(),
        }
    }

    /// Per-event object layout.
    #[must_use]
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Adds a numeric field from flat, row-major values.
    ///
    /// # Errors
    /// Returns an error if `values` does not fill the collection layout.
    pub fn with_values(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let values = values.into_iter().map(Some).collect();
        let column = Column::Numeric(Ragged::with_structure(&self.structure, values)?);
        self.with_field(name, column)
    }

    /// Adds a field. Ragged fields must share the collection structure.
    ///
    /// # Errors
    /// Returns an error if the column is not laid out like the collection.
    pub fn with_field(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        match column.structure() {
            Some(structure) if structure == self.structure => {}
            _ => {
                return Err(Error::StructureMismatch(format!(
                    "field `{name}` does not match the collection layout"
                )))
            }
        }
        self.fields.insert(name, column);
        Ok(self)
    }

    /// Keeps the selected events.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the event count.
    pub fn select_events(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.structure.num_events() {
            return Err(Error::length_mismatch(
                "collection mask",
                self.structure.num_events(),
                mask.len(),
            ));
        }
        let counts: Vec<usize> = self
            .structure
            .counts()
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|(count, _)| count)
            .collect();
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for (name, column) in &self.fields {
            fields.insert(name.clone(), column.select_events(mask)?);
        }
        Ok(Self {
            structure: Structure::from_counts(&counts),
            fields,
        })
    }
}

impl FieldSource for Collection {
    fn get_field(&self, name: &str) -> Option<&Column> {
        self.fields.get(name)
    }
}

/// Event-level fields as a [`FieldSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    fields: IndexMap<String, Column>,
}

impl FieldSource for EventFields {
    fn get_field(&self, name: &str) -> Option<&Column> {
        self.fields.get(name)
    }
}

/// Columnar in-memory chunk of events.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTable {
    num_events: usize,
    fields: EventFields,
    collections: IndexMap<String, Collection>,
    metadata: Metadata,
}

impl EventTable {
    /// Creates an empty table for `num_events` events.
    #[must_use]
    pub fn new(num_events: usize) -> Self {
        Self {
            num_events,
            fields: EventFields::default(),
            collections: IndexMap::new(),
            metadata: Metadata::default(),
        }
    }

    /// Adds an event-level field.
    ///
    /// # Errors
    /// Returns an error if the column event count differs from the table's.
    pub fn with_field(mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<Self> {
        let name = name.into();
        let column = column.into();
        if column.num_events() != self.num_events {
            return Err(Error::length_mismatch(
                format!("event field `{name}`"),
                self.num_events,
                column.num_events(),
            ));
        }
        self.fields.fields.insert(name, column);
        Ok(self)
    }

    /// Adds a sub-object collection.
    ///
    /// # Errors
    /// Returns an error if the collection event count differs from the table's.
    pub fn with_collection(mut self, name: impl Into<String>, collection: Collection) -> Result<Self> {
        let name = name.into();
        if collection.structure.num_events() != self.num_events {
            return Err(Error::length_mismatch(
                format!("collection `{name}`"),
                self.num_events,
                collection.structure.num_events(),
            ));
        }
        self.collections.insert(name, collection);
        Ok(self)
    }

    /// Attaches chunk metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Keeps the selected events, preserving nested collection structure.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the event count.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.num_events {
            return Err(Error::length_mismatch(
                "event table mask",
                self.num_events,
                mask.len(),
            ));
        }
        let mut fields = IndexMap::with_capacity(self.fields.fields.len());
        for (name, column) in &self.fields.fields {
            fields.insert(name.clone(), column.select_events(mask)?);
        }
        let mut collections = IndexMap::with_capacity(self.collections.len());
        for (name, collection) in &self.collections {
            collections.insert(name.clone(), collection.select_events(mask)?);
        }
        Ok(Self {
            num_events: mask.iter().filter(|&&keep| keep).count(),
            fields: EventFields { fields },
            collections,
            metadata: self.metadata.clone(),
        })
    }
}

impl EventView for EventTable {
    fn num_events(&self) -> usize {
        self.num_events
    }

    fn events(&self) -> &dyn FieldSource {
        &self.fields
    }

    fn collection(&self, name: &str) -> Option<&dyn FieldSource> {
        self.collections
            .get(name)
            .map(|collection| collection as &dyn FieldSource)
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
