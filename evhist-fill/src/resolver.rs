//! Axis resolution: reading the raw values feeding each histogram axis.

use evhist_core::axis::{AxisSource, AxisSpec};
use evhist_core::error::{Error, Result};
use evhist_core::event::{Column, EventView};
use evhist_core::ragged::Ragged;
use indexmap::IndexMap;

/// Raw, unmasked columns of one histogram, in axis order.
#[derive(Debug, Clone)]
pub struct ResolvedAxes {
    /// One column per axis.
    pub columns: Vec<Column>,
    /// Dimensionality shared by the numeric axes (or of the first axis if
    /// the histogram has only category axes).
    pub data_ndim: usize,
}

/// Reads axis values from an event view and caller-supplied custom fields.
pub struct AxisResolver<'a> {
    histogram: &'a str,
    view: &'a dyn EventView,
    custom_fields: Option<&'a IndexMap<String, Column>>,
}

impl<'a> AxisResolver<'a> {
    /// Creates a resolver for the axes of `histogram`.
    pub fn new(
        histogram: &'a str,
        view: &'a dyn EventView,
        custom_fields: Option<&'a IndexMap<String, Column>>,
    ) -> Self {
        Self {
            histogram,
            view,
            custom_fields,
        }
    }

    /// Resolves one axis.
    ///
    /// # Errors
    /// Returns an error if the source field is missing, the position is
    /// negative, or the column has the wrong type or event count.
    pub fn resolve(&self, axis: &AxisSpec) -> Result<Column> {
        let num_events = self.view.num_events();
        let column = match axis.source() {
            AxisSource::Events => self
                .view
                .events()
                .get_field(&axis.field)
                .cloned()
                .ok_or_else(|| Error::MissingField {
                    source_name: "events".to_string(),
                    field: axis.field.clone(),
                })?,
            AxisSource::Metadata => {
                let value = self
                    .view
                    .metadata()
                    .get(&axis.field)
                    .ok_or_else(|| Error::MissingMetadata(axis.field.clone()))?;
                if axis.is_categorical() {
                    Column::Labels(Ragged::repeat(value.as_label(), num_events))
                } else {
                    let number = value.as_f64().ok_or_else(|| Error::TypeMismatch {
                        axis: axis.name(),
                        expected: "numeric",
                    })?;
                    Column::Numeric(Ragged::repeat(number, num_events))
                }
            }
            AxisSource::Custom => {
                let column = self
                    .custom_fields
                    .and_then(|fields| fields.get(&axis.field))
                    .ok_or_else(|| Error::MissingField {
                        source_name: "custom fields".to_string(),
                        field: axis.field.clone(),
                    })?;
                if column.num_events() != num_events {
                    return Err(Error::length_mismatch(
                        format!("custom field `{}`", axis.field),
                        num_events,
                        column.num_events(),
                    ));
                }
                column.clone()
            }
            AxisSource::Collection(coll) => {
                let source = self
                    .view
                    .collection(coll)
                    .ok_or_else(|| Error::MissingCollection(coll.to_string()))?;
                let column = source
                    .get_field(&axis.field)
                    .ok_or_else(|| Error::MissingField {
                        source_name: format!("collection `{coll}`"),
                        field: axis.field.clone(),
                    })?;
                match axis.pos {
                    None => column.clone(),
                    Some(pos) => {
                        let index =
                            usize::try_from(pos).map_err(|_| Error::InvalidAxisPosition {
                                position: pos,
                                collection: coll.to_string(),
                            })?;
                        match column {
                            Column::Numeric(values) => Column::Numeric(values.pad_take(index)?),
                            Column::Labels(values) => Column::Labels(values.pad_take(index)?),
                        }
                    }
                }
            }
        };

        let matches = match &column {
            Column::Numeric(_) => !axis.is_categorical(),
            Column::Labels(_) => axis.is_categorical(),
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
        Ok(column)
    }

    /// Resolves every axis of a histogram and checks that the numeric axes
    /// agree on dimensionality. The first numeric axis sets the expectation.
    ///
    /// # Errors
    /// Returns an error if an axis cannot be resolved or the numeric axes differ
    /// in dimensionality.
    pub fn resolve_all(&self, axes: &[AxisSpec]) -> Result<ResolvedAxes> {
        let mut columns = Vec::with_capacity(axes.len());
        let mut numeric_ndim: Option<usize> = None;
        for axis in axes {
            let column = self.resolve(axis)?;
            if !axis.is_categorical() {
                match numeric_ndim {
                    None => numeric_ndim = Some(column.ndim()),
                    Some(expected) if expected != column.ndim() => {
                        return Err(Error::ShapeMismatch {
                            histogram: self.histogram.to_string(),
                            axis: axis.name(),
                            expected,
                            found: column.ndim(),
                        })
                    }
                    Some(_) => {}
                }
            }
            columns.push(column);
        }
        let data_ndim = numeric_ndim
            .or_else(|| columns.first().map(Column::ndim))
            .unwrap_or(1);
        Ok(ResolvedAxes { columns, data_ndim })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evhist_core::event::{Collection, EventTable, Metadata};

    fn events() -> EventTable {
        let photons = Collection::from_counts(&[2, 1, 0])
            .with_values("pt", vec![60.0, 35.0, 120.0])
            .unwrap();
        EventTable::new(3)
            .with_field("W_transMass", vec![80.0, 40.0, 95.0])
            .unwrap()
            .with_collection("PhotonGood", photons)
            .unwrap()
            .with_metadata(Metadata::new().with("year", "2018"))
    }

    fn numeric(column: Column) -> Ragged<f64> {
        match column {
            Column::Numeric(values) => values,
            Column::Labels(_) => panic!("expected numeric column"),
        }
    }

    #[test]
    fn test_event_field() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);
        let axis = AxisSpec::regular("events", "W_transMass", 10, 0.0, 200.0);
        let values = numeric(resolver.resolve(&axis).unwrap());
        assert_eq!(values.ndim(), 1);
        assert_eq!(values.values()[2], Some(95.0));
    }

    #[test]
    fn test_collection_take_all_and_position() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);

        let all = AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0);
        assert_eq!(resolver.resolve(&all).unwrap().ndim(), 2);

        let second = AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0).with_pos(1);
        let values = numeric(resolver.resolve(&second).unwrap());
        assert_eq!(values.ndim(), 1);
        assert_eq!(values.values(), &[Some(35.0), None, None]);
    }

    #[test]
    fn test_negative_position_rejected() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);
        let axis = AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0).with_pos(-2);
        assert!(matches!(
            resolver.resolve(&axis),
            Err(Error::InvalidAxisPosition { position: -2, .. })
        ));
    }

    #[test]
    fn test_missing_collection() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);
        let axis = AxisSpec::regular("BJetGood", "pt", 10, 0.0, 500.0);
        assert!(matches!(
            resolver.resolve(&axis),
            Err(Error::MissingCollection(name)) if name == "BJetGood"
        ));
    }

    #[test]
    fn test_metadata_broadcast() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);
        let label = AxisSpec::categorical("metadata", "year", ["2017", "2018"]);
        let Column::Labels(years) = resolver.resolve(&label).unwrap() else {
            panic!("expected labels");
        };
        assert_eq!(years.len(), 3);
        let number = AxisSpec::integer("metadata", "year", 2016, 2019);
        let years = numeric(resolver.resolve(&number).unwrap());
        assert_eq!(years.values()[0], Some(2018.0));
    }

    #[test]
    fn test_custom_fields() {
        let events = events();
        let mut custom = IndexMap::new();
        custom.insert("ht".to_string(), Column::from(vec![100.0, 200.0, 300.0]));
        custom.insert("short".to_string(), Column::from(vec![1.0]));
        let resolver = AxisResolver::new("h", &events, Some(&custom));

        let ht = AxisSpec::regular("custom", "ht", 10, 0.0, 1000.0);
        assert!(resolver.resolve(&ht).is_ok());
        let short = AxisSpec::regular("custom", "short", 10, 0.0, 1000.0);
        assert!(matches!(
            resolver.resolve(&short),
            Err(Error::LengthMismatch { .. })
        ));
        let missing = AxisSpec::regular("custom", "nope", 10, 0.0, 1000.0);
        assert!(resolver.resolve(&missing).is_err());
    }

    #[test]
    fn test_dimensionality_mismatch() {
        let events = events();
        let resolver = AxisResolver::new("h", &events, None);
        let axes = vec![
            AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0),
            AxisSpec::regular("events", "W_transMass", 10, 0.0, 200.0),
        ];
        assert!(matches!(
            resolver.resolve_all(&axes),
            Err(Error::ShapeMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));

        let consistent = vec![
            AxisSpec::regular("PhotonGood", "pt", 10, 0.0, 500.0).with_pos(0),
            AxisSpec::regular("events", "W_transMass", 10, 0.0, 200.0),
        ];
        assert_eq!(resolver.resolve_all(&consistent).unwrap().data_ndim, 1);
    }
}
