//! Shape reconciliation between masks and axis data.
//!
//! Takes the raw columns of one histogram and the combined
//! category × subsample mask, applies the mask at the right level, broadcasts
//! per-event category labels over sub-objects, flattens everything and drops
//! rows where any axis value is missing. The result is a [`FillPlan`]: aligned
//! flat columns plus what the weight broadcaster needs to follow the same
//! path.

use evhist_core::config::HistogramSpec;
use evhist_core::error::{Error, Result};
use evhist_core::event::Column;
use evhist_core::histogram::FillColumn;
use evhist_core::mask::{CollapseMode, Mask};
use evhist_core::ragged::{Ragged, Structure};

use crate::resolver::ResolvedAxes;

/// How the mask was applied to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    /// An event mask selected events.
    Event,
    /// An object mask was reduced to an event mask with the given mode.
    Collapsed(CollapseMode),
    /// An object mask selected objects; every event is kept.
    Object,
}

/// Flat values of one axis after masking and null removal.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanColumn {
    /// Numeric axis values.
    Numeric(Vec<f64>),
    /// Category axis labels.
    Labels(Vec<String>),
}

/// Fill-ready columns of one histogram for one mask.
#[derive(Debug, Clone)]
pub struct FillPlan {
    columns: Vec<PlanColumn>,
    num_events: usize,
    event_mask: Option<Vec<bool>>,
    selection: SelectionKind,
    structure: Option<Structure>,
    keep: Vec<bool>,
}

impl FillPlan {
    /// Columns in axis order, ready for [`Histogram::fill`](evhist_core::Histogram::fill).
    #[must_use]
    pub fn fill_columns(&self) -> Vec<FillColumn<'_>> {
        self.columns
            .iter()
            .map(|column| match column {
                PlanColumn::Numeric(values) => FillColumn::Numeric(values),
                PlanColumn::Labels(labels) => FillColumn::Labels(labels),
            })
            .collect()
    }

    /// Number of rows that will be filled.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.keep.iter().filter(|&&keep| keep).count()
    }

    /// Number of events of the unmasked chunk.
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.num_events
    }

    /// Event selection applied before flattening, `None` if every event was kept.
    #[must_use]
    pub fn event_mask(&self) -> Option<&[bool]> {
        self.event_mask.as_deref()
    }

    /// How the mask was applied.
    #[must_use]
    pub fn selection(&self) -> SelectionKind {
        self.selection
    }

    /// Layout of the selected data, `None` for per-event data.
    #[must_use]
    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    /// Per flattened entry, whether it survived null removal.
    #[must_use]
    pub fn keep(&self) -> &[bool] {
        &self.keep
    }

    /// Aligns per-event values with the rows of this plan: restricts them to
    /// the selected events, broadcasts over the data layout and drops the
    /// rows removed for missing values.
    ///
    /// # Errors
    /// Returns an error if `per_event` does not hold one value per event.
    pub fn align<T: Clone>(&self, per_event: &[T]) -> Result<Vec<T>> {
        if per_event.len() != self.num_events {
            return Err(Error::length_mismatch(
                "per-event values",
                self.num_events,
                per_event.len(),
            ));
        }
        let selected: Vec<T> = match &self.event_mask {
            Some(mask) => per_event
                .iter()
                .zip(mask)
                .filter(|(_, &keep)| keep)
                .map(|(value, _)| value.clone())
                .collect(),
            None => per_event.to_vec(),
        };
        let expanded = match &self.structure {
            Some(structure) => structure.broadcast(&selected)?,
            None => selected,
        };
        self.filter_rows(expanded)
    }

    /// Drops the rows removed for missing values from already-expanded values.
    ///
    /// # Errors
    /// Returns an error if `expanded` does not hold one value per expanded row.
    pub fn filter_rows<T>(&self, expanded: Vec<T>) -> Result<Vec<T>> {
        if expanded.len() != self.keep.len() {
            return Err(Error::length_mismatch(
                "expanded values",
                self.keep.len(),
                expanded.len(),
            ));
        }
        Ok(expanded
            .into_iter()
            .zip(&self.keep)
            .filter_map(|(value, &keep)| keep.then_some(value))
            .collect())
    }
}

/// Applies `mask` to the resolved columns of `spec` and flattens them.
///
/// Event masks select events. Object masks select objects when the data is
/// ragged; on per-event data they are reduced to event masks if the
/// histogram allows it and refused otherwise.
///
/// # Errors
/// Returns an error if a column and the mask cover different events, or an
/// object mask cannot be applied to the data.
pub fn reconcile(spec: &HistogramSpec, resolved: &ResolvedAxes, mask: &Mask) -> Result<FillPlan> {
    let num_events = mask.num_events();
    for (axis, column) in spec.axes.iter().zip(&resolved.columns) {
        if column.num_events() != num_events {
            return Err(Error::length_mismatch(
                format!("axis `{}` of histogram `{}`", axis.name(), spec.name),
                num_events,
                column.num_events(),
            ));
        }
    }

    let (event_mask, object_mask, selection) = match mask {
        Mask::Event(bits) => (Some(bits.clone()), None, SelectionKind::Event),
        Mask::Object(_) if resolved.data_ndim == 1 => {
            if !spec.collapse_2d_masks {
                return Err(Error::AmbiguousMaskCollapse {
                    histogram: spec.name.clone(),
                });
            }
            let mode = spec.collapse_2d_masks_mode;
            (
                Some(mask.collapse(mode)),
                None,
                SelectionKind::Collapsed(mode),
            )
        }
        Mask::Object(bits) => (None, Some(bits), SelectionKind::Object),
    };

    let mut selected = Vec::with_capacity(resolved.columns.len());
    for column in &resolved.columns {
        let column = match (&event_mask, object_mask) {
            (Some(bits), _) => column.select_events(bits)?,
            (None, Some(objects)) if column.ndim() > 1 => match column {
                Column::Numeric(values) => Column::Numeric(values.select_objects(objects)?),
                Column::Labels(values) => Column::Labels(values.select_objects(objects)?),
            },
            (None, _) => column.clone(),
        };
        selected.push(column);
    }

    let structure = if resolved.data_ndim > 1 {
        selected.iter().find_map(Column::structure)
    } else {
        None
    };

    let mut flat = Vec::with_capacity(selected.len());
    let mut keep: Option<Vec<bool>> = None;
    for (axis, column) in spec.axes.iter().zip(selected) {
        let column = match (&structure, column.structure()) {
            (Some(template), Some(own)) if *template != own => {
                return Err(Error::StructureMismatch(format!(
                    "axis `{}` of histogram `{}` does not share the layout of the other axes",
                    axis.name(),
                    spec.name
                )))
            }
            (None, Some(_)) => {
                return Err(Error::ShapeMismatch {
                    histogram: spec.name.clone(),
                    axis: axis.name(),
                    expected: resolved.data_ndim,
                    found: 2,
                })
            }
            (Some(template), None) => match column {
                Column::Numeric(values) => Column::Numeric(values.broadcast_to(template)?),
                Column::Labels(values) => Column::Labels(values.broadcast_to(template)?),
            },
            _ => column,
        };
        let present = match &column {
            Column::Numeric(values) => values.is_present(),
            Column::Labels(values) => values.is_present(),
        };
        keep = Some(match keep {
            None => present,
            Some(previous) => previous.iter().zip(&present).map(|(&a, &b)| a && b).collect(),
        });
        flat.push(column);
    }
    let keep = keep.unwrap_or_default();

    let columns = flat
        .into_iter()
        .map(|column| match column {
            Column::Numeric(values) => PlanColumn::Numeric(kept(values, &keep)),
            Column::Labels(values) => PlanColumn::Labels(kept(values, &keep)),
        })
        .collect();

    Ok(FillPlan {
        columns,
        num_events,
        event_mask,
        selection,
        structure,
        keep,
    })
}

fn kept<T>(values: Ragged<T>, keep: &[bool]) -> Vec<T> {
    values
        .flatten()
        .into_iter()
        .zip(keep)
        .filter_map(|(value, &keep)| if keep { value } else { None })
        .collect()
}
