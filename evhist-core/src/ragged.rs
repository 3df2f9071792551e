//! Ragged (variable length per event) value storage.
//!
//! A [`Ragged`] stores its values in one flat vector plus an optional offsets
//! vector, the same columnar layout `HitBatch` uses for hits. Without offsets
//! the array holds exactly one value per event (dimensionality 1); with
//! offsets, event `i` owns `values[offsets[i]..offsets[i + 1]]`
//! (dimensionality 2). Missing values are `None`.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-event layout of a ragged array, used to broadcast per-event
/// quantities (weights, event-level labels) over sub-objects.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "StructureRepr"))]
pub struct Structure {
    offsets: Vec<usize>,
}

impl Structure {
    /// Creates a structure from offsets (`num_events + 1` entries starting at 0).
    ///
    /// # Errors
    /// Returns an error if the offsets are empty, do not start at 0 or decrease.
    pub fn from_offsets(offsets: Vec<usize>) -> Result<Self> {
        validate_offsets(&offsets, None)?;
        Ok(Self { offsets })
    }

    /// Creates a structure from per-event object counts.
    #[must_use]
    pub fn from_counts(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        let mut total = 0;
        for &count in counts {
            total += count;
            offsets.push(total);
        }
        Self { offsets }
    }

    /// Number of events described by the structure.
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of sub-objects (the flattened length).
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Returns true if there are no sub-objects at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets of the structure.
    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Iterator over the number of sub-objects of each event.
    pub fn counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.offsets.windows(2).map(|w| w[1] - w[0])
    }

    /// Repeats each per-event value once per sub-object of that event and
    /// returns the flattened result in row-major (event, object) order.
    ///
    /// # Errors
    /// Returns an error if `per_event` does not hold one value per event.
    pub fn broadcast<T: Clone>(&self, per_event: &[T]) -> Result<Vec<T>> {
        if per_event.len() != self.num_events() {
            return Err(Error::length_mismatch(
                "per-event values broadcast over ragged structure",
                self.num_events(),
                per_event.len(),
            ));
        }
        let mut out = Vec::with_capacity(self.len());
        for (value, count) in per_event.iter().zip(self.counts()) {
            out.extend(std::iter::repeat(value).take(count).cloned());
        }
        Ok(out)
    }
}

/// A ragged array of optional values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "RaggedRepr<T>",
        bound(deserialize = "T: Deserialize<'de>")
    )
)]
pub struct Ragged<T> {
    values: Vec<Option<T>>,
    offsets: Option<Vec<usize>>,
}

impl<T> Ragged<T> {
    /// One (possibly missing) value per event.
    #[must_use]
    pub fn per_event(values: Vec<Option<T>>) -> Self {
        Self {
            values,
            offsets: None,
        }
    }

    /// One value per event, none missing.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::per_event(values.into_iter().map(Some).collect())
    }

    /// Ragged array from offsets and flat values.
    ///
    /// # Errors
    /// Returns an error if the offsets are malformed or do not end at the flat length.
    pub fn jagged(offsets: Vec<usize>, values: Vec<Option<T>>) -> Result<Self> {
        validate_offsets(&offsets, Some(values.len()))?;
        Ok(Self {
            values,
            offsets: Some(offsets),
        })
    }

    /// Ragged array from a structure and flat values.
    ///
    /// # Errors
    /// Returns an error if `values` does not fill `structure`.
    pub fn with_structure(structure: &Structure, values: Vec<Option<T>>) -> Result<Self> {
        Self::jagged(structure.offsets.clone(), values)
    }

    /// Ragged array from nested per-event vectors.
    pub fn from_nested(nested: Vec<Vec<T>>) -> Self {
        let counts: Vec<usize> = nested.iter().map(Vec::len).collect();
        let Structure { offsets } = Structure::from_counts(&counts);
        let values = nested.into_iter().flatten().map(Some).collect();
        Self {
            values,
            offsets: Some(offsets),
        }
    }

    /// Nesting depth: 1 for per-event values, 2 for per-object values.
    #[must_use]
    pub fn ndim(&self) -> usize {
        if self.offsets.is_some() {
            2
        } else {
            1
        }
    }

    /// Number of events.
    #[must_use]
    pub fn num_events(&self) -> usize {
        match &self.offsets {
            Some(offsets) => offsets.len() - 1,
            None => self.values.len(),
        }
    }

    /// Number of flat values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no flat values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flat values in row-major order.
    #[must_use]
    pub fn values(&self) -> &[Option<T>] {
        &self.values
    }

    /// Offsets, if the array is ragged.
    #[must_use]
    pub fn offsets(&self) -> Option<&[usize]> {
        self.offsets.as_deref()
    }

    /// Per-event layout, if the array is ragged.
    #[must_use]
    pub fn structure(&self) -> Option<Structure> {
        self.offsets.as_ref().map(|offsets| Structure {
            offsets: offsets.clone(),
        })
    }

    /// Values belonging to event `index`.
    #[must_use]
    pub fn event(&self, index: usize) -> &[Option<T>] {
        match &self.offsets {
            Some(offsets) => &self.values[offsets[index]..offsets[index + 1]],
            None => std::slice::from_ref(&self.values[index]),
        }
    }

    /// Flat "is not missing" indicator.
    #[must_use]
    pub fn is_present(&self) -> Vec<bool> {
        self.values.iter().map(Option::is_some).collect()
    }

    /// Drops the event structure, keeping the row-major flat values.
    #[must_use]
    pub fn flatten(self) -> Vec<Option<T>> {
        self.values
    }
}

impl<T: Clone> Ragged<T> {
    /// Keeps the events whose mask entry is true, preserving nested structure.
    ///
    /// # Errors
    /// Returns an error if the mask length differs from the event count.
    pub fn select_events(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.num_events() {
            return Err(Error::length_mismatch(
                "event mask",
                self.num_events(),
                mask.len(),
            ));
        }
        match &self.offsets {
            None => Ok(Self::per_event(
                self.values
                    .iter()
                    .zip(mask)
                    .filter(|(_, &keep)| keep)
                    .map(|(value, _)| value.clone())
                    .collect(),
            )),
            Some(offsets) => {
                let mut new_offsets = Vec::with_capacity(mask.len() + 1);
                new_offsets.push(0);
                let mut values = Vec::new();
                for (event, &keep) in mask.iter().enumerate() {
                    if keep {
                        values.extend_from_slice(&self.values[offsets[event]..offsets[event + 1]]);
                        new_offsets.push(values.len());
                    }
                }
                Ok(Self {
                    values,
                    offsets: Some(new_offsets),
                })
            }
        }
    }

    /// Keeps the sub-objects whose mask entry is true. Both arrays must be
    /// ragged with identical structure; missing mask entries count as false.
    ///
    /// # Errors
    /// Returns an error if either array is per-event or their layouts differ.
    pub fn select_objects(&self, mask: &Ragged<bool>) -> Result<Self> {
        let (Some(offsets), Some(mask_offsets)) = (&self.offsets, &mask.offsets) else {
            return Err(Error::StructureMismatch(
                "object-level selection requires ragged values and a ragged mask".to_string(),
            ));
        };
        if offsets != mask_offsets {
            return Err(Error::StructureMismatch(format!(
                "mask covers {} objects in {} events, values have {} objects in {} events",
                mask.len(),
                mask.num_events(),
                self.len(),
                self.num_events()
            )));
        }
        let mut new_offsets = Vec::with_capacity(offsets.len());
        new_offsets.push(0);
        let mut values = Vec::new();
        for window in offsets.windows(2) {
            for idx in window[0]..window[1] {
                if mask.values[idx] == Some(true) {
                    values.push(self.values[idx].clone());
                }
            }
            new_offsets.push(values.len());
        }
        Ok(Self {
            values,
            offsets: Some(new_offsets),
        })
    }

    /// Pads every event to at least `pos + 1` entries with missing values and
    /// takes entry `pos`, giving one (possibly missing) value per event.
    ///
    /// # Errors
    /// Returns an error if the values are per-event.
    pub fn pad_take(&self, pos: usize) -> Result<Self> {
        let Some(offsets) = &self.offsets else {
            return Err(Error::StructureMismatch(format!(
                "cannot take position {pos} of per-event values"
            )));
        };
        let values = offsets
            .windows(2)
            .map(|w| {
                if w[0] + pos < w[1] {
                    self.values[w[0] + pos].clone()
                } else {
                    None
                }
            })
            .collect();
        Ok(Self::per_event(values))
    }

    /// Broadcasts per-event values over `structure`.
    ///
    /// # Errors
    /// Returns an error if the values are already ragged or the event counts differ.
    pub fn broadcast_to(&self, structure: &Structure) -> Result<Self> {
        if self.offsets.is_some() {
            return Err(Error::StructureMismatch(
                "only per-event values can be broadcast".to_string(),
            ));
        }
        Ok(Self {
            values: structure.broadcast(&self.values)?,
            offsets: Some(structure.offsets.clone()),
        })
    }

    /// Repeats a single value for `num_events` events.
    pub fn repeat(value: T, num_events: usize) -> Self {
        Self::per_event(vec![Some(value); num_events])
    }
}

/// Wire form of [`Structure`], checked on the way in.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct StructureRepr {
    offsets: Vec<usize>,
}

#[cfg(feature = "serde")]
impl TryFrom<StructureRepr> for Structure {
    type Error = Error;

    fn try_from(repr: StructureRepr) -> Result<Self> {
        Self::from_offsets(repr.offsets)
    }
}

/// Wire form of [`Ragged`], checked on the way in.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RaggedRepr<T> {
    values: Vec<Option<T>>,
    #[serde(default)]
    offsets: Option<Vec<usize>>,
}

#[cfg(feature = "serde")]
impl<T> TryFrom<RaggedRepr<T>> for Ragged<T> {
    type Error = Error;

    fn try_from(repr: RaggedRepr<T>) -> Result<Self> {
        match repr.offsets {
            Some(offsets) => Self::jagged(offsets, repr.values),
            None => Ok(Self::per_event(repr.values)),
        }
    }
}

fn validate_offsets(offsets: &[usize], flat_len: Option<usize>) -> Result<()> {
    if offsets.first() != Some(&0) {
        return Err(Error::StructureMismatch(
            "offsets must start with 0".to_string(),
        ));
    }
    if offsets.windows(2).any(|w| w[1] < w[0]) {
        return Err(Error::StructureMismatch(
            "offsets must be non-decreasing".to_string(),
        ));
    }
    if let Some(len) = flat_len {
        let last = offsets[offsets.len() - 1];
        if last != len {
            return Err(Error::length_mismatch("ragged values", last, len));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensionality() {
        let flat = Ragged::from_values([1.0, 2.0, 3.0]);
        assert_eq!(flat.ndim(), 1);
        assert_eq!(flat.num_events(), 3);

        let nested = Ragged::from_nested(vec![vec![1.0, 2.0], vec![], vec![3.0]]);
        assert_eq!(nested.ndim(), 2);
        assert_eq!(nested.num_events(), 3);
        assert_eq!(nested.len(), 3);
        assert_eq!(nested.offsets(), Some(&[0, 2, 2, 3][..]));
    }

    #[test]
    fn test_jagged_rejects_bad_offsets() {
        assert!(Ragged::<f64>::jagged(vec![1, 2], vec![None]).is_err());
        assert!(Ragged::jagged(vec![0, 2, 1], vec![Some(1.0)]).is_err());
        assert!(Ragged::jagged(vec![0, 2], vec![Some(1.0)]).is_err());
        assert!(Ragged::jagged(vec![0, 1], vec![Some(1.0)]).is_ok());
    }

    #[test]
    fn test_select_events_keeps_structure() {
        let nested = Ragged::from_nested(vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
        let selected = nested.select_events(&[true, false, true]).unwrap();
        assert_eq!(selected.num_events(), 2);
        assert_eq!(selected.event(0), &[Some(1), Some(2)]);
        assert_eq!(selected.event(1), &[Some(4), Some(5), Some(6)]);

        assert!(nested.select_events(&[true]).is_err());
    }

    #[test]
    fn test_select_objects() {
        let values = Ragged::from_nested(vec![vec![10, 20], vec![30], vec![]]);
        let mask = Ragged::from_nested(vec![vec![false, true], vec![true], vec![]]);
        let selected = values.select_objects(&mask).unwrap();
        assert_eq!(selected.num_events(), 3);
        assert_eq!(selected.values(), &[Some(20), Some(30)]);
        assert_eq!(selected.offsets(), Some(&[0, 1, 2, 2][..]));

        let wrong = Ragged::from_nested(vec![vec![true], vec![true], vec![]]);
        assert!(values.select_objects(&wrong).is_err());
    }

    #[test]
    fn test_pad_take() {
        let values = Ragged::from_nested(vec![vec![1.0, 2.0], vec![3.0], vec![]]);
        let second = values.pad_take(1).unwrap();
        assert_eq!(second.ndim(), 1);
        assert_eq!(second.values(), &[Some(2.0), None, None]);

        let first = values.pad_take(0).unwrap();
        assert_eq!(first.values(), &[Some(1.0), Some(3.0), None]);

        assert!(first.pad_take(0).is_err());
    }

    #[test]
    fn test_structure_broadcast() {
        let structure = Structure::from_counts(&[2, 0, 3]);
        assert_eq!(structure.len(), 5);
        let out = structure.broadcast(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 3.0, 3.0, 3.0]);
        assert!(structure.broadcast(&[1.0]).is_err());
    }

    #[test]
    fn test_broadcast_to_ragged() {
        let labels = Ragged::from_values(["a".to_string(), "b".to_string()]);
        let structure = Structure::from_counts(&[1, 2]);
        let out = labels.broadcast_to(&structure).unwrap();
        assert_eq!(out.ndim(), 2);
        assert_eq!(
            out.values(),
            &[
                Some("a".to_string()),
                Some("b".to_string()),
                Some("b".to_string())
            ]
        );
    }
}
