//! Boolean selections over events or sub-objects.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::ragged::Ragged;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a per-object mask is reduced to one entry per event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum CollapseMode {
    /// Event kept if any object passes.
    #[default]
    Or,
    /// Event kept only if all objects pass (vacuously true for events
    /// without objects).
    And,
}

/// A boolean selection, either one entry per event or one per sub-object.
#[derive(Debug, Clone, PartialEq)]
pub enum Mask {
    /// Dimensionality 1.
    Event(Vec<bool>),
    /// Dimensionality 2; missing entries count as false.
    Object(Ragged<bool>),
}

impl Mask {
    /// Mask selecting every one of `num_events` events.
    #[must_use]
    pub fn all(num_events: usize) -> Self {
        Self::Event(vec![true; num_events])
    }

    /// Nesting depth of the mask.
    #[must_use]
    pub fn ndim(&self) -> usize {
        match self {
            Self::Event(_) => 1,
            Self::Object(mask) => mask.ndim(),
        }
    }

    /// Number of events the mask is aligned to.
    #[must_use]
    pub fn num_events(&self) -> usize {
        match self {
            Self::Event(mask) => mask.len(),
            Self::Object(mask) => mask.num_events(),
        }
    }

    /// Number of true entries (events or objects).
    #[must_use]
    pub fn count_true(&self) -> usize {
        match self {
            Self::Event(mask) => mask.iter().filter(|&&keep| keep).count(),
            Self::Object(mask) => mask.values().iter().filter(|v| **v == Some(true)).count(),
        }
    }

    /// Returns true if no entry is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count_true() == 0
    }

    /// Logical AND of two masks aligned to the same events.
    ///
    /// An event mask combined with an object mask broadcasts the event bit
    /// over that event's objects.
    ///
    /// # Errors
    /// Returns an error if the masks cover different events or their object layouts differ.
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        if self.num_events() != other.num_events() {
            return Err(Error::length_mismatch(
                "combined masks",
                self.num_events(),
                other.num_events(),
            ));
        }
        match (self, other) {
            (Self::Event(a), Self::Event(b)) => Ok(Self::Event(
                a.iter().zip(b).map(|(&x, &y)| x && y).collect(),
            )),
            (Self::Event(event), Self::Object(object))
            | (Self::Object(object), Self::Event(event)) => {
                let Some(structure) = object.structure() else {
                    return Err(Error::StructureMismatch(
                        "object mask without ragged structure".to_string(),
                    ));
                };
                let event_bits = structure.broadcast(event)?;
                let values = object
                    .values()
                    .iter()
                    .zip(event_bits)
                    .map(|(v, bit)| Some(*v == Some(true) && bit))
                    .collect();
                Ok(Self::Object(Ragged::with_structure(&structure, values)?))
            }
            (Self::Object(a), Self::Object(b)) => {
                if a.offsets() != b.offsets() {
                    return Err(Error::StructureMismatch(
                        "object masks refer to different collections".to_string(),
                    ));
                }
                let values = a
                    .values()
                    .iter()
                    .zip(b.values())
                    .map(|(x, y)| Some(*x == Some(true) && *y == Some(true)))
                    .collect();
                let structure = a.structure().ok_or_else(|| {
                    Error::StructureMismatch("object mask without ragged structure".to_string())
                })?;
                Ok(Self::Object(Ragged::with_structure(&structure, values)?))
            }
        }
    }

    /// Reduces the mask to one entry per event. Event masks are returned as is.
    #[must_use]
    pub fn collapse(&self, mode: CollapseMode) -> Vec<bool> {
        match self {
            Self::Event(mask) => mask.clone(),
            Self::Object(mask) => (0..mask.num_events())
                .map(|event| {
                    let mut objects = mask.event(event).iter().map(|v| *v == Some(true));
                    match mode {
                        CollapseMode::Or => objects.any(|keep| keep),
                        CollapseMode::And => objects.all(|keep| keep),
                    }
                })
                .collect(),
        }
    }
}

impl From<Vec<bool>> for Mask {
    fn from(mask: Vec<bool>) -> Self {
        Self::Event(mask)
    }
}

impl From<Ragged<bool>> for Mask {
    fn from(mask: Ragged<bool>) -> Self {
        if mask.ndim() == 1 {
            Self::Event(mask.values().iter().map(|v| *v == Some(true)).collect())
        } else {
            Self::Object(mask)
        }
    }
}

/// Source of named masks, one per category or subsample.
pub trait MaskProvider {
    /// Returns the `(name, mask)` pairs in a stable order.
    fn get_masks(&self) -> Vec<(&str, &Mask)>;
}

/// An ordered set of named masks.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    masks: IndexMap<String, Mask>,
}

impl Selection {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single mask selecting all events under `name`.
    #[must_use]
    pub fn inclusive(name: impl Into<String>, num_events: usize) -> Self {
        Self::new().with_mask(name, Mask::all(num_events))
    }

    /// Adds (or replaces) a named mask.
    #[must_use]
    pub fn with_mask(mut self, name: impl Into<String>, mask: impl Into<Mask>) -> Self {
        self.add(name, mask);
        self
    }

    /// Adds (or replaces) a named mask.
    pub fn add(&mut self, name: impl Into<String>, mask: impl Into<Mask>) {
        self.masks.insert(name.into(), mask.into());
    }

    /// Looks up a mask by name.
    #[must_use]
    pub fn get_mask(&self, name: &str) -> Option<&Mask> {
        self.masks.get(name)
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.masks.keys().map(String::as_str)
    }

    /// Number of masks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Returns true if the selection holds no masks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl MaskProvider for Selection {
    fn get_masks(&self) -> Vec<(&str, &Mask)> {
        self.masks.iter().map(|(name, mask)| (name.as_str(), mask)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(rows: Vec<Vec<bool>>) -> Mask {
        Mask::Object(Ragged::from_nested(rows))
    }

    #[test]
    fn test_collapse_or_and() {
        let mask = nested(vec![vec![true, false], vec![false, false], vec![true, true]]);
        assert_eq!(mask.collapse(CollapseMode::Or), vec![true, false, true]);
        assert_eq!(mask.collapse(CollapseMode::And), vec![false, false, true]);
    }

    #[test]
    fn test_collapse_empty_event() {
        let mask = nested(vec![vec![], vec![true]]);
        assert_eq!(mask.collapse(CollapseMode::Or), vec![false, true]);
        assert_eq!(mask.collapse(CollapseMode::And), vec![true, true]);
    }

    #[test]
    fn test_event_and_event() {
        let category = Mask::from(vec![true, false, true, true]);
        let subsample = Mask::from(vec![true, true, false, true]);
        let combined = category.and(&subsample).unwrap();
        assert_eq!(combined, Mask::Event(vec![true, false, false, true]));
        assert_eq!(combined.count_true(), 2);
    }

    #[test]
    fn test_event_and_object_broadcasts() {
        let event = Mask::from(vec![false, true]);
        let object = nested(vec![vec![true, true], vec![false, true]]);
        let combined = event.and(&object).unwrap();
        assert_eq!(combined.ndim(), 2);
        assert_eq!(combined.count_true(), 1);
        assert_eq!(combined, object.and(&event).unwrap());
    }

    #[test]
    fn test_and_length_mismatch() {
        let a = Mask::from(vec![true, false]);
        let b = Mask::from(vec![true]);
        assert!(a.and(&b).is_err());
    }

    #[test]
    fn test_selection_order() {
        let selection = Selection::new()
            .with_mask("SR", vec![true, false])
            .with_mask("CR", vec![false, true]);
        let names: Vec<&str> = selection.get_masks().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["SR", "CR"]);
        assert!(selection.get_mask("SR").is_some());
        assert!(selection.get_mask("XX").is_none());
    }
}
