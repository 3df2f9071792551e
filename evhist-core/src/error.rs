//! Error types for evhist.

use thiserror::Error;

/// Result type alias for evhist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for evhist operations.
///
/// Every variant is fatal for the chunk being processed: histograms are
/// mutated incrementally, so a partially filled chunk cannot be rolled back.
#[derive(Error, Debug)]
pub enum Error {
    /// An axis references a collection absent from the event view.
    #[error("collection `{0}` not found in events")]
    MissingCollection(String),

    /// A field is absent from the event view, a collection or the custom fields.
    #[error("field `{field}` not found in {source_name}")]
    MissingField { source_name: String, field: String },

    /// Numeric axes of one histogram disagree in dimensionality.
    #[error(
        "incompatible shapes for axis `{axis}` of histogram `{histogram}`: \
         expected dimensionality {expected}, found {found}"
    )]
    ShapeMismatch {
        histogram: String,
        axis: String,
        expected: usize,
        found: usize,
    },

    /// A per-object mask would have to be collapsed onto per-event data.
    #[error(
        "histogram `{histogram}` is filled with per-event values (dimensionality 1) \
         but masked with a per-object mask (dimensionality 2). This happens when a \
         category or subsample cuts on a collection (e.g. jets) while the histogram \
         reads an event-level quantity or a fixed position such as `JetGood.pt[1]`: \
         the value would be filled even if that object fails the cut, because the \
         mask has to be reduced to one entry per event. Set `collapse_2d_masks` on \
         the histogram to accept this, choosing `collapse_2d_masks_mode` OR (event \
         kept if any object passes) or AND (event kept if all objects pass)"
    )]
    AmbiguousMaskCollapse { histogram: String },

    /// A negative fixed position was requested for a collection axis.
    #[error("invalid position {position} requested for collection `{collection}`")]
    InvalidAxisPosition { position: i64, collection: String },

    /// The terminal histogram fill failed.
    #[error("cannot fill histogram `{histogram}` ({config}): {source}")]
    Fill {
        histogram: String,
        config: String,
        #[source]
        source: Box<Error>,
    },

    /// Two arrays that must be aligned have different lengths.
    #[error("length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    /// Two ragged arrays do not share the same per-event structure.
    #[error("ragged structure mismatch: {0}")]
    StructureMismatch(String),

    /// A column has the wrong value type for the axis it feeds.
    #[error("axis `{axis}` expects {expected} values")]
    TypeMismatch {
        axis: String,
        expected: &'static str,
    },

    /// Invalid binning definition.
    #[error("invalid binning for axis `{axis}`: {reason}")]
    InvalidBinning { axis: String, reason: String },

    /// Category label not declared on the histogram.
    #[error("unknown category `{0}`")]
    UnknownCategory(String),

    /// Variation label not declared on the histogram, or a variation given
    /// for a histogram without a variation axis (and vice versa).
    #[error("unknown variation `{0}`")]
    UnknownVariation(String),

    /// Subsample not booked in the histogram manager.
    #[error("unknown subsample `{0}`")]
    UnknownSubsample(String),

    /// The weight provider returned no nominal weight for a category.
    #[error("no nominal weight available for category `{0}`")]
    MissingNominalWeight(String),

    /// Required metadata entry is absent.
    #[error("metadata entry `{0}` not found")]
    MissingMetadata(String),

    /// A category strategy names a correction provider that is not registered.
    #[error("correction provider `{0}` is not registered")]
    MissingCorrection(String),

    /// Histograms cannot be merged.
    #[error("incompatible histograms: {0}")]
    IncompatibleHistograms(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Builds a [`Error::LengthMismatch`].
    pub fn length_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::LengthMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    /// Wraps an error raised by a histogram fill with the histogram context.
    #[must_use]
    pub fn fill(histogram: impl Into<String>, config: impl Into<String>, source: Error) -> Self {
        Self::Fill {
            histogram: histogram.into(),
            config: config.into(),
            source: Box::new(source),
        }
    }
}
