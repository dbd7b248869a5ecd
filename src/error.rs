use thiserror::Error;

/// Errors raised by the filter, ranker and allocator stages.
///
/// Validation variants are returned before any computation starts.
/// `Division` and `UnallocatableBudget` abort the whole stage result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    /// A min/max pair where min > max (or either bound is not a number).
    #[error("Invalid {field} range: min {min} is greater than max {max}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    /// A threshold outside its allowed domain.
    #[error("Invalid {field}: {value} is outside [{lower}, {upper}]")]
    InvalidConstraint {
        field: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// Non-positive budget, non-positive top count, bad precision.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A degenerate record reached scoring. Upstream validation should
    /// have rejected it.
    #[error("Division error for '{city}': {reason}")]
    Division { city: String, reason: String },

    /// Every ranked location scored zero, so there is no proportional basis.
    #[error("Cannot allocate budget: total cost efficiency across {locations} location(s) is zero")]
    UnallocatableBudget { locations: usize },
}

pub type PlacementResult<T> = Result<T, PlacementError>;
