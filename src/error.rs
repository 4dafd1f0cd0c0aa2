//! Error taxonomy for the selectivity-ratio pipeline
//!
//! Every condition here is deterministic given its inputs, so nothing in the
//! numeric core retries. Callers adjust configuration (smaller `n_components`,
//! larger subsample fraction, coarser step) and run again.

use thiserror::Error;

/// Errors raised by windowing, binning, assembly and the PLS engine
#[derive(Debug, Error)]
pub enum SelectivityError {
    /// Explicit window bounds are unusable for the given sampling date
    #[error("invalid date range for {parameter}: {reason}")]
    InvalidDateRange { parameter: String, reason: String },

    /// A date-time string does not match `dd.mm.yyyy HH:MM`
    #[error("cannot parse '{value}' as date-time (expected dd.mm.yyyy HH:MM)")]
    DateFormat { value: String },

    /// Nothing survived windowing and season filtering
    #[error("no observations left after filtering: {context}")]
    EmptyFilterResult { context: String },

    /// Taxon id absent from the abundance table
    #[error("taxon id '{id}' not found in column '{column}'")]
    UnknownIdentifier { id: String, column: String },

    /// Taxon id present on more than one row
    #[error("taxon id '{id}' matches {count} rows in column '{column}'")]
    AmbiguousIdentifier { id: String, column: String, count: usize },

    /// Structural disagreement between features and abundances
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch { context: String, expected: usize, found: usize },

    /// Every feature column is constant once joined
    #[error("no informative features: all {n_columns} frequency columns are constant across {n_rows} positions")]
    NoInformativeFeatures { n_columns: usize, n_rows: usize },

    /// Too few rows for the requested number of latent variables
    #[error("insufficient samples: {n_rows} rows cannot support {requested} latent variable(s) (at most {max_allowed})")]
    InsufficientSamples { n_rows: usize, requested: usize, max_allowed: usize },

    /// A configuration value is outside its domain
    #[error("invalid parameter {parameter} = {value}: {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },

    /// Position column name carries no (or conflicting) region tag
    #[error("column '{column}' has no unambiguous east/west tag")]
    UntaggedColumn { column: String },

    /// Timestamps must strictly increase within a series
    #[error("timestamps not strictly increasing at row {row}")]
    NonMonotonicTimestamps { row: usize },

    /// The permutation deadline expired before any trial finished
    #[error("permutation budget exhausted: 0 of {requested} trials completed within {seconds}s")]
    PermutationBudgetExhausted { requested: usize, seconds: f64 },
}

/// Result alias for the numeric core
pub type Result<T> = std::result::Result<T, SelectivityError>;

impl SelectivityError {
    /// Shorthand for [`SelectivityError::InvalidParameter`]
    pub fn invalid_parameter(
        parameter: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        SelectivityError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_parameter_and_value() {
        let err = SelectivityError::InsufficientSamples { n_rows: 3, requested: 3, max_allowed: 2 };
        let msg = err.to_string();
        assert!(msg.contains("3 rows"));
        assert!(msg.contains("at most 2"));

        let err = SelectivityError::invalid_parameter("step", -1.0, "must be positive");
        assert_eq!(err.to_string(), "invalid parameter step = -1: must be positive");
    }

    #[test]
    fn test_converts_into_anyhow() {
        let err: anyhow::Error = SelectivityError::UnknownIdentifier {
            id: "OTU_7".to_string(),
            column: "OTU".to_string(),
        }
        .into();
        assert!(matches!(
            err.downcast_ref::<SelectivityError>(),
            Some(SelectivityError::UnknownIdentifier { .. })
        ));
    }
}
