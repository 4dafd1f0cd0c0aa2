//! Shared utilities
//!
//! - Normalization: z-score standardization of abundances and design matrices
//! - Frame helpers: Polars CSV reading and column extraction with validation

pub mod frame_helpers;
pub mod normalization;

pub use frame_helpers::{float_column, numeric_column_names, read_csv, require_columns, string_column};
pub use normalization::{standardize_columns, standardize_vector, zscore_optional};
