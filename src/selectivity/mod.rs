//! Selectivity ratio analysis
//!
//! Numeric core, no I/O:
//! - `pls`: NIPALS PLS1
//! - `ratio`: repeated-subsampling selectivity ratio estimate
//! - `permutation`: empirical p-values by shuffling the response
//! - `smoothing`: LOWESS
//! - `compose`: ordered result rows with smoothed curves

pub mod compose;
pub mod permutation;
pub mod pls;
pub mod ratio;
pub mod smoothing;

pub use compose::{compose, SelectivityResult, SelectivityRow, SmoothingConfig};
pub use permutation::{p_values, PermutationConfig, PermutationOutcome};
pub use pls::{fit_pls1, PlsModel};
pub use ratio::{estimate, latent_variables, selectivity_ratio, EstimateConfig, RatioEstimate};
pub use smoothing::lowess;
