//! Environmental Selectivity Ratio
//!
//! Estimates which value ranges of an environmental variable (air or soil
//! temperature, soil moisture) a taxon's abundance is associated with, from
//! field time series and per-position abundance tables.
//!
//! Pipeline per taxon / variable / season:
//! - `series/`: region tagging, time window around the sampling date, season
//! - `features/`: frequency binning and joining with abundances
//! - `selectivity/`: PLS selectivity ratio, permutation p-values, LOWESS
//! - `scorer`: end-to-end coordinator, sequential and Rayon-parallel over taxa
//! - `data` / `export`: Polars CSV input and output

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod scorer;
pub mod selectivity;
pub mod series;
pub mod utils;

// Re-export commonly used types
pub use config::AnalysisConfig;
pub use data::StudyData;
pub use error::SelectivityError;
pub use features::{AbundanceTable, BinningPolicy, FrequencyTable, JoinedSample};
pub use scorer::{prepare_features, SelectivityScorer};
pub use selectivity::{SelectivityResult, SelectivityRow};
pub use series::{EnvVariable, EnvironmentalSeries, Region, Season};
