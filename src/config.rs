//! Analysis configuration
//!
//! Every parameter of a run is an explicit field here and is threaded into
//! the stages that need it; nothing is read from process-wide state.
//!
//! Loaded from JSON:
//!
//! ```json
//! {
//!   "variable": "AT",
//!   "environment_path": "data/air_temperature.csv",
//!   "taxa_path": "data/otu_table.csv",
//!   "sampling_dates": { "east": "15.07.2021 12:00", "west": "16.07.2021 09:30" },
//!   "season": "summer",
//!   "seed": 42
//! }
//! ```

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SelectivityError;
use crate::features::BinningPolicy;
use crate::selectivity::{EstimateConfig, PermutationConfig, SmoothingConfig};
use crate::series::{parse_datetime, EnvVariable, Region, SamplingWindow, Season};

fn default_id_column() -> String {
    "OTU".to_string()
}
fn default_span_hours() -> i64 {
    240
}
fn default_step() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_n_folds() -> usize {
    100
}
fn default_subsample_fraction() -> f64 {
    0.8
}
fn default_n_permutations() -> usize {
    1000
}
fn default_smoothing_span() -> f64 {
    0.3
}
fn default_smoothing_iterations() -> usize {
    3
}
fn default_significance_threshold() -> f64 {
    0.1
}

/// Parameters of one selectivity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub variable: EnvVariable,
    pub environment_path: PathBuf,
    pub taxa_path: PathBuf,
    #[serde(default = "default_id_column")]
    pub taxon_id_column: String,

    /// Sampling date per region, `dd.mm.yyyy HH:MM`
    pub sampling_dates: BTreeMap<Region, String>,
    #[serde(default = "default_span_hours")]
    pub span_hours: i64,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,

    #[serde(default)]
    pub season: Season,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default)]
    pub binning: BinningPolicy,
    #[serde(default = "default_true")]
    pub normalize_abundance: bool,

    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    #[serde(default = "default_subsample_fraction")]
    pub subsample_fraction: f64,
    #[serde(default)]
    pub n_components: Option<usize>,

    #[serde(default = "default_n_permutations")]
    pub n_permutations: usize,
    #[serde(default)]
    pub permutation_deadline_secs: Option<f64>,

    #[serde(default = "default_smoothing_span")]
    pub smoothing_span: f64,
    #[serde(default = "default_smoothing_iterations")]
    pub smoothing_iterations: usize,
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,

    /// Fixed seed for a reproducible run; drawn from entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Where frequency tables and results are written, if anywhere
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl AnalysisConfig {
    /// Defaults for everything but the inputs
    pub fn new(
        variable: EnvVariable,
        environment_path: impl Into<PathBuf>,
        taxa_path: impl Into<PathBuf>,
        sampling_dates: BTreeMap<Region, String>,
    ) -> Self {
        Self {
            variable,
            environment_path: environment_path.into(),
            taxa_path: taxa_path.into(),
            taxon_id_column: default_id_column(),
            sampling_dates,
            span_hours: default_span_hours(),
            start: None,
            end: None,
            season: Season::default(),
            step: default_step(),
            binning: BinningPolicy::default(),
            normalize_abundance: true,
            n_folds: default_n_folds(),
            subsample_fraction: default_subsample_fraction(),
            n_components: None,
            n_permutations: default_n_permutations(),
            permutation_deadline_secs: None,
            smoothing_span: default_smoothing_span(),
            smoothing_iterations: default_smoothing_iterations(),
            significance_threshold: default_significance_threshold(),
            seed: None,
            output_dir: None,
        }
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AnalysisConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        Ok(config)
    }

    /// Check every field against its domain
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(SelectivityError::invalid_parameter("step", self.step, "must be a positive number"));
        }
        if self.span_hours < 0 {
            return Err(SelectivityError::invalid_parameter("span_hours", self.span_hours, "must not be negative"));
        }
        if !(self.subsample_fraction > 0.0 && self.subsample_fraction <= 1.0) {
            return Err(SelectivityError::invalid_parameter(
                "subsample_fraction",
                self.subsample_fraction,
                "must lie in (0, 1]",
            ));
        }
        if !(self.smoothing_span > 0.0 && self.smoothing_span <= 1.0) {
            return Err(SelectivityError::invalid_parameter(
                "smoothing_span",
                self.smoothing_span,
                "must lie in (0, 1]",
            ));
        }
        if !(self.significance_threshold > 0.0 && self.significance_threshold < 1.0) {
            return Err(SelectivityError::invalid_parameter(
                "significance_threshold",
                self.significance_threshold,
                "must lie in (0, 1)",
            ));
        }
        if let Some(k) = self.n_components {
            if !(1..=crate::selectivity::ratio::MAX_COMPONENTS).contains(&k) {
                return Err(SelectivityError::invalid_parameter("n_components", k, "must be between 1 and 3"));
            }
        }
        if self.n_folds == 0 {
            return Err(SelectivityError::invalid_parameter("n_folds", 0, "must be at least 1"));
        }
        if self.n_permutations == 0 {
            return Err(SelectivityError::invalid_parameter("n_permutations", 0, "must be at least 1"));
        }
        if let Some(secs) = self.permutation_deadline_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(SelectivityError::invalid_parameter(
                    "permutation_deadline_secs",
                    secs,
                    "must be a positive number of seconds",
                ));
            }
        }
        if self.sampling_dates.is_empty() {
            return Err(SelectivityError::invalid_parameter(
                "sampling_dates",
                "{}",
                "at least one region needs a sampling date",
            ));
        }
        for raw in self.sampling_dates.values() {
            parse_datetime(raw)?;
        }
        Ok(())
    }

    /// Parsed sampling dates and window shape
    pub fn sampling_window(&self) -> crate::error::Result<SamplingWindow> {
        let sampling = self
            .sampling_dates
            .iter()
            .map(|(region, raw)| Ok((*region, parse_datetime(raw)?)))
            .collect::<crate::error::Result<BTreeMap<_, _>>>()?;

        Ok(SamplingWindow {
            sampling,
            span_hours: self.span_hours,
            explicit_start: self.start.clone(),
            explicit_end: self.end.clone(),
        })
    }

    /// The configured seed, or a fresh one (logged so the run can be repeated)
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::thread_rng().gen::<u64>();
                tracing::info!("No seed configured; using {}", seed);
                seed
            }
        }
    }

    pub fn estimate_config(&self, seed: u64) -> EstimateConfig {
        EstimateConfig {
            n_folds: self.n_folds,
            subsample_fraction: self.subsample_fraction,
            n_components: self.n_components,
            seed,
        }
    }

    /// Permutation seeds start after the fold seeds; trials replay the folds
    pub fn permutation_config(&self, seed: u64) -> PermutationConfig {
        PermutationConfig {
            n_permutations: self.n_permutations,
            seed: seed.wrapping_add(self.n_folds as u64),
            deadline: self.permutation_deadline_secs.map(Duration::from_secs_f64),
            resampling: self.estimate_config(seed),
        }
    }

    pub fn smoothing_config(&self) -> SmoothingConfig {
        SmoothingConfig {
            span: self.smoothing_span,
            iterations: self.smoothing_iterations,
        }
    }
}
