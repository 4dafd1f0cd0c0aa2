//! Selectivity Scorer - end-to-end pipeline coordinator
//!
//! Runs window → season → bin once per configuration, then for each taxon:
//! assemble → selectivity ratio → permutation test → compose.
//!
//! Binned features and the (optionally standardized) abundance table are
//! shared read-only, so taxa score independently. Both sequential and
//! parallel (Rayon) entry points are provided.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::time::Instant;

use crate::config::AnalysisConfig;
use crate::data::StudyData;
use crate::error::SelectivityError;
use crate::export;
use crate::features::{assemble, bin, AbundanceTable, FrequencyTable};
use crate::selectivity::{compose, estimate, p_values, SelectivityResult};
use crate::series::{filter_season, EnvironmentalSeries, RegionSeries};

/// Main selectivity scorer
pub struct SelectivityScorer {
    config: AnalysisConfig,
    frequency: FrequencyTable,
    /// Already standardized when `normalize_abundance` is set
    abundance: AbundanceTable,
    seed: u64,
}

/// Window, season-filter and bin an environmental series
pub fn prepare_features(config: &AnalysisConfig, environment: &EnvironmentalSeries) -> Result<FrequencyTable> {
    let windowed = config.sampling_window()?.apply(environment)?;
    let seasonal: Vec<RegionSeries> = windowed
        .iter()
        .map(|series| filter_season(series, config.season))
        .collect();

    if seasonal.iter().all(RegionSeries::is_empty) {
        return Err(SelectivityError::EmptyFilterResult {
            context: format!("no {} rows inside the sampling window", config.season),
        }
        .into());
    }

    Ok(bin(&seasonal, config.step, config.binning)?)
}

impl SelectivityScorer {
    /// Load inputs from the paths in `config` and prepare features
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let data = StudyData::load(&config)?;
        Self::new(config, data)
    }

    /// Prepare features for already loaded inputs
    ///
    /// The frequency table is written before any taxon is scored, so it
    /// survives later failures as diagnostic output.
    pub fn new(config: AnalysisConfig, data: StudyData) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            "Initializing selectivity scorer: {} / {} / {} binning, step {}",
            config.variable,
            config.season,
            config.binning,
            config.step
        );

        let frequency = prepare_features(&config, &data.environment)?;
        if let Some(dir) = &config.output_dir {
            export::write_frequency_table(&frequency, dir, config.variable, config.season)?;
        }

        let abundance = if config.normalize_abundance {
            data.abundance.standardized()
        } else {
            data.abundance
        };
        let seed = config.resolve_seed();

        Ok(Self {
            config,
            frequency,
            abundance,
            seed,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn frequency_table(&self) -> &FrequencyTable {
        &self.frequency
    }

    /// Seed shared by every taxon of this run
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Taxon identifiers in table order
    pub fn taxa(&self) -> &[String] {
        &self.abundance.ids
    }

    /// Score one taxon
    pub fn score_taxon(&self, taxon_id: &str) -> Result<SelectivityResult> {
        let start = Instant::now();

        let sample = assemble(&self.frequency, &self.abundance, taxon_id, false)?;
        let ratio = estimate(&sample.x, &sample.y, &self.config.estimate_config(self.seed))
            .with_context(|| format!("Selectivity ratio failed for taxon {}", taxon_id))?;
        let permutation = p_values(
            &sample.x,
            &sample.y,
            &ratio.signed,
            ratio.nlv,
            &self.config.permutation_config(self.seed),
        )
        .with_context(|| format!("Permutation test failed for taxon {}", taxon_id))?;

        let rows = compose(
            &ratio.signed,
            &permutation.p_values,
            &sample.labels,
            self.config.smoothing_config(),
            self.config.significance_threshold,
        )?;

        let result = SelectivityResult {
            taxon: taxon_id.to_string(),
            variable: self.config.variable,
            season: self.config.season,
            binning: self.config.binning,
            n_positions: sample.n_rows(),
            nlv: ratio.nlv,
            permutations_completed: permutation.completed,
            rows,
        };

        if let Some(dir) = &self.config.output_dir {
            export::write_result(&result, dir)?;
        }

        tracing::info!(
            "Scored taxon {} in {:.2?}: {} buckets, {} significant",
            taxon_id,
            start.elapsed(),
            result.rows.len(),
            result.significant_ranges().len()
        );
        Ok(result)
    }

    /// Score taxa one after another
    pub fn score_taxa(&self, taxon_ids: &[String]) -> Vec<(String, Result<SelectivityResult>)> {
        taxon_ids
            .iter()
            .map(|id| (id.clone(), self.score_taxon(id)))
            .collect()
    }

    /// Score taxa in parallel
    ///
    /// Each taxon only reads the shared features; fold and permutation loops
    /// inside nest on the same Rayon pool.
    pub fn score_taxa_parallel(&self, taxon_ids: &[String]) -> Vec<(String, Result<SelectivityResult>)> {
        taxon_ids
            .par_iter()
            .map(|id| (id.clone(), self.score_taxon(id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::test_support::hourly;
    use crate::series::{EnvVariable, PositionColumn, Region, Season, DATE_FORMAT};
    use std::collections::BTreeMap;

    fn small_study(season: Season) -> (AnalysisConfig, StudyData) {
        let timestamps = hourly(48);
        let columns = (0..4)
            .map(|p| {
                let values = (0..48).map(|h| Some(((h * (p + 1)) % 7) as f64)).collect();
                PositionColumn::tagged(&format!("E{}", p + 1), values).unwrap()
            })
            .collect();
        let environment = EnvironmentalSeries::new(EnvVariable::AirTemperature, timestamps.clone(), columns).unwrap();

        let abundance = AbundanceTable::new(
            "OTU",
            vec!["otu1".into(), "otu2".into()],
            vec!["E1".into(), "E2".into(), "E3".into(), "E4".into()],
            vec![
                vec![Some(1.0), Some(4.0), Some(2.0), Some(8.0)],
                vec![Some(3.0), Some(1.0), Some(5.0), Some(2.0)],
            ],
        )
        .unwrap();

        let mut dates = BTreeMap::new();
        dates.insert(Region::East, timestamps[47].format(DATE_FORMAT).to_string());
        let mut config = AnalysisConfig::new(EnvVariable::AirTemperature, "env.csv", "taxa.csv", dates);
        config.season = season;
        config.span_hours = 47;
        config.n_folds = 5;
        config.n_permutations = 10;
        config.subsample_fraction = 1.0;
        config.seed = Some(3);
        (config, StudyData { environment, abundance })
    }

    #[test]
    fn test_prepare_and_score() {
        let (config, data) = small_study(Season::All);
        let scorer = SelectivityScorer::new(config, data).unwrap();
        assert_eq!(scorer.frequency_table().n_rows(), 4);
        assert_eq!(scorer.seed(), 3);

        let result = scorer.score_taxon("otu1").unwrap();
        assert_eq!(result.permutations_completed, 10);
        assert!(result.rows.windows(2).all(|w| w[0].x < w[1].x));
        assert!(result.nlv <= 3);
    }

    #[test]
    fn test_wrong_season_is_empty() {
        // Hourly data starts 01.01.2020: nothing in summer
        let (config, data) = small_study(Season::Summer);
        let err = SelectivityScorer::new(config, data).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SelectivityError>(),
            Some(SelectivityError::EmptyFilterResult { .. })
        ));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (config, data) = small_study(Season::All);
        let scorer = SelectivityScorer::new(config, data).unwrap();
        let ids = scorer.taxa().to_vec();

        let sequential = scorer.score_taxa(&ids);
        let parallel = scorer.score_taxa_parallel(&ids);
        for ((id_a, a), (id_b, b)) in sequential.iter().zip(&parallel) {
            assert_eq!(id_a, id_b);
            let (a, b) = (a.as_ref().unwrap(), b.as_ref().unwrap());
            let pa: Vec<f64> = a.rows.iter().map(|r| r.p_val).collect();
            let pb: Vec<f64> = b.rows.iter().map(|r| r.p_val).collect();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_unknown_taxon() {
        let (config, data) = small_study(Season::All);
        let scorer = SelectivityScorer::new(config, data).unwrap();
        let err = scorer.score_taxon("otu9").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SelectivityError>(),
            Some(SelectivityError::UnknownIdentifier { .. })
        ));
    }
}
