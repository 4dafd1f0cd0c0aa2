//! Data Loading
//!
//! Reads the two input tables with Polars and converts them into the typed
//! series and abundance structures the pipeline works on.
//!
//! - Environmental CSV: `datetime` (`dd.mm.yyyy HH:MM`) then one numeric
//!   column per position. Every position is tagged east/west here, once.
//! - Taxon CSV: identifier column plus one numeric column per position.

use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;

use crate::config::AnalysisConfig;
use crate::features::AbundanceTable;
use crate::series::{parse_datetime, EnvVariable, EnvironmentalSeries, PositionColumn};
use crate::utils::frame_helpers::{float_column, numeric_column_names, read_csv, require_columns, string_column};

/// Name of the timestamp column in environmental tables
pub const DATETIME_COLUMN: &str = "datetime";

/// Both inputs of one analysis
pub struct StudyData {
    /// Environmental series of the configured variable
    pub environment: EnvironmentalSeries,

    /// Taxon abundance per position
    pub abundance: AbundanceTable,
}

impl StudyData {
    /// Load the environmental and taxon tables named in `config`
    pub fn load(config: &AnalysisConfig) -> Result<Self> {
        let environment = load_environment(&config.environment_path, config.variable)?;
        let abundance = load_abundance(&config.taxa_path, &config.taxon_id_column)?;

        tracing::info!(
            "Loaded {} series: {} rows × {} positions; {} taxa × {} positions",
            environment.variable,
            environment.timestamps.len(),
            environment.columns.len(),
            abundance.ids.len(),
            abundance.positions.len()
        );

        Ok(Self { environment, abundance })
    }
}

/// Load an environmental series CSV
pub fn load_environment(path: &Path, variable: EnvVariable) -> Result<EnvironmentalSeries> {
    let df = read_csv(path, "environment")?;
    environment_from_frame(&df, variable)
        .with_context(|| format!("Invalid environmental table: {}", path.display()))
}

/// Convert a loaded environmental frame
pub fn environment_from_frame(df: &DataFrame, variable: EnvVariable) -> Result<EnvironmentalSeries> {
    require_columns(df, &[DATETIME_COLUMN], "environment")?;

    let timestamps = string_column(df, DATETIME_COLUMN, "environment")?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let value = value.with_context(|| format!("Missing datetime at row {}", row))?;
            Ok(parse_datetime(&value)?)
        })
        .collect::<Result<Vec<_>>>()?;

    let names = numeric_column_names(df, &[DATETIME_COLUMN]);
    let skipped = df.width().saturating_sub(names.len() + 1);
    if skipped > 0 {
        tracing::warn!("Ignoring {} non-numeric column(s) in environmental table", skipped);
    }

    let columns = names
        .iter()
        .map(|name| {
            let values = float_column(df, name, "environment")?;
            Ok(PositionColumn::tagged(name, values)?)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EnvironmentalSeries::new(variable, timestamps, columns)?)
}

/// Load a taxon abundance CSV
pub fn load_abundance(path: &Path, id_column: &str) -> Result<AbundanceTable> {
    let df = read_csv(path, "taxa")?;
    abundance_from_frame(&df, id_column)
        .with_context(|| format!("Invalid taxon table: {}", path.display()))
}

/// Convert a loaded taxon frame
///
/// Non-numeric columns other than the identifier are carried by the file
/// but not used.
pub fn abundance_from_frame(df: &DataFrame, id_column: &str) -> Result<AbundanceTable> {
    require_columns(df, &[id_column], "taxa")?;

    let ids = string_column(df, id_column, "taxa")?
        .into_iter()
        .enumerate()
        .map(|(row, id)| id.with_context(|| format!("Missing {} at row {}", id_column, row)))
        .collect::<Result<Vec<_>>>()?;

    let positions = numeric_column_names(df, &[id_column]);
    let columns = positions
        .iter()
        .map(|name| float_column(df, name, "taxa"))
        .collect::<Result<Vec<_>>>()?;

    let values = (0..ids.len())
        .map(|row| columns.iter().map(|c| c[row]).collect())
        .collect();

    Ok(AbundanceTable::new(id_column, ids, positions, values)?)
}
