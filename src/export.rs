//! CSV export of frequency tables and selectivity results
//!
//! File names:
//! - `frequency_<variable>_<season>.csv`: `position`, then one column per
//!   bucket label
//! - `selectivity_<variable>_<season>_<taxon>.csv`: one row per bucket

use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::features::FrequencyTable;
use crate::selectivity::SelectivityResult;
use crate::series::{EnvVariable, Season};

/// Column header for a bucket label
pub fn label_name(label: f64) -> String {
    format!("{}", label)
}

/// Frequency table as a DataFrame
pub fn frequency_frame(table: &FrequencyTable) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.n_columns() + 1);
    columns.push(Column::new("position".into(), &table.positions));
    for (j, label) in table.labels.iter().enumerate() {
        let counts: Vec<u32> = table.counts.iter().map(|row| row[j]).collect();
        columns.push(Column::new(label_name(*label).into(), counts));
    }
    DataFrame::new(columns).context("Failed to build frequency DataFrame")
}

/// Result rows as a DataFrame
pub fn result_frame(result: &SelectivityResult) -> Result<DataFrame> {
    let rows = &result.rows;
    let float = |name: &str, f: fn(&crate::selectivity::SelectivityRow) -> f64| {
        Column::new(name.into(), rows.iter().map(f).collect::<Vec<f64>>())
    };

    DataFrame::new(vec![
        float("x", |r| r.x),
        float("sel_ratio", |r| r.sel_ratio),
        float("p_val", |r| r.p_val),
        Column::new("significance".into(), rows.iter().map(|r| r.significance).collect::<Vec<bool>>()),
        float("sel_ratio_smooth", |r| r.sel_ratio_smooth),
        float("explained_var", |r| r.explained_var),
        float("explained_var_smooth", |r| r.explained_var_smooth),
    ])
    .context("Failed to build result DataFrame")
}

fn write_frame(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let mut file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {}", path.display()))
}

/// Path of the frequency table for a variable and season
pub fn frequency_path(dir: &Path, variable: EnvVariable, season: Season) -> PathBuf {
    dir.join(format!("frequency_{}_{}.csv", variable.code(), season.name()))
}

/// Path of the result table for one taxon
pub fn result_path(dir: &Path, variable: EnvVariable, season: Season, taxon: &str) -> PathBuf {
    let taxon: String = taxon
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    dir.join(format!("selectivity_{}_{}_{}.csv", variable.code(), season.name(), taxon))
}

/// Write a frequency table; returns the file path
pub fn write_frequency_table(
    table: &FrequencyTable,
    dir: &Path,
    variable: EnvVariable,
    season: Season,
) -> Result<PathBuf> {
    let path = frequency_path(dir, variable, season);
    let mut df = frequency_frame(table)?;
    write_frame(&mut df, &path)?;
    tracing::info!("Wrote frequency table {}", path.display());
    Ok(path)
}

/// Write a selectivity result; returns the file path
pub fn write_result(result: &SelectivityResult, dir: &Path) -> Result<PathBuf> {
    let path = result_path(dir, result.variable, result.season, &result.taxon);
    let mut df = result_frame(result)?;
    write_frame(&mut df, &path)?;
    tracing::info!("Wrote selectivity result {}", path.display());
    Ok(path)
}
