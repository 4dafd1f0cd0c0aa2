//! Data Assembler
//!
//! Joins binned environmental features with one taxon's abundance per
//! position into a dense feature matrix and response vector.
//!
//! Order of operations:
//! 1. Optionally z-score the abundance table column-wise over taxa (numeric
//!    columns only; the id column is untouched). Works on a copy.
//! 2. Select exactly one row for the taxon id.
//! 3. Check the row length against the distinct frequency-table positions.
//! 4. Inner join on position name, drop rows with missing values.
//! 5. Drop feature columns that are constant across the joined rows.

use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;

use super::binning::FrequencyTable;
use crate::error::{Result, SelectivityError};
use crate::utils::normalization::zscore_optional;

/// Taxon abundances: one row per taxon, one numeric column per position
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceTable {
    /// Name of the identifier column (e.g. `OTU`)
    pub id_column: String,
    /// Identifier per row
    pub ids: Vec<String>,
    /// Numeric position columns, in table order
    pub positions: Vec<String>,
    /// `values[row][position]`
    pub values: Vec<Vec<Option<f64>>>,
}

impl AbundanceTable {
    pub fn new(
        id_column: &str,
        ids: Vec<String>,
        positions: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if values.len() != ids.len() {
            return Err(SelectivityError::ShapeMismatch {
                context: "abundance rows vs identifiers".to_string(),
                expected: ids.len(),
                found: values.len(),
            });
        }
        if let Some((i, row)) = values.iter().enumerate().find(|(_, r)| r.len() != positions.len()) {
            return Err(SelectivityError::ShapeMismatch {
                context: format!("abundance row '{}'", ids[i]),
                expected: positions.len(),
                found: row.len(),
            });
        }
        Ok(Self {
            id_column: id_column.to_string(),
            ids,
            positions,
            values,
        })
    }

    /// Copy with every position column z-scored across taxa (sample std)
    pub fn standardized(&self) -> AbundanceTable {
        let mut values = self.values.clone();
        for j in 0..self.positions.len() {
            let column: Vec<Option<f64>> = self.values.iter().map(|row| row[j]).collect();
            for (row, z) in values.iter_mut().zip(zscore_optional(&column, 1)) {
                row[j] = z;
            }
        }
        AbundanceTable {
            id_column: self.id_column.clone(),
            ids: self.ids.clone(),
            positions: self.positions.clone(),
            values,
        }
    }

    /// The single row for `id`
    pub fn row(&self, id: &str) -> Result<&[Option<f64>]> {
        let matches: Vec<usize> = self
            .ids
            .iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.as_str() == id)
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => Err(SelectivityError::UnknownIdentifier {
                id: id.to_string(),
                column: self.id_column.clone(),
            }),
            [single] => Ok(&self.values[*single]),
            many => Err(SelectivityError::AmbiguousIdentifier {
                id: id.to_string(),
                column: self.id_column.clone(),
                count: many.len(),
            }),
        }
    }
}

/// Joined, cleaned design for one taxon
#[derive(Debug, Clone)]
pub struct JoinedSample {
    pub taxon: String,
    /// Position names, row order of `x`/`y`
    pub positions: Vec<String>,
    /// Bucket labels of the retained feature columns
    pub labels: Vec<f64>,
    /// Occurrence counts, positions × retained features
    pub x: DMatrix<f64>,
    /// Abundance per position
    pub y: DVector<f64>,
    /// Labels removed as constant
    pub dropped_labels: Vec<f64>,
}

impl JoinedSample {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

/// Join a frequency table with one taxon's abundance row
pub fn assemble(
    frequency: &FrequencyTable,
    abundance: &AbundanceTable,
    taxon_id: &str,
    normalize: bool,
) -> Result<JoinedSample> {
    let standardized;
    let table = if normalize {
        standardized = abundance.standardized();
        &standardized
    } else {
        abundance
    };

    let row = table.row(taxon_id)?;

    let n_positions = frequency.n_distinct_positions();
    if row.len() != n_positions {
        return Err(SelectivityError::ShapeMismatch {
            context: format!("abundance values of taxon '{taxon_id}' vs frequency-table positions"),
            expected: n_positions,
            found: row.len(),
        });
    }

    let by_name: FxHashMap<&str, Option<f64>> = table
        .positions
        .iter()
        .map(String::as_str)
        .zip(row.iter().copied())
        .collect();

    // Inner join on position name; rows with a missing response are dropped
    let mut positions = Vec::new();
    let mut rows: Vec<&[u32]> = Vec::new();
    let mut response = Vec::new();
    for (name, counts) in frequency.positions.iter().zip(&frequency.counts) {
        match by_name.get(name.as_str()) {
            Some(Some(value)) if value.is_finite() => {
                positions.push(name.clone());
                rows.push(counts);
                response.push(*value);
            }
            Some(_) => tracing::warn!("Dropping position {} for taxon {}: missing abundance", name, taxon_id),
            None => tracing::debug!("Position {} has no abundance column", name),
        }
    }

    if positions.is_empty() {
        return Err(SelectivityError::EmptyFilterResult {
            context: format!("no positions shared between frequency table and taxon '{taxon_id}'"),
        });
    }

    // Zero-variance removal
    let mut kept = Vec::new();
    let mut dropped_labels = Vec::new();
    for (j, label) in frequency.labels.iter().enumerate() {
        let first = rows[0][j];
        if rows.iter().all(|r| r[j] == first) {
            dropped_labels.push(*label);
        } else {
            kept.push(j);
        }
    }

    if kept.is_empty() {
        return Err(SelectivityError::NoInformativeFeatures {
            n_columns: frequency.n_columns(),
            n_rows: positions.len(),
        });
    }

    let x = DMatrix::from_fn(rows.len(), kept.len(), |i, k| rows[i][kept[k]] as f64);
    let labels = kept.iter().map(|&j| frequency.labels[j]).collect();

    tracing::info!(
        "Assembled taxon {}: {} positions × {} features ({} constant dropped)",
        taxon_id,
        positions.len(),
        kept.len(),
        dropped_labels.len()
    );

    Ok(JoinedSample {
        taxon: taxon_id.to_string(),
        positions,
        labels,
        x,
        y: DVector::from_vec(response),
        dropped_labels,
    })
}
