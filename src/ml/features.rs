use crate::structs::{CsvData, FeatureMatrix, LassoError, Result, Table};
use ndarray::Array2;
use std::path::Path;

/// Interpret one cell as a feature value. Empty cells are absent features.
fn parse_feature_cell(cell: &str) -> Option<f64> {
    match cell.trim() {
        "" => Some(0.0),
        "True" | "true" | "TRUE" => Some(1.0),
        "False" | "false" | "FALSE" => Some(0.0),
        other => other.parse::<f64>().ok(),
    }
}

/// How cells that are neither numbers nor booleans are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellPolicy {
    /// Reject with `Parse`
    Strict,
    /// Read as an absent feature
    Lenient,
}

fn build_matrix(
    names: Vec<String>,
    columns: &[usize],
    rows: &[Vec<String>],
    policy: CellPolicy,
) -> Result<FeatureMatrix> {
    let mut flat = Vec::with_capacity(rows.len() * columns.len());
    let mut skipped = 0usize;

    for (row_idx, row) in rows.iter().enumerate() {
        for (&col_idx, name) in columns.iter().zip(&names) {
            let cell = row.get(col_idx).map_or("", String::as_str);
            let value = match (parse_feature_cell(cell), policy) {
                (Some(value), _) => value,
                (None, CellPolicy::Lenient) => {
                    skipped += 1;
                    0.0
                }
                (None, CellPolicy::Strict) => {
                    return Err(LassoError::Parse(format!(
                        "row {}: feature '{name}' value '{cell}' is not numeric",
                        row_idx + 1
                    )));
                }
            };
            flat.push(value);
        }
    }

    if skipped > 0 {
        log::warn!("{skipped} non-numeric feature cells read as 0");
    }

    let data = Array2::from_shape_vec((rows.len(), columns.len()), flat)
        .map_err(|e| LassoError::Validation(format!("Failed to create feature array: {e}")))?;

    Ok(FeatureMatrix { names, data })
}

impl FeatureMatrix {
    /// Use every column of a CSV as a feature, one row per table row
    ///
    /// # Errors
    /// Returns error if the CSV has no columns or a cell is not numeric
    pub fn from_csv(csv: &CsvData) -> Result<Self> {
        if csv.headers.is_empty() {
            return Err(LassoError::Validation("Feature file has no columns".into()));
        }
        let columns: Vec<usize> = (0..csv.col_count()).collect();
        build_matrix(csv.headers.clone(), &columns, &csv.rows, CellPolicy::Strict)
    }

    /// Load a feature file and check it is row-aligned with `expected_rows`
    ///
    /// # Errors
    /// Returns error if the file cannot be parsed or has the wrong row count
    pub fn load_file(path: &Path, is_tsv: bool, expected_rows: usize) -> Result<Self> {
        let csv = CsvData::from_file(path, is_tsv)?;
        let features = Self::from_csv(&csv)?;
        if features.n_samples() != expected_rows {
            return Err(LassoError::Validation(format!(
                "Feature file {} has {} rows but the table has {expected_rows}",
                path.display(),
                features.n_samples()
            )));
        }
        log::info!(
            "Loaded {} features from {}",
            features.n_features(),
            path.display()
        );
        Ok(features)
    }

    /// Use the table's own columns whose names start with `prefix`.
    /// Cells that are not numbers or booleans count as 0.
    ///
    /// # Errors
    /// Returns `Validation` if no column matches
    pub fn from_table_columns(table: &Table, prefix: &str) -> Result<Self> {
        let columns: Vec<usize> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.starts_with(prefix))
            .map(|(i, _)| i)
            .collect();

        if columns.is_empty() {
            return Err(LassoError::Validation(format!(
                "No columns start with '{prefix}'"
            )));
        }

        let names = columns.iter().map(|&i| table.headers[i].clone()).collect();
        let rows: Vec<Vec<String>> = table.rows.iter().map(|r| r.cells.clone()).collect();
        build_matrix(names, &columns, &rows, CellPolicy::Lenient)
    }
}
