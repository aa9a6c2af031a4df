//! In-memory labelled table and its derived columns

use crate::structs::{
    ColourStrategy, CsvData, FeatureMatrix, LabelStatistics, LassoError, Result, Row, SizeSpec,
    Table, TableOptions, DEFAULT_POINT_SIZE, LABEL_COLUMN,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Cell values read as a missing label
const NULL_TOKENS: &[&str] = &["NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>"];

fn normalize_label(cell: &str) -> String {
    if NULL_TOKENS.contains(&cell) {
        String::new()
    } else {
        cell.to_string()
    }
}

fn parse_coordinate(cell: &str, column: &str, row: usize) -> Result<f64> {
    cell.trim().parse::<f64>().map_err(|_| {
        LassoError::Parse(format!(
            "row {}: column '{column}' value '{cell}' is not a number",
            row + 1
        ))
    })
}

fn require_column(headers: &[String], column: &str, purpose: &str) -> Result<usize> {
    headers.iter().position(|h| h == column).ok_or_else(|| {
        LassoError::Validation(format!("{purpose} column '{column}' not found"))
    })
}

/// Derive the display category for a row
fn project(strategy: &ColourStrategy, row: &Row, column: Option<usize>) -> String {
    let cell = column
        .and_then(|i| row.cells.get(i))
        .map_or("", String::as_str);

    match strategy {
        ColourStrategy::Label => {
            if row.label.is_empty() {
                "unlabelled".to_string()
            } else {
                row.label.clone()
            }
        }
        ColourStrategy::Class { .. } => {
            if !row.label.is_empty() {
                row.label.clone()
            } else if cell.is_empty() {
                "noclass".to_string()
            } else {
                "withclass".to_string()
            }
        }
        ColourStrategy::Column { .. } => {
            if cell.is_empty() {
                "nocolour".to_string()
            } else {
                cell.to_string()
            }
        }
        ColourStrategy::Highlight => {
            if row.highlighted {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
    }
}

fn derive_size(spec: Option<&SizeSpec>, row: &Row, column: Option<usize>) -> f64 {
    match (spec, column) {
        (Some(spec), Some(i)) => {
            let value = row
                .cells
                .get(i)
                .and_then(|c| c.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            value.max(spec.min_size)
        }
        _ => DEFAULT_POINT_SIZE,
    }
}

impl Table {
    /// Load a table from a CSV or TSV file
    ///
    /// # Errors
    /// Returns `NotFound`, `Parse` or `Validation` errors
    pub fn load_file(path: &Path, options: &TableOptions) -> Result<Self> {
        let csv = CsvData::from_file(path, options.tsv)?;
        log::info!(
            "Loaded {} rows x {} columns from {}",
            csv.row_count(),
            csv.col_count(),
            path.display()
        );
        Self::from_csv(csv, options)
    }

    /// Build a table from parsed CSV, validating required columns and
    /// ensuring a label column exists
    ///
    /// # Errors
    /// Returns `Validation` if required or configured columns are missing,
    /// `Parse` if a coordinate is not a number
    pub fn from_csv(csv: CsvData, options: &TableOptions) -> Result<Self> {
        let CsvData { mut headers, rows } = csv;
        let mapping = &options.columns;

        let missing: Vec<&str> = [&mapping.name, &mapping.x, &mapping.y]
            .into_iter()
            .filter(|c| !headers.contains(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(LassoError::Validation(format!(
                "Missing required columns: {}. CSV file must contain '{}', '{}', and '{}' columns.",
                missing.join(", "),
                mapping.name,
                mapping.x,
                mapping.y
            )));
        }

        if let Some(column) = options.colour.column() {
            require_column(&headers, column, "Colour")?;
        }
        if let Some(size) = &options.size {
            require_column(&headers, &size.column, "Size")?;
        }

        let name_idx = require_column(&headers, &mapping.name, "Name")?;
        let x_idx = require_column(&headers, &mapping.x, "X")?;
        let y_idx = require_column(&headers, &mapping.y, "Y")?;

        let label_index = match headers.iter().position(|h| h == LABEL_COLUMN) {
            Some(i) => i,
            None => {
                headers.push(LABEL_COLUMN.to_string());
                headers.len() - 1
            }
        };

        let mut table_rows = Vec::with_capacity(rows.len());
        for (i, mut cells) in rows.into_iter().enumerate() {
            cells.resize(headers.len(), String::new());
            let label = normalize_label(&cells[label_index]);
            cells[label_index].clone_from(&label);

            table_rows.push(Row {
                name: cells[name_idx].clone(),
                x: parse_coordinate(&cells[x_idx], &mapping.x, i)?,
                y: parse_coordinate(&cells[y_idx], &mapping.y, i)?,
                label,
                category: String::new(),
                size: DEFAULT_POINT_SIZE,
                highlighted: false,
                cells,
            });
        }

        let mut table = Self {
            headers,
            rows: table_rows,
            label_index,
            colour: options.colour.clone(),
            size: options.size.clone(),
        };
        table.rederive_all();
        Ok(table)
    }

    /// Compute labelling statistics. An empty table reports 0% unlabelled.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> LabelStatistics {
        let mut unlabeled = 0usize;
        let mut labels = BTreeSet::new();
        for row in &self.rows {
            if row.label.is_empty() {
                unlabeled += 1;
            } else if !labels.contains(&row.label) {
                labels.insert(row.label.clone());
            }
        }

        let unlabeled_percentage = if self.rows.is_empty() {
            0.0
        } else {
            100.0 * unlabeled as f64 / self.rows.len() as f64
        };

        LabelStatistics {
            unlabeled_percentage,
            labels,
        }
    }

    /// Set the label of one row and re-derive its category.
    /// Caller guarantees `index` is in range.
    /// Null tokens are stored as the empty label, as they would read back
    pub(crate) fn set_label(&mut self, index: usize, label: &str) {
        let label = normalize_label(label);
        let column = self.colour_column();
        let row = &mut self.rows[index];
        row.cells[self.label_index].clone_from(&label);
        row.label = label;
        row.category = project(&self.colour, row, column);
    }

    fn colour_column(&self) -> Option<usize> {
        self.colour.column().and_then(|c| self.column_index(c))
    }

    /// Recompute category and size for every row
    fn rederive_all(&mut self) {
        let colour_column = self.colour_column();
        let size_column = self
            .size
            .as_ref()
            .and_then(|s| self.column_index(&s.column));

        for row in &mut self.rows {
            row.category = project(&self.colour, row, colour_column);
            row.size = derive_size(self.size.as_ref(), row, size_column);
        }
    }

    /// Switch the colour strategy and re-derive every category
    ///
    /// # Errors
    /// Returns `Validation` if the strategy names an unknown column
    pub fn set_colour(&mut self, strategy: ColourStrategy) -> Result<()> {
        if let Some(column) = strategy.column() {
            require_column(&self.headers, column, "Colour")?;
        }
        self.colour = strategy;
        self.rederive_all();
        Ok(())
    }

    /// Highlight rows where any of the named features is present, and colour
    /// by the highlight. Returns the number of highlighted rows.
    ///
    /// # Errors
    /// Returns `Validation` for unknown feature names or a matrix that is not
    /// aligned with the table
    pub fn highlight_features(&mut self, features: &FeatureMatrix, names: &[String]) -> Result<usize> {
        if features.n_samples() != self.len() {
            return Err(LassoError::Validation(format!(
                "Feature matrix has {} rows but table has {}",
                features.n_samples(),
                self.len()
            )));
        }

        let indices = names
            .iter()
            .map(|name| {
                features.feature_index(name).ok_or_else(|| {
                    LassoError::Validation(format!("Unknown feature: {name}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut count = 0;
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.highlighted = indices.iter().any(|&j| features.data[[i, j]] > 0.0);
            if row.highlighted {
                count += 1;
            }
        }

        self.colour = ColourStrategy::Highlight;
        self.rederive_all();
        Ok(count)
    }
}

/// Output path for labelled data: `<stem>_labelled.csv` beside the input
#[must_use]
pub fn labelled_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_labelled.csv"))
}
