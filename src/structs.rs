//! Consolidated public types for the labellasso crate
//!
//! This module contains all public structs, enums, and traits used across the crate.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum LassoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Error in input data: {0}")]
    Validation(String),

    #[error("Failed to parse CSV file: {0}")]
    Parse(String),

    #[error("Row index {index} out of range for table of {len} rows")]
    Index { index: usize, len: usize },

    #[error("Server error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LassoError>;

// ============================================================================
// CSV Types
// ============================================================================

/// Name of the column holding user-assigned labels
pub const LABEL_COLUMN: &str = "label";

/// Represents a parsed CSV/TSV file with headers and rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData {
    /// Get number of rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get number of columns
    #[must_use]
    pub fn col_count(&self) -> usize {
        self.headers.len()
    }
}

// ============================================================================
// Table Types
// ============================================================================

/// Which input columns supply the point name and coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub name: String,
    pub x: String,
    pub y: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            x: "x".to_string(),
            y: "y".to_string(),
        }
    }
}

/// How the display category of a row is derived
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ColourStrategy {
    /// The label itself, `unlabelled` when empty
    #[default]
    Label,
    /// The label when present, otherwise `withclass` / `noclass`
    Class { column: String },
    /// The raw value of a passthrough column, `nocolour` when empty
    Column { column: String },
    /// `True` / `False` from the feature highlight
    Highlight,
}

impl ColourStrategy {
    /// The passthrough column this strategy reads, if any
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Class { column } | Self::Column { column } => Some(column),
            Self::Label | Self::Highlight => None,
        }
    }
}

/// Point size derived from a frequency column
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSpec {
    pub column: String,
    pub min_size: f64,
}

/// Size used for every point when no size column is configured
pub const DEFAULT_POINT_SIZE: f64 = 10.0;

/// Floor applied to sizes derived from a frequency column
pub const DEFAULT_MIN_SIZE: f64 = 4.0;

/// Options controlling how a table is built from CSV
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableOptions {
    pub columns: ColumnMapping,
    pub colour: ColourStrategy,
    pub size: Option<SizeSpec>,
    pub tsv: bool,
}

/// One data point
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Empty string means unlabelled
    pub label: String,
    /// Display category, always derived
    pub category: String,
    pub size: f64,
    pub highlighted: bool,
    /// Raw cells aligned with `Table::headers`
    pub cells: Vec<String>,
}

/// The labelled dataset. Row count is fixed after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub(crate) label_index: usize,
    pub(crate) colour: ColourStrategy,
    pub(crate) size: Option<SizeSpec>,
}

impl Table {
    /// Get number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[allow(dead_code)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column index by name
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Labels in row order
    #[allow(dead_code)]
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    #[must_use]
    pub fn colour_strategy(&self) -> &ColourStrategy {
        &self.colour
    }

    /// Coordinates in row order, for polygon tests
    #[must_use]
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.rows.iter().map(|r| (r.x, r.y)).collect()
    }
}

/// Summary of labelling progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStatistics {
    pub unlabeled_percentage: f64,
    pub labels: BTreeSet<String>,
}

/// Prefix of the plot title
pub const TITLE_PREFIX: &str = "Scatter plot lasso labeller";

impl LabelStatistics {
    #[must_use]
    pub fn labeled_percentage(&self) -> f64 {
        100.0 - self.unlabeled_percentage
    }

    /// Plot title describing progress
    #[must_use]
    pub fn title(&self) -> String {
        title_for(self.unlabeled_percentage)
    }
}

/// Format the plot title for a given unlabelled percentage
#[must_use]
pub fn title_for(unlabeled_percentage: f64) -> String {
    format!(
        "{TITLE_PREFIX}, labeled: {:.1}%",
        100.0 - unlabeled_percentage
    )
}

// ============================================================================
// ML Types
// ============================================================================

/// Numeric features aligned by row index with a `Table`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Feature names (column headers)
    pub names: Vec<String>,
    /// `n_samples x n_features`
    pub data: Array2<f64>,
}

impl FeatureMatrix {
    /// Get number of samples (rows)
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Get number of features (columns)
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Get feature index by name
    #[must_use]
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// 2x2 contingency counts of cluster membership against feature presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Contingency {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

/// A feature's correlation with a selected cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureScore {
    pub index: usize,
    pub name: String,
    pub counts: Contingency,
    /// `None` when the contingency table is degenerate
    pub mcc: Option<f64>,
}

// ============================================================================
// Notification Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Warning,
    Error,
}

/// One-way message to the display layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Notification {
    Title { text: String },
    Toast { message: String, level: ToastLevel },
}

/// Receiver of display notifications. Fire-and-forget.
pub trait Notifier {
    fn notify_title(&mut self, text: &str);

    fn notify_toast(&mut self, message: &str, level: ToastLevel);
}

/// Notifier that queues messages for later delivery
#[derive(Debug, Default)]
pub struct NotificationLog {
    pending: Vec<Notification>,
}

impl NotificationLog {
    /// Take all queued notifications
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}

impl Notifier for NotificationLog {
    fn notify_title(&mut self, text: &str) {
        self.pending.push(Notification::Title {
            text: text.to_string(),
        });
    }

    fn notify_toast(&mut self, message: &str, level: ToastLevel) {
        self.pending.push(Notification::Toast {
            message: message.to_string(),
            level,
        });
    }
}
