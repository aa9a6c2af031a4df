//! CSV input and all-or-nothing output for labelled tables

use crate::structs::{CsvData, FeatureScore, LassoError, Result, Table};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs::{File, Permissions};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const fn delimiter(is_tsv: bool) -> u8 {
    if is_tsv {
        b'\t'
    } else {
        b','
    }
}

impl CsvData {
    /// Parse a CSV or TSV file
    ///
    /// # Errors
    /// Returns `NotFound` if the file does not exist, `Parse` if it is not
    /// well-formed tabular data
    pub fn from_file(path: &Path, is_tsv: bool) -> Result<Self> {
        if !path.exists() {
            return Err(LassoError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Self::from_reader(file, is_tsv)
    }

    /// Parse CSV or TSV data from any reader
    ///
    /// Rows shorter than the header are padded with empty cells.
    ///
    /// # Errors
    /// Returns `Csv` if the input cannot be read as CSV, `Parse` if a row has
    /// more fields than the header
    pub fn from_reader<R: Read>(input: R, is_tsv: bool) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter(is_tsv))
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let record = result?;
            if record.len() > headers.len() {
                return Err(LassoError::Parse(format!(
                    "row {}: expected {} fields, saw {}",
                    i + 1,
                    headers.len(),
                    record.len()
                )));
            }
            let mut row: Vec<String> = record.iter().map(ToString::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }
}

/// Permissions for the saved file: those of the file being replaced, or the
/// usual `0644` for a new one
fn target_permissions(path: &Path) -> Option<Permissions> {
    std::fs::metadata(path)
        .map(|meta| meta.permissions())
        .ok()
        .or_else(default_permissions)
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
const fn default_permissions() -> Option<Permissions> {
    None
}

/// Write to a temporary file beside `path`, then rename it into place.
/// On failure the temporary file is removed and `path` is untouched.
fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = target_permissions(path) {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| LassoError::Io(e.error))?;
    Ok(())
}

/// Save the table as CSV. Empty labels are written as empty fields.
///
/// # Errors
/// Returns `Io` or `Csv` if the file cannot be written
pub fn save(table: &Table, path: &Path, is_tsv: bool) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter(is_tsv))
            .from_writer(file);

        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(&row.cells)?;
        }
        writer.flush()?;
        Ok(())
    })?;

    log::info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct RankingExport<'a> {
    selected_rows: usize,
    features: &'a [FeatureScore],
}

/// Write `ranking.json` style export of ranked features
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_ranking(path: &Path, selected_rows: usize, scores: &[FeatureScore]) -> Result<()> {
    let export = RankingExport {
        selected_rows,
        features: scores,
    };
    write_atomic(path, |file| {
        serde_json::to_writer_pretty(&mut *file, &export)?;
        file.write_all(b"\n")?;
        Ok(())
    })
}
