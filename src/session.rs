//! A single labelling session: one table, one writer

use crate::binder::apply_label;
use crate::geometry::Lasso;
use crate::ml::correlation::{membership_from_indices, rank_features};
use crate::persist;
use crate::structs::{
    ColourStrategy, FeatureMatrix, FeatureScore, LabelStatistics, LassoError, Notification,
    NotificationLog, Notifier, Result, Table, TableOptions, ToastLevel,
};
use crate::table::labelled_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where ranking features come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureSource {
    #[default]
    None,
    /// Separate CSV, row-aligned with the table
    File(PathBuf),
    /// Table columns whose names start with the prefix
    Prefix(String),
}

/// Configuration for opening a session
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub input: PathBuf,
    pub table: TableOptions,
    pub features: FeatureSource,
    /// Defaults to `<stem>_labelled.csv` beside the input
    pub output: Option<PathBuf>,
}

/// Load the feature matrix for a table
///
/// # Errors
/// Returns error if the feature file or columns cannot be read
pub fn load_features(
    source: &FeatureSource,
    table: &Table,
    is_tsv: bool,
) -> Result<Option<FeatureMatrix>> {
    match source {
        FeatureSource::None => Ok(None),
        FeatureSource::File(path) => {
            FeatureMatrix::load_file(path, is_tsv, table.len()).map(Some)
        }
        FeatureSource::Prefix(prefix) => FeatureMatrix::from_table_columns(table, prefix).map(Some),
    }
}

/// Immutable inputs for a ranking run, taken while the session is locked
#[derive(Debug, Clone)]
pub struct RankingSnapshot {
    membership: Vec<bool>,
    features: Arc<FeatureMatrix>,
}

impl RankingSnapshot {
    #[must_use]
    pub fn selected_rows(&self) -> usize {
        self.membership.iter().filter(|&&m| m).count()
    }

    /// # Errors
    /// Returns error if membership and features are misaligned
    pub fn run(&self, k: usize) -> Result<Vec<FeatureScore>> {
        rank_features(&self.membership, &self.features, k)
    }
}

/// A copy of the table to write, independent of later edits
#[derive(Debug, Clone)]
pub struct SaveJob {
    table: Table,
    path: PathBuf,
    tsv: bool,
}

impl SaveJob {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    /// Returns `Io` if the file cannot be written
    pub fn run(&self) -> Result<()> {
        persist::save(&self.table, &self.path, self.tsv)
    }
}

pub struct Session {
    table: Table,
    output_path: PathBuf,
    features: Option<Arc<FeatureMatrix>>,
    selection: Vec<usize>,
    notifications: NotificationLog,
    tsv: bool,
}

impl Session {
    #[must_use]
    pub fn new(
        table: Table,
        output_path: PathBuf,
        features: Option<FeatureMatrix>,
        tsv: bool,
    ) -> Self {
        Self {
            table,
            output_path,
            features: features.map(Arc::new),
            selection: Vec::new(),
            notifications: NotificationLog::default(),
            tsv,
        }
    }

    /// Load the table and features named by `config`
    ///
    /// # Errors
    /// Returns startup errors: missing file, parse or validation failures
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let table = Table::load_file(&config.input, &config.table)?;
        let features = load_features(&config.features, &table, config.table.tsv)?;
        let output_path = config
            .output
            .clone()
            .unwrap_or_else(|| labelled_path(&config.input));

        Ok(Self::new(table, output_path, features, config.table.tsv))
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub fn has_features(&self) -> bool {
        self.features.is_some()
    }

    #[must_use]
    pub fn selection(&self) -> &[usize] {
        &self.selection
    }

    #[must_use]
    pub fn statistics(&self) -> LabelStatistics {
        self.table.statistics()
    }

    /// Replace the current selection with the points inside `lasso`
    pub fn select(&mut self, lasso: &Lasso) -> &[usize] {
        self.selection = lasso.select(&self.table.points());
        &self.selection
    }

    /// Label the given rows, or the current selection when `indices` is `None`
    ///
    /// # Errors
    /// Returns `Index` if an index is out of range; the table is unchanged
    pub fn label(
        &mut self,
        indices: Option<&[usize]>,
        label: &str,
    ) -> Result<Option<LabelStatistics>> {
        let indices = indices.unwrap_or(&self.selection);
        apply_label(&mut self.table, indices, label, &mut self.notifications)
    }

    /// # Errors
    /// Returns `Validation` if the strategy names an unknown column
    pub fn set_colour(&mut self, strategy: ColourStrategy) -> Result<()> {
        self.table.set_colour(strategy)
    }

    /// Colour rows by whether they carry any of the named features
    ///
    /// # Errors
    /// Returns `Config` when no feature matrix is loaded, `Validation` for
    /// unknown names
    pub fn highlight(&mut self, names: &[String]) -> Result<usize> {
        let features = self
            .features
            .as_ref()
            .ok_or_else(|| LassoError::Config("No feature matrix loaded".into()))?;
        self.table.highlight_features(features, names)
    }

    /// Snapshot membership and features for ranking outside the lock.
    /// An empty selection still ranks, with a warning toast.
    ///
    /// # Errors
    /// Returns `Config` when no feature matrix is loaded, `Index` for bad
    /// indices
    pub fn ranking_snapshot(&mut self, indices: Option<&[usize]>) -> Result<RankingSnapshot> {
        let features = self
            .features
            .clone()
            .ok_or_else(|| LassoError::Config("No feature matrix loaded".into()))?;
        let indices = indices.unwrap_or(&self.selection);
        let membership = membership_from_indices(self.table.len(), indices)?;
        let snapshot = RankingSnapshot {
            membership,
            features,
        };
        if snapshot.selected_rows() == 0 {
            self.notifications.notify_toast(
                "No points selected, every feature score is undefined",
                ToastLevel::Warning,
            );
        }
        Ok(snapshot)
    }

    #[must_use]
    pub fn save_job(&self) -> SaveJob {
        SaveJob {
            table: self.table.clone(),
            path: self.output_path.clone(),
            tsv: self.tsv,
        }
    }

    /// Turn a save outcome into a toast. Failures do not end the session.
    pub fn report_save(&mut self, path: &Path, outcome: &Result<()>) {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match outcome {
            Ok(()) => self
                .notifications
                .notify_toast(&format!("Data saved to {name}"), ToastLevel::Success),
            Err(e) => {
                log::warn!("Save to {} failed: {e}", path.display());
                self.notifications
                    .notify_toast(&format!("Error saving data: {e}"), ToastLevel::Error);
            }
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::CsvData;
    use tempfile::tempdir;

    fn sample_session(output: PathBuf) -> Session {
        let content = "name,x,y,has-a,has-b\n\
                       p1,0.1,0.1,True,False\n\
                       p2,0.2,0.8,True,True\n\
                       p3,5.0,5.0,False,True\n\
                       p4,6.0,5.5,False,False\n";
        let csv = CsvData::from_reader(content.as_bytes(), false).expect("parse");
        let table = Table::from_csv(csv, &TableOptions::default()).expect("table");
        let features = load_features(&FeatureSource::Prefix("has-".into()), &table, false)
            .expect("features");
        Session::new(table, output, features, false)
    }

    fn square() -> Lasso {
        Lasso::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
    }

    #[test]
    fn test_select_then_label() {
        let mut session = sample_session(PathBuf::from("unused.csv"));

        assert_eq!(session.select(&square()), &[0, 1]);
        let stats = session.label(None, "cluster").expect("label").expect("stats");

        assert!((stats.unlabeled_percentage - 50.0).abs() < 1e-9);
        assert_eq!(session.table().labels(), vec!["cluster", "cluster", "", ""]);
        assert_eq!(
            session.drain_notifications(),
            vec![Notification::Title {
                text: "Scatter plot lasso labeller, labeled: 50.0%".into()
            }]
        );
    }

    #[test]
    fn test_rank_selection() {
        let mut session = sample_session(PathBuf::from("unused.csv"));
        session.select(&square());

        let snapshot = session.ranking_snapshot(None).expect("snapshot");
        assert_eq!(snapshot.selected_rows(), 2);
        let ranked = snapshot.run(5).expect("rank");

        assert_eq!(ranked[0].name, "has-a");
        assert!((ranked[0].mcc.expect("defined") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_without_features() {
        let content = "name,x,y\na,1,1\n";
        let csv = CsvData::from_reader(content.as_bytes(), false).expect("parse");
        let table = Table::from_csv(csv, &TableOptions::default()).expect("table");
        let mut session = Session::new(table, PathBuf::from("unused.csv"), None, false);

        assert!(matches!(
            session.ranking_snapshot(Some([0].as_slice())),
            Err(LassoError::Config(_))
        ));
    }

    #[test]
    fn test_rank_empty_selection_warns() {
        let mut session = sample_session(PathBuf::from("unused.csv"));

        let snapshot = session.ranking_snapshot(None).expect("snapshot");
        assert_eq!(snapshot.selected_rows(), 0);
        assert!(snapshot.run(5).expect("rank").iter().all(|s| s.mcc.is_none()));
        assert!(matches!(
            &session.drain_notifications()[..],
            [Notification::Toast {
                level: ToastLevel::Warning,
                ..
            }]
        ));
    }

    #[test]
    fn test_highlight() {
        let mut session = sample_session(PathBuf::from("unused.csv"));
        let count = session.highlight(&["has-b".to_string()]).expect("highlight");
        assert_eq!(count, 2);
        assert_eq!(session.table().rows[2].category, "True");
    }

    #[test]
    fn test_save_success_toast() {
        let dir = tempdir().expect("dir");
        let path = dir.path().join("sample_labelled.csv");
        let mut session = sample_session(path.clone());
        session.label(Some([3].as_slice()), "far").expect("label");
        session.drain_notifications();

        let job = session.save_job();
        let outcome = job.run();
        session.report_save(job.path(), &outcome);

        assert!(outcome.is_ok());
        assert!(path.exists());
        assert_eq!(
            session.drain_notifications(),
            vec![Notification::Toast {
                message: "Data saved to sample_labelled.csv".into(),
                level: ToastLevel::Success
            }]
        );
    }

    #[test]
    fn test_save_failure_is_reported() {
        let dir = tempdir().expect("dir");
        let path = dir.path().join("no_such_dir").join("out.csv");
        let mut session = sample_session(path);

        let job = session.save_job();
        let outcome = job.run();
        session.report_save(job.path(), &outcome);

        assert!(outcome.is_err());
        let notes = session.drain_notifications();
        assert!(matches!(
            &notes[..],
            [Notification::Toast { level: ToastLevel::Error, message }] if message.starts_with("Error saving data")
        ));
        // session still usable
        assert!(session.label(Some([0].as_slice()), "again").is_ok());
    }

    #[test]
    fn test_open_defaults_output_path() {
        let dir = tempdir().expect("dir");
        let input = dir.path().join("points.csv");
        std::fs::write(&input, "name,x,y\na,1,1\n").expect("write");

        let session = Session::open(&SessionConfig {
            input: input.clone(),
            ..SessionConfig::default()
        })
        .expect("open");

        assert_eq!(session.output_path(), dir.path().join("points_labelled.csv"));
        assert!(!session.has_features());
    }
}
