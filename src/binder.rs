//! Applies labels to selected rows and reports progress

use crate::structs::{LabelStatistics, LassoError, Notifier, Result, Table};

/// Assign `label` to every row in `indices`.
///
/// An empty selection is a no-op and sends no notification. All indices are
/// checked before any row is touched, so a bad index leaves the table as it
/// was. On success the statistics are recomputed and the new title is sent to
/// `notifier`.
///
/// # Errors
/// Returns `Index` if any index is outside `0..table.len()`
pub fn apply_label<N: Notifier + ?Sized>(
    table: &mut Table,
    indices: &[usize],
    label: &str,
    notifier: &mut N,
) -> Result<Option<LabelStatistics>> {
    if indices.is_empty() {
        return Ok(None);
    }

    let len = table.len();
    if let Some(&index) = indices.iter().find(|&&i| i >= len) {
        return Err(LassoError::Index { index, len });
    }

    for &index in indices {
        table.set_label(index, label);
    }

    let stats = table.statistics();
    log::debug!(
        "Labelled {} rows as '{label}', {:.1}% unlabelled",
        indices.len(),
        stats.unlabeled_percentage
    );
    notifier.notify_title(&stats.title());
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{CsvData, Notification, NotificationLog, TableOptions};

    fn sample_table() -> Table {
        let content = "name,x,y,label\n\
                       point1,1.0,5.0,\n\
                       point2,2.0,4.0,\n\
                       point3,3.0,3.0,label1\n\
                       point4,4.0,2.0,\n\
                       point5,5.0,1.0,label2\n";
        let csv = CsvData::from_reader(content.as_bytes(), false).expect("parse");
        Table::from_csv(csv, &TableOptions::default()).expect("table")
    }

    #[test]
    fn test_apply_label() {
        let mut table = sample_table();
        let mut log = NotificationLog::default();

        apply_label(&mut table, &[0, 1], "new_label", &mut log).expect("label");

        assert_eq!(
            table.labels(),
            vec!["new_label", "new_label", "label1", "", "label2"]
        );
        assert_eq!(table.rows[0].category, "new_label");
        assert_eq!(table.rows[3].category, "unlabelled");
    }

    #[test]
    fn test_apply_label_notifies_title() {
        let mut table = sample_table();
        let mut log = NotificationLog::default();

        let stats = apply_label(&mut table, &[0, 1], "new_label", &mut log)
            .expect("label")
            .expect("stats");

        assert!((stats.unlabeled_percentage - 20.0).abs() < 1e-9);
        assert_eq!(
            log.drain(),
            vec![Notification::Title {
                text: "Scatter plot lasso labeller, labeled: 80.0%".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let mut table = sample_table();
        let before = table.clone();
        let mut log = NotificationLog::default();

        let stats = apply_label(&mut table, &[], "anything", &mut log).expect("label");

        assert!(stats.is_none());
        assert_eq!(table, before);
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_apply_label_idempotent() {
        let mut once = sample_table();
        let mut twice = sample_table();
        let mut log = NotificationLog::default();

        apply_label(&mut once, &[1, 3], "cell", &mut log).expect("label");
        apply_label(&mut twice, &[1, 3], "cell", &mut log).expect("label");
        apply_label(&mut twice, &[1, 3], "cell", &mut log).expect("label");

        assert_eq!(once, twice);
    }

    #[test]
    fn test_null_token_label_clears_rows() {
        let mut table = sample_table();
        let mut log = NotificationLog::default();

        apply_label(&mut table, &[2], "NA", &mut log).expect("label");

        assert_eq!(table.rows[2].label, "");
        assert_eq!(table.rows[2].cells[3], "");
        assert_eq!(table.rows[2].category, "unlabelled");
    }

    #[test]
    fn test_last_write_wins() {
        let mut table = sample_table();
        let mut log = NotificationLog::default();

        apply_label(&mut table, &[2], "first", &mut log).expect("label");
        apply_label(&mut table, &[2], "second", &mut log).expect("label");

        assert_eq!(table.rows[2].label, "second");
        assert_eq!(table.rows[2].cells[3], "second");
    }

    #[test]
    fn test_out_of_range_leaves_table_untouched() {
        let mut table = sample_table();
        let before = table.clone();
        let mut log = NotificationLog::default();

        let err = apply_label(&mut table, &[0, 5], "bad", &mut log).unwrap_err();

        assert!(matches!(err, LassoError::Index { index: 5, len: 5 }));
        assert_eq!(table, before);
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_clearing_a_label() {
        let mut table = sample_table();
        let mut log = NotificationLog::default();

        let stats = apply_label(&mut table, &[2, 4], "", &mut log)
            .expect("label")
            .expect("stats");

        assert!((stats.unlabeled_percentage - 100.0).abs() < 1e-9);
        assert!(stats.labels.is_empty());
    }
}
