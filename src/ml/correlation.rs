//! Ranks features by how well they separate a selected cluster

use crate::structs::{Contingency, FeatureMatrix, FeatureScore, LassoError, Result, Table};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Number of features reported when the caller does not choose
pub const DEFAULT_TOP_K: usize = 5;

/// Build a membership mask from selected row indices
///
/// # Errors
/// Returns `Index` if any index is outside `0..n_rows`
pub fn membership_from_indices(n_rows: usize, indices: &[usize]) -> Result<Vec<bool>> {
    let mut membership = vec![false; n_rows];
    for &index in indices {
        let slot = membership.get_mut(index).ok_or(LassoError::Index {
            index,
            len: n_rows,
        })?;
        *slot = true;
    }
    Ok(membership)
}

/// Membership mask of rows carrying `label`
#[must_use]
pub fn membership_from_label(table: &Table, label: &str) -> Vec<bool> {
    table.rows.iter().map(|r| r.label == label).collect()
}

/// Defined scores descending, then undefined ones, ties by lower index
fn rank_order(a: &FeatureScore, b: &FeatureScore) -> Ordering {
    match (a.mcc, b.mcc) {
        (Some(x), Some(y)) => y.total_cmp(&x).then(a.index.cmp(&b.index)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.index.cmp(&b.index),
    }
}

/// Score every feature against the membership mask, in feature order.
///
/// Features are scored in parallel; each score depends only on that
/// feature's integer counts, so results match a sequential run exactly.
///
/// # Errors
/// Returns `Validation` if the mask length differs from the matrix row count
pub fn score_features(membership: &[bool], features: &FeatureMatrix) -> Result<Vec<FeatureScore>> {
    if membership.len() != features.n_samples() {
        return Err(LassoError::Validation(format!(
            "Membership has {} rows but feature matrix has {}",
            membership.len(),
            features.n_samples()
        )));
    }

    let scores = (0..features.n_features())
        .into_par_iter()
        .map(|j| {
            let counts = Contingency::count(membership, features.data.column(j));
            FeatureScore {
                index: j,
                name: features.names[j].clone(),
                counts,
                mcc: counts.mcc(),
            }
        })
        .collect();

    Ok(scores)
}

/// Return the `k` features most correlated with the cluster
///
/// # Errors
/// Returns `Validation` if the mask length differs from the matrix row count
pub fn rank_features(
    membership: &[bool],
    features: &FeatureMatrix,
    k: usize,
) -> Result<Vec<FeatureScore>> {
    let mut scores = score_features(membership, features)?;
    scores.sort_by(rank_order);
    scores.truncate(k);
    Ok(scores)
}
