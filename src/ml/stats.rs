use crate::structs::Contingency;
use ndarray::ArrayView1;

impl Contingency {
    /// Count cluster membership against feature presence (`value > 0`)
    #[must_use]
    pub fn count(membership: &[bool], feature: ArrayView1<'_, f64>) -> Self {
        let mut counts = Self::default();
        for (&in_cluster, &value) in membership.iter().zip(feature.iter()) {
            let has_feature = value > 0.0;
            match (in_cluster, has_feature) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    /// Matthews correlation coefficient.
    ///
    /// Returns `None` when any marginal is zero, e.g. a feature present in no
    /// rows or in every row.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mcc(&self) -> Option<f64> {
        let (tp, fp, tn, fn_) = (
            self.tp as f64,
            self.fp as f64,
            self.tn as f64,
            self.fn_ as f64,
        );

        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        if denom == 0.0 || !denom.is_finite() {
            return None;
        }

        Some(tp.mul_add(tn, -(fp * fn_)) / denom)
    }
}
