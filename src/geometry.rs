//! Lasso containment test

/// Closed polygon drawn by the user, in data coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lasso {
    points: Vec<(f64, f64)>,
}

impl Lasso {
    #[must_use]
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// A lasso needs three vertices to enclose anything
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2
    }

    /// Even-odd ray casting test
    #[must_use]
    pub fn contains(&self, (x, y): (f64, f64)) -> bool {
        if !self.is_closed() {
            return false;
        }

        let mut inside = false;
        let mut j = self.points.len() - 1;
        for i in 0..self.points.len() {
            let (xi, yi) = self.points[i];
            let (xj, yj) = self.points[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Indices of `points` that fall inside the lasso, ascending
    #[must_use]
    pub fn select(&self, points: &[(f64, f64)]) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, &p)| self.contains(p))
            .map(|(i, _)| i)
            .collect()
    }
}
