// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::PwlError;
use std::sync::Arc;

/// Immutable ordered (x, y) samples shared between fits and models.
///
/// Cloning is cheap: both columns live behind an `Arc`. Index order is taken
/// as given; the series is never sorted.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleSeries {
    x: Arc<[f64]>,
    y: Arc<[f64]>,
}

fn check_column(values: &[f64], column: &'static str) -> Result<(), PwlError> {
    match values.iter().position(|value| !value.is_finite()) {
        Some(index) => Err(PwlError::NonNumericData { column, index }),
        None => Ok(()),
    }
}

impl SampleSeries {
    /// Validates and takes ownership of the two columns.
    pub fn load(x: impl Into<Arc<[f64]>>, y: impl Into<Arc<[f64]>>) -> Result<Self, PwlError> {
        let x = x.into();
        let y = y.into();

        if x.len() != y.len() {
            return Err(PwlError::invalid_input(format!(
                "x and y must have equal length; got x={}, y={}",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(PwlError::EmptySeries { got: x.len() });
        }
        check_column(&x, "x")?;
        check_column(&y, "y")?;

        Ok(Self { x, y })
    }

    /// Builds a series from `(x, y)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, PwlError> {
        let (x, y): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
        Self::load(x, y)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false for a loaded series; kept for the `len`/`is_empty` pair.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn point(&self, index: usize) -> Option<(f64, f64)> {
        Some((*self.x.get(index)?, *self.y.get(index)?))
    }

    /// Smallest and largest x, independent of index order.
    pub fn x_range(&self) -> (f64, f64) {
        self.x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// True when x never decreases with the index.
    pub fn is_x_non_decreasing(&self) -> bool {
        self.x.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// True when `self` and `other` share the same column allocations.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.x, &other.x) && Arc::ptr_eq(&self.y, &other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::SampleSeries;
    use crate::PwlError;

    #[test]
    fn load_accepts_two_points_and_exposes_columns() {
        let series = SampleSeries::load(vec![0.0, 1.0], vec![2.0, 3.0])
            .expect("two points should load");
        assert_eq!(series.len(), 2);
        assert!(!series.is_empty());
        assert_eq!(series.x(), &[0.0, 1.0]);
        assert_eq!(series.y(), &[2.0, 3.0]);
        assert_eq!(series.point(1), Some((1.0, 3.0)));
        assert_eq!(series.point(2), None);
    }

    #[test]
    fn load_rejects_fewer_than_two_points() {
        let err = SampleSeries::load(vec![1.0], vec![1.0]).expect_err("one point must fail");
        assert_eq!(err, PwlError::EmptySeries { got: 1 });

        let err = SampleSeries::from_pairs(&[]).expect_err("no points must fail");
        assert_eq!(err, PwlError::EmptySeries { got: 0 });
    }

    #[test]
    fn load_rejects_non_finite_values_with_column_and_index() {
        let err = SampleSeries::load(vec![0.0, 1.0, 2.0], vec![0.0, f64::NAN, 1.0])
            .expect_err("NaN must fail");
        assert_eq!(
            err,
            PwlError::NonNumericData {
                column: "y",
                index: 1
            }
        );

        let err = SampleSeries::load(vec![0.0, f64::INFINITY], vec![0.0, 1.0])
            .expect_err("inf must fail");
        assert_eq!(
            err,
            PwlError::NonNumericData {
                column: "x",
                index: 1
            }
        );
    }

    #[test]
    fn load_rejects_mismatched_lengths() {
        let err = SampleSeries::load(vec![0.0, 1.0, 2.0], vec![0.0, 1.0])
            .expect_err("length mismatch must fail");
        assert!(matches!(err, PwlError::InvalidInput(_)));
    }

    #[test]
    fn from_pairs_preserves_index_order() {
        let series = SampleSeries::from_pairs(&[(3.0, 1.0), (1.0, 2.0), (2.0, 3.0)])
            .expect("pairs should load");
        assert_eq!(series.x(), &[3.0, 1.0, 2.0]);
        assert!(!series.is_x_non_decreasing());
        assert_eq!(series.x_range(), (1.0, 3.0));
    }

    #[test]
    fn clones_share_storage() {
        let series = SampleSeries::from_pairs(&[(0.0, 0.0), (1.0, 1.0)]).expect("valid");
        let clone = series.clone();
        assert!(series.ptr_eq(&clone));
        let rebuilt = SampleSeries::from_pairs(&[(0.0, 0.0), (1.0, 1.0)]).expect("valid");
        assert_eq!(series, rebuilt);
        assert!(!series.ptr_eq(&rebuilt));
    }
}
