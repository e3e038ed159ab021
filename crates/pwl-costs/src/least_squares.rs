// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::model::CostModel;
use pwl_core::{PwlError, ReproMode, SampleSeries, prefix_sums, prefix_sums_kahan};

/// Ordinary least-squares line fitted over one index range.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Sum of squared residuals around the fitted line.
    pub ssr: f64,
    /// Sum of squared deviations of y from its mean.
    pub sst: f64,
}

impl LineFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Least-squares segment cost: the SSR of the best line `y = b + m*x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostLeastSquares {
    pub repro_mode: ReproMode,
}

impl CostLeastSquares {
    pub const fn new(repro_mode: ReproMode) -> Self {
        Self { repro_mode }
    }

    fn running_sums(&self, values: &[f64]) -> Vec<f64> {
        if matches!(self.repro_mode, ReproMode::Strict) {
            prefix_sums_kahan(values)
        } else {
            prefix_sums(values)
        }
    }
}

impl Default for CostLeastSquares {
    fn default() -> Self {
        Self::new(ReproMode::Balanced)
    }
}

/// Prefix-stat cache for O(1) least-squares range queries.
///
/// Both columns are shifted by their global means before accumulation, which
/// keeps the centered sums well conditioned for large-offset x such as
/// timestamps. `run_start[i]` is the first index of the run of equal x values
/// ending at `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct LeastSquaresCache {
    prefix_x: Vec<f64>,
    prefix_y: Vec<f64>,
    prefix_xx: Vec<f64>,
    prefix_xy: Vec<f64>,
    prefix_yy: Vec<f64>,
    run_start: Vec<usize>,
    x_shift: f64,
    y_shift: f64,
    n: usize,
}

impl LeastSquaresCache {
    pub fn n(&self) -> usize {
        self.n
    }

    /// True when every x in `[start, end]` is identical.
    pub fn is_constant_x(&self, start: usize, end: usize) -> bool {
        self.run_start[end] <= start
    }
}

#[derive(Clone, Copy, Debug)]
struct CenteredSums {
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
}

fn cache_overflow_err(n: usize) -> PwlError {
    PwlError::resource_limit(format!(
        "cache size overflow while planning LeastSquaresCache for n={n}"
    ))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn check_range(n: usize, start: usize, end: usize) -> Result<(), PwlError> {
    if end < start || end >= n {
        return Err(PwlError::invalid_input(format!(
            "segment range [{start}, {end}] is invalid for n={n}"
        )));
    }
    let len = end - start + 1;
    if len < 2 {
        return Err(PwlError::InsufficientPoints { start, end, len });
    }
    Ok(())
}

/// Fails with `NumericalIssue` when a moment overflowed or cancelled to NaN.
fn check_finite_sums(start: usize, end: usize, values: &[f64]) -> Result<(), PwlError> {
    if values.iter().all(|value| value.is_finite()) {
        return Ok(());
    }
    Err(PwlError::numerical_issue(format!(
        "least-squares sums over [{start}, {end}] are not finite; rescale x or y"
    )))
}

impl LeastSquaresCache {
    fn centered_sums(&self, start: usize, end: usize) -> CenteredSums {
        let hi = end + 1;
        let m = (hi - start) as f64;
        let sum_x = self.prefix_x[hi] - self.prefix_x[start];
        let sum_y = self.prefix_y[hi] - self.prefix_y[start];
        let sum_xx = self.prefix_xx[hi] - self.prefix_xx[start];
        let sum_xy = self.prefix_xy[hi] - self.prefix_xy[start];
        let sum_yy = self.prefix_yy[hi] - self.prefix_yy[start];

        CenteredSums {
            mean_x: sum_x / m + self.x_shift,
            mean_y: sum_y / m + self.y_shift,
            sxx: sum_xx - (sum_x * sum_x) / m,
            sxy: sum_xy - (sum_x * sum_y) / m,
            syy: sum_yy - (sum_y * sum_y) / m,
        }
    }
}

impl CostLeastSquares {
    /// Fits `[start, end]` in O(1) from the cache.
    pub fn fit(
        &self,
        cache: &LeastSquaresCache,
        start: usize,
        end: usize,
    ) -> Result<LineFit, PwlError> {
        check_range(cache.n, start, end)?;
        if cache.is_constant_x(start, end) {
            return Err(PwlError::DegenerateSegment { start, end });
        }

        let sums = cache.centered_sums(start, end);
        check_finite_sums(start, end, &[sums.sxx, sums.sxy, sums.syy])?;
        if sums.sxx <= 0.0 {
            // Distinct x values whose spread vanished in the prefix differences.
            return Err(PwlError::DegenerateSegment { start, end });
        }

        let slope = sums.sxy / sums.sxx;
        let intercept = sums.mean_y - slope * sums.mean_x;
        let ssr = sums.syy - sums.sxy * slope;
        check_finite_sums(start, end, &[slope, intercept, ssr])?;

        Ok(LineFit {
            intercept,
            slope,
            ssr: ssr.max(0.0),
            sst: sums.syy.max(0.0),
        })
    }
}

/// Fits `[start, end]` with a two-pass centered computation over the samples.
///
/// Slower than [`CostLeastSquares::fit`] but free of prefix-sum cancellation;
/// used for the coefficients and statistics published on a final model.
pub fn fit_direct(series: &SampleSeries, start: usize, end: usize) -> Result<LineFit, PwlError> {
    check_range(series.len(), start, end)?;
    let xs = &series.x()[start..=end];
    let ys = &series.y()[start..=end];

    let first = xs[0];
    if xs.iter().all(|&x| x == first) {
        return Err(PwlError::DegenerateSegment { start, end });
    }

    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    check_finite_sums(start, end, &[sxx, sxy, syy])?;
    if sxx <= 0.0 {
        return Err(PwlError::DegenerateSegment { start, end });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let ssr = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let resid = y - (intercept + slope * x);
            resid * resid
        })
        .sum::<f64>();
    check_finite_sums(start, end, &[slope, intercept, ssr])?;

    Ok(LineFit {
        intercept,
        slope,
        ssr,
        sst: syy,
    })
}

impl CostModel for CostLeastSquares {
    type Cache = LeastSquaresCache;

    fn name(&self) -> &'static str {
        "least_squares"
    }

    fn precompute(&self, series: &SampleSeries) -> Result<Self::Cache, PwlError> {
        let n = series.len();
        if self.worst_case_cache_bytes(n) == usize::MAX {
            return Err(cache_overflow_err(n));
        }

        let x_shift = mean(series.x());
        let y_shift = mean(series.y());
        let xc: Vec<f64> = series.x().iter().map(|x| x - x_shift).collect();
        let yc: Vec<f64> = series.y().iter().map(|y| y - y_shift).collect();
        let xx: Vec<f64> = xc.iter().map(|x| x * x).collect();
        let xy: Vec<f64> = xc.iter().zip(&yc).map(|(x, y)| x * y).collect();
        let yy: Vec<f64> = yc.iter().map(|y| y * y).collect();

        let mut run_start = Vec::with_capacity(n);
        for (idx, x) in series.x().iter().enumerate() {
            let start = match idx.checked_sub(1) {
                Some(prev) if series.x()[prev] == *x => run_start[prev],
                _ => idx,
            };
            run_start.push(start);
        }

        Ok(LeastSquaresCache {
            prefix_x: self.running_sums(&xc),
            prefix_y: self.running_sums(&yc),
            prefix_xx: self.running_sums(&xx),
            prefix_xy: self.running_sums(&xy),
            prefix_yy: self.running_sums(&yy),
            run_start,
            x_shift,
            y_shift,
            n,
        })
    }

    fn worst_case_cache_bytes(&self, n: usize) -> usize {
        let prefix_len = match n.checked_add(1) {
            Some(v) => v,
            None => return usize::MAX,
        };
        let prefix_bytes = match prefix_len
            .checked_mul(5)
            .and_then(|cells| cells.checked_mul(std::mem::size_of::<f64>()))
        {
            Some(v) => v,
            None => return usize::MAX,
        };
        let run_bytes = match n.checked_mul(std::mem::size_of::<usize>()) {
            Some(v) => v,
            None => return usize::MAX,
        };
        prefix_bytes.checked_add(run_bytes).unwrap_or(usize::MAX)
    }

    fn segment_cost(&self, cache: &Self::Cache, start: usize, end: usize) -> f64 {
        assert!(
            start < end,
            "segment_cost requires at least two points; got start={start}, end={end}"
        );
        assert!(
            end < cache.n,
            "segment_cost end out of bounds: end={end}, n={}",
            cache.n
        );

        match self.fit(cache, start, end) {
            Ok(line) => line.ssr,
            Err(PwlError::NumericalIssue(_)) => f64::NAN,
            Err(_) => f64::INFINITY,
        }
    }
}
