// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::model::Segment;
use pwl_core::{PwlError, SampleSeries};
use pwl_costs::LineFit;

// Basis on u = (x - x_min) / (x_max - x_min):
//   1, u, (u - t_1)+, ..., (u - t_{K-1})+
// where t_i is the scaled x of interior breakpoint i.

fn cholesky_in_place(matrix: &mut [f64], n: usize) -> Result<(), PwlError> {
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i * n + j];
            for k in 0..j {
                sum -= matrix[i * n + k] * matrix[j * n + k];
            }

            if i == j {
                if !sum.is_finite() || sum <= 0.0 {
                    return Err(PwlError::numerical_issue(
                        "joined normal equations are not positive definite",
                    ));
                }
                matrix[i * n + i] = sum.sqrt();
            } else {
                matrix[i * n + j] = sum / matrix[j * n + j];
            }
        }

        for j in i + 1..n {
            matrix[i * n + j] = 0.0;
        }
    }
    Ok(())
}

/// Solves `L L^T z = rhs` for a lower factor stored row-major.
fn cholesky_solve(factor: &[f64], n: usize, rhs: &mut [f64]) {
    for i in 0..n {
        let mut sum = rhs[i];
        for k in 0..i {
            sum -= factor[i * n + k] * rhs[k];
        }
        rhs[i] = sum / factor[i * n + i];
    }
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for k in i + 1..n {
            sum -= factor[k * n + i] * rhs[k];
        }
        rhs[i] = sum / factor[i * n + i];
    }
}

fn fill_basis(u: f64, knots: &[f64], out: &mut [f64]) {
    out[0] = 1.0;
    out[1] = u;
    for (slot, &knot) in out[2..].iter_mut().zip(knots) {
        *slot = (u - knot).max(0.0);
    }
}

fn segment_line(
    series: &SampleSeries,
    start: usize,
    end: usize,
    intercept: f64,
    slope: f64,
) -> LineFit {
    let xs = &series.x()[start..=end];
    let ys = &series.y()[start..=end];
    let mean_y = ys.iter().sum::<f64>() / ys.len() as f64;

    let mut ssr = 0.0;
    let mut sst = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let resid = y - (intercept + slope * x);
        ssr += resid * resid;
        let dev = y - mean_y;
        sst += dev * dev;
    }

    LineFit {
        intercept,
        slope,
        ssr,
        sst,
    }
}

/// Refits the segments on fixed breakpoints so adjacent lines meet at each
/// interior breakpoint x.
///
/// Solves one least-squares problem over all samples in a hinge basis, then
/// reads each segment's slope and intercept back out of it. Requires x to be
/// non-decreasing so that each hinge switches on exactly at its breakpoint.
pub(crate) fn refit_joined(
    series: &SampleSeries,
    breakpoints: &[usize],
) -> Result<Vec<Segment>, PwlError> {
    if !series.is_x_non_decreasing() {
        return Err(PwlError::invalid_input(
            "continuity=joined requires non-decreasing x",
        ));
    }
    if breakpoints.len() < 2 {
        return Err(PwlError::invalid_input(format!(
            "joined refit needs at least 2 breakpoints; got {}",
            breakpoints.len()
        )));
    }

    let x = series.x();
    let y = series.y();
    for pair in breakpoints.windows(2) {
        if x[pair[0]] == x[pair[1]] {
            return Err(PwlError::DegenerateSegment {
                start: pair[0],
                end: pair[1],
            });
        }
    }

    let (x_min, x_max) = series.x_range();
    let scale = x_max - x_min;
    let to_unit = |value: f64| (value - x_min) / scale;
    let knots: Vec<f64> = breakpoints[1..breakpoints.len() - 1]
        .iter()
        .map(|&b| to_unit(x[b]))
        .collect();

    let p = knots.len() + 2;
    let mut gram = vec![0.0; p * p];
    let mut rhs = vec![0.0; p];
    let mut phi = vec![0.0; p];
    for (&xi, &yi) in x.iter().zip(y) {
        fill_basis(to_unit(xi), &knots, &mut phi);
        for r in 0..p {
            rhs[r] += phi[r] * yi;
            for c in 0..=r {
                gram[r * p + c] += phi[r] * phi[c];
            }
        }
    }
    for r in 0..p {
        for c in r + 1..p {
            gram[r * p + c] = gram[c * p + r];
        }
    }

    cholesky_in_place(&mut gram, p)?;
    cholesky_solve(&gram, p, &mut rhs);
    if rhs.iter().any(|coef| !coef.is_finite()) {
        return Err(PwlError::numerical_issue(
            "joined refit produced non-finite coefficients",
        ));
    }

    let mut unit_intercept = rhs[0];
    let mut unit_slope = rhs[1];
    let mut segments = Vec::with_capacity(breakpoints.len() - 1);
    for (idx, pair) in breakpoints.windows(2).enumerate() {
        if idx > 0 {
            let hinge = rhs[idx + 1];
            unit_slope += hinge;
            unit_intercept -= hinge * knots[idx - 1];
        }
        let slope = unit_slope / scale;
        let intercept = unit_intercept - slope * x_min;
        segments.push(Segment {
            start: pair[0],
            end: pair[1],
            line: segment_line(series, pair[0], pair[1], intercept, slope),
        });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::{cholesky_in_place, cholesky_solve, refit_joined};
    use pwl_core::{PwlError, SampleSeries};

    fn indexed(y: &[f64]) -> SampleSeries {
        let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
        SampleSeries::load(x, y.to_vec()).expect("series should load")
    }

    #[test]
    fn cholesky_solves_small_spd_system() {
        let mut a = vec![4.0, 2.0, 2.0, 3.0];
        let mut b = vec![2.0, 1.0];
        cholesky_in_place(&mut a, 2).expect("matrix is positive definite");
        cholesky_solve(&a, 2, &mut b);
        assert!((b[0] - 0.5).abs() < 1e-12);
        assert!(b[1].abs() < 1e-12);
    }

    #[test]
    fn cholesky_rejects_singular_matrix() {
        let mut a = vec![1.0, 1.0, 1.0, 1.0];
        let err = cholesky_in_place(&mut a, 2).expect_err("singular must fail");
        assert!(matches!(err, PwlError::NumericalIssue(_)));
    }

    #[test]
    fn continuous_data_is_recovered_exactly() {
        let y: Vec<f64> = (0..10)
            .map(|i| {
                let x = i as f64;
                if i < 5 { x } else { 2.0 * x - 5.0 }
            })
            .collect();
        let segments = refit_joined(&indexed(&y), &[0, 5, 9]).expect("refit should succeed");
        assert_eq!(segments.len(), 2);
        assert!((segments[0].slope() - 1.0).abs() < 1e-9);
        assert!(segments[0].intercept().abs() < 1e-9);
        assert!((segments[1].slope() - 2.0).abs() < 1e-9);
        assert!((segments[1].intercept() + 5.0).abs() < 1e-9);
        assert!(segments.iter().all(|seg| seg.line.ssr < 1e-12));
    }

    #[test]
    fn adjacent_lines_meet_at_breakpoint_x() {
        let y = [0.0, 1.2, 1.9, 3.1, 2.5, 2.0, 1.4, 1.1, 2.0, 3.3, 4.1];
        let series = indexed(&y);
        let breakpoints = [0, 3, 7, 10];
        let segments = refit_joined(&series, &breakpoints).expect("refit should succeed");
        for (pair, &b) in segments.windows(2).zip(&breakpoints[1..3]) {
            let at = series.x()[b];
            assert!(
                (pair[0].eval(at) - pair[1].eval(at)).abs() < 1e-9,
                "lines should meet at x={at}"
            );
        }
    }

    #[test]
    fn single_segment_matches_ordinary_least_squares() {
        let y = [1.0, 3.0, 2.0, 5.0, 4.0];
        let series = indexed(&y);
        let joined = refit_joined(&series, &[0, 4]).expect("refit should succeed");
        let direct = pwl_costs::fit_direct(&series, 0, 4).expect("direct fit should succeed");
        assert!((joined[0].slope() - direct.slope).abs() < 1e-9);
        assert!((joined[0].intercept() - direct.intercept).abs() < 1e-9);
        assert!((joined[0].line.ssr - direct.ssr).abs() < 1e-9);
        assert!((joined[0].line.sst - direct.sst).abs() < 1e-12);
    }

    #[test]
    fn large_x_offset_stays_well_conditioned() {
        let x: Vec<f64> = (0..12).map(|i| 1.7e9 + i as f64).collect();
        let y: Vec<f64> = (0..12)
            .map(|i| if i < 6 { i as f64 } else { 5.0 - 0.5 * (i - 5) as f64 })
            .collect();
        let series = SampleSeries::load(x, y).expect("series should load");
        let segments = refit_joined(&series, &[0, 5, 11]).expect("refit should succeed");
        assert!((segments[0].slope() - 1.0).abs() < 1e-6);
        assert!((segments[1].slope() + 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_non_monotone_x_and_vertical_segments() {
        let series = SampleSeries::from_pairs(&[(0.0, 0.0), (2.0, 1.0), (1.0, 2.0), (3.0, 3.0)])
            .expect("series should load");
        let err = refit_joined(&series, &[0, 3]).expect_err("non-monotone x must fail");
        assert!(matches!(err, PwlError::InvalidInput(_)));

        let series =
            SampleSeries::from_pairs(&[(0.0, 0.0), (1.0, 1.0), (1.0, 2.0), (2.0, 3.0)])
                .expect("series should load");
        let err = refit_joined(&series, &[0, 1, 2, 3]).expect_err("vertical segment must fail");
        assert_eq!(err, PwlError::DegenerateSegment { start: 1, end: 2 });
    }
}
