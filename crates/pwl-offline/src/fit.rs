// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::{Continuity, FitConfig};
use crate::joined::refit_joined;
use crate::model::{PiecewiseLinearModel, Segment};
use crate::partition::Partitioner;
use pwl_core::{ExecutionContext, PwlError, SampleSeries};
use pwl_costs::{CostLeastSquares, fit_direct};

/// Fits `segments` independent lines with at least `min_segment_len` samples each.
pub fn fit(
    series: &SampleSeries,
    segments: usize,
    min_segment_len: usize,
) -> Result<PiecewiseLinearModel, PwlError> {
    fit_with_config(
        series,
        &FitConfig::new(segments, min_segment_len),
        &ExecutionContext::new(),
    )
}

/// Fits a model under an explicit configuration and execution context.
///
/// Breakpoints come from the exact partitioner. Published coefficients are
/// then recomputed per segment with a two-pass fit, or jointly under
/// [`Continuity::Joined`].
pub fn fit_with_config(
    series: &SampleSeries,
    config: &FitConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<PiecewiseLinearModel, PwlError> {
    config.check_feasible(series.len())?;

    let partitioner = Partitioner::new(
        CostLeastSquares::new(ctx.repro_mode),
        config.segments,
        config.min_segment_len,
    )?;
    let partition = partitioner.partition(series, ctx)?;

    let segments = match config.continuity {
        Continuity::Independent => partition
            .breakpoints
            .windows(2)
            .map(|pair| {
                Ok(Segment {
                    start: pair[0],
                    end: pair[1],
                    line: fit_direct(series, pair[0], pair[1])?,
                })
            })
            .collect::<Result<Vec<_>, PwlError>>()?,
        Continuity::Joined => refit_joined(series, &partition.breakpoints)?,
    };

    let mut diagnostics = partition.diagnostics;
    diagnostics
        .notes
        .push(format!("continuity={}", config.continuity.as_str()));
    let total_ssr: f64 = segments.iter().map(|seg| seg.line.ssr).sum();
    diagnostics.notes.push(format!("total_ssr={total_ssr}"));

    log::debug!(
        "fitted {} segment(s) over n={} with breakpoints {:?}, total_ssr={total_ssr}",
        segments.len(),
        series.len(),
        partition.breakpoints
    );

    Ok(PiecewiseLinearModel::new(
        series.clone(),
        partition.breakpoints,
        segments,
        partition.objective,
        config.continuity,
        config.domain,
        diagnostics,
    ))
}
