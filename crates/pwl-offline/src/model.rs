// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::{Continuity, DomainPolicy};
use pwl_core::{Diagnostics, PwlError, SampleSeries};
use pwl_costs::LineFit;

/// One fitted segment over the inclusive index range `[start, end]`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    /// Published line; `ssr` and `sst` are measured over this segment's samples.
    pub line: LineFit,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false: a segment holds at least two samples.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn slope(&self) -> f64 {
        self.line.slope
    }

    pub fn intercept(&self) -> f64 {
        self.line.intercept
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.line.eval(x)
    }
}

/// Per-segment summary row.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentStats {
    /// 1-based segment number.
    pub segment: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub start_x: f64,
    pub end_x: f64,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// `end_x - start_x`.
    pub duration: f64,
    /// `y[end_index] - y[start_index]`.
    pub span: f64,
    pub ssr: f64,
    pub sst: f64,
}

/// Coefficient of determination with the conventions used for exact and flat segments.
///
/// A perfect fit reports 1.0 even when y is constant; a constant y that the
/// line still misses has no defined R² and reports NaN.
pub fn r_squared(ssr: f64, sst: f64) -> f64 {
    if ssr == 0.0 {
        1.0
    } else if sst == 0.0 {
        f64::NAN
    } else {
        1.0 - ssr / sst
    }
}

/// Fitted piecewise-linear model.
///
/// Holds the shared series it was fitted on, `K + 1` breakpoints and `K`
/// segments. Read-only after construction, so a model may be shared across
/// threads and queried concurrently.
#[derive(Clone, Debug)]
pub struct PiecewiseLinearModel {
    series: SampleSeries,
    breakpoints: Vec<usize>,
    segments: Vec<Segment>,
    end_x: Vec<f64>,
    x_min: f64,
    x_max: f64,
    objective: f64,
    continuity: Continuity,
    domain: DomainPolicy,
    diagnostics: Diagnostics,
}

impl PiecewiseLinearModel {
    pub(crate) fn new(
        series: SampleSeries,
        breakpoints: Vec<usize>,
        segments: Vec<Segment>,
        objective: f64,
        continuity: Continuity,
        domain: DomainPolicy,
        diagnostics: Diagnostics,
    ) -> Self {
        let end_x = segments.iter().map(|seg| series.x()[seg.end]).collect();
        let (x_min, x_max) = series.x_range();
        Self {
            series,
            breakpoints,
            segments,
            end_x,
            x_min,
            x_max,
            objective,
            continuity,
            domain,
            diagnostics,
        }
    }

    pub fn series(&self) -> &SampleSeries {
        &self.series
    }

    /// Sample indices `0 = b_0 < b_1 < ... < b_K = n - 1`.
    pub fn breakpoints(&self) -> &[usize] {
        &self.breakpoints
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Optimal total cost found by the partitioner.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Sum of the published per-segment SSR.
    pub fn total_ssr(&self) -> f64 {
        self.segments.iter().map(|seg| seg.line.ssr).sum()
    }

    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    pub fn domain(&self) -> DomainPolicy {
        self.domain
    }

    /// Returns a copy of the model with a different out-of-domain policy.
    pub fn with_domain(mut self, domain: DomainPolicy) -> Self {
        self.domain = domain;
        self
    }

    pub fn x_domain(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Index of the segment whose line serves query `x`.
    ///
    /// The first segment whose end x is at or beyond the query wins, so a
    /// query equal to a breakpoint x belongs to the segment on its left.
    /// Queries below the first breakpoint use segment 0 and queries beyond
    /// the last use the final segment.
    pub fn segment_for(&self, x: f64) -> usize {
        let idx = self.end_x.partition_point(|&end| end < x);
        idx.min(self.segments.len() - 1)
    }

    /// Evaluates the model at one query point.
    pub fn predict_one(&self, x: f64) -> Result<f64, PwlError> {
        if self.domain == DomainPolicy::Strict && !(self.x_min..=self.x_max).contains(&x) {
            return Err(PwlError::OutOfDomain {
                query: x,
                x_min: self.x_min,
                x_max: self.x_max,
            });
        }
        Ok(self.segments[self.segment_for(x)].eval(x))
    }

    /// Evaluates the model at every query, preserving order.
    pub fn predict(&self, queries: &[f64]) -> Result<Vec<f64>, PwlError> {
        queries.iter().map(|&x| self.predict_one(x)).collect()
    }

    /// One summary row per segment, in segment order.
    pub fn segment_stats(&self) -> Vec<SegmentStats> {
        let x = self.series.x();
        let y = self.series.y();
        self.segments
            .iter()
            .enumerate()
            .map(|(idx, seg)| SegmentStats {
                segment: idx + 1,
                start_index: seg.start,
                end_index: seg.end,
                start_x: x[seg.start],
                end_x: x[seg.end],
                slope: seg.line.slope,
                intercept: seg.line.intercept,
                r_squared: r_squared(seg.line.ssr, seg.line.sst),
                duration: x[seg.end] - x[seg.start],
                span: y[seg.end] - y[seg.start],
                ssr: seg.line.ssr,
                sst: seg.line.sst,
            })
            .collect()
    }
}
