// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pwl_core::{PwlError, SampleSeries};

/// Segment cost oracle queried by the partitioner.
///
/// Ranges are inclusive on both ends: `[start, end]` covers
/// `end - start + 1` samples.
pub trait CostModel {
    type Cache: Sync;

    fn name(&self) -> &'static str;

    /// Builds the per-fit cache in O(n).
    fn precompute(&self, series: &SampleSeries) -> Result<Self::Cache, PwlError>;

    /// Bytes `precompute` will allocate for `n` samples, or `usize::MAX` on overflow.
    fn worst_case_cache_bytes(&self, n: usize) -> usize;

    /// Cost of the inclusive range `[start, end]`.
    ///
    /// Returns `f64::INFINITY` when the range cannot be fitted, so that the
    /// partitioner can skip it as a candidate, and `f64::NAN` when the fit
    /// broke down numerically, which aborts the partition.
    fn segment_cost(&self, cache: &Self::Cache, start: usize, end: usize) -> f64;
}
