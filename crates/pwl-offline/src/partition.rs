// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::FitConfig;
#[cfg(feature = "rayon")]
use pwl_core::ReproMode;
use pwl_core::{Diagnostics, ExecutionContext, PwlError, SampleSeries};
use pwl_costs::CostModel;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::borrow::Cow;
use std::mem::size_of;
use std::time::Instant;

const NO_BACKPOINTER: usize = usize::MAX;
#[cfg(feature = "rayon")]
const PARALLEL_MIN_ROW_WIDTH: usize = 64;

/// Optimal breakpoints for a fixed segment count.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    /// `segments + 1` sample indices, starting at 0 and ending at `n - 1`.
    pub breakpoints: Vec<usize>,
    /// Minimum total segment cost.
    pub objective: f64,
    pub diagnostics: Diagnostics,
}

/// Exact dynamic-programming partitioner over shared-breakpoint segments.
///
/// Segment `i` covers the inclusive range `[b_i, b_{i+1}]`, so adjacent
/// segments share their boundary sample. Each segment holds at least
/// `min_segment_len` samples.
#[derive(Debug)]
pub struct Partitioner<C: CostModel> {
    cost_model: C,
    segments: usize,
    min_segment_len: usize,
}

impl<C: CostModel> Partitioner<C> {
    pub fn new(cost_model: C, segments: usize, min_segment_len: usize) -> Result<Self, PwlError> {
        FitConfig::new(segments, min_segment_len).validate()?;
        Ok(Self {
            cost_model,
            segments,
            min_segment_len,
        })
    }

    pub fn cost_model(&self) -> &C {
        &self.cost_model
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn min_segment_len(&self) -> usize {
        self.min_segment_len
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct RuntimeStats {
    cost_evals: usize,
    candidates_considered: usize,
    degenerate_candidates: usize,
    #[cfg(feature = "rayon")]
    used_parallel: bool,
}

#[derive(Clone, Copy, Debug)]
struct Cell {
    objective: f64,
    back: usize,
    cost_evals: usize,
    candidates_considered: usize,
    degenerate_candidates: usize,
}

/// Index bounds of the DP sweep for `n` samples.
#[derive(Clone, Copy, Debug)]
struct Layout {
    n: usize,
    segments: usize,
    step: usize,
}

impl Layout {
    /// Smallest endpoint reachable with `k` segments.
    fn lo(&self, k: usize) -> usize {
        k * self.step
    }

    /// Largest endpoint from which the remaining `segments - k` segments still fit.
    fn hi(&self, k: usize) -> usize {
        if k == 0 {
            0
        } else {
            self.n - 1 - (self.segments - k) * self.step
        }
    }

    fn row_range(&self, k: usize) -> (usize, usize) {
        if k == self.segments {
            (self.n - 1, self.n - 1)
        } else {
            (self.lo(k), self.hi(k))
        }
    }
}

fn checked_counter_add(counter: &mut usize, delta: usize, name: &str) -> Result<(), PwlError> {
    *counter = counter
        .checked_add(delta)
        .ok_or_else(|| PwlError::resource_limit(format!("{name} counter overflow")))?;
    Ok(())
}

fn checked_usize_mul(lhs: usize, rhs: usize, context: &str) -> Result<usize, PwlError> {
    lhs.checked_mul(rhs)
        .ok_or_else(|| PwlError::resource_limit(format!("{context} overflow")))
}

fn checked_usize_add(lhs: usize, rhs: usize, context: &str) -> Result<usize, PwlError> {
    lhs.checked_add(rhs)
        .ok_or_else(|| PwlError::resource_limit(format!("{context} overflow")))
}

/// Bytes held by the `(segments + 1) x n` objective and backpointer tables.
pub(crate) fn estimate_table_bytes(n: usize, segments: usize) -> Result<usize, PwlError> {
    let rows = checked_usize_add(segments, 1, "dp row count")?;
    let cells = checked_usize_mul(rows, n, "dp cell count")?;
    let objective_bytes = checked_usize_mul(cells, size_of::<f64>(), "dp objective bytes")?;
    let backpointer_bytes = checked_usize_mul(cells, size_of::<usize>(), "dp backpointer bytes")?;
    checked_usize_add(objective_bytes, backpointer_bytes, "dp table bytes")
}

fn best_predecessor<C: CostModel>(
    model: &C,
    cache: &C::Cache,
    prev_row: &[f64],
    first: usize,
    last: usize,
    end: usize,
) -> Result<Cell, PwlError> {
    let mut cell = Cell {
        objective: f64::INFINITY,
        back: NO_BACKPOINTER,
        cost_evals: 0,
        candidates_considered: 0,
        degenerate_candidates: 0,
    };

    // Ascending scan with strict `<` keeps the leftmost minimiser on ties.
    for start in first..=last {
        let prefix = prev_row[start];
        if !prefix.is_finite() {
            continue;
        }
        cell.candidates_considered += 1;
        cell.cost_evals += 1;

        let cost = model.segment_cost(cache, start, end);
        if cost.is_nan() {
            return Err(PwlError::numerical_issue(format!(
                "NaN segment cost at [{start}, {end}]"
            )));
        }
        if cost == f64::INFINITY {
            cell.degenerate_candidates += 1;
            continue;
        }

        let objective = prefix + cost;
        if objective.is_nan() {
            return Err(PwlError::numerical_issue(format!(
                "NaN dp objective at start={start}, end={end}"
            )));
        }
        if objective < cell.objective {
            cell.objective = objective;
            cell.back = start;
        }
    }

    Ok(cell)
}

#[cfg(feature = "rayon")]
fn can_use_parallel(ctx: &ExecutionContext<'_>) -> bool {
    ctx.repro_mode != ReproMode::Strict
}

#[cfg(not(feature = "rayon"))]
fn can_use_parallel(_ctx: &ExecutionContext<'_>) -> bool {
    false
}

#[allow(clippy::too_many_arguments)]
fn fill_row<C: CostModel + Sync>(
    model: &C,
    cache: &C::Cache,
    layout: Layout,
    k: usize,
    prev_row: &[f64],
    row: &mut [f64],
    back_row: &mut [usize],
    parallel: bool,
    runtime: &mut RuntimeStats,
) -> Result<(), PwlError> {
    let (lo, hi) = layout.row_range(k);
    let first = layout.lo(k - 1);
    let prev_hi = layout.hi(k - 1);
    let last_for = |end: usize| (end - layout.step).min(prev_hi);

    let mut apply = |end: usize, cell: Cell, runtime: &mut RuntimeStats| -> Result<(), PwlError> {
        checked_counter_add(&mut runtime.cost_evals, cell.cost_evals, "cost_evals")?;
        checked_counter_add(
            &mut runtime.candidates_considered,
            cell.candidates_considered,
            "candidates_considered",
        )?;
        checked_counter_add(
            &mut runtime.degenerate_candidates,
            cell.degenerate_candidates,
            "degenerate_candidates",
        )?;
        if cell.back != NO_BACKPOINTER {
            row[end] = cell.objective;
            back_row[end] = cell.back;
        }
        Ok(())
    };

    #[cfg(feature = "rayon")]
    if parallel && hi - lo + 1 >= PARALLEL_MIN_ROW_WIDTH {
        let cells = (lo..=hi)
            .into_par_iter()
            .map(|end| best_predecessor(model, cache, prev_row, first, last_for(end), end))
            .collect::<Result<Vec<_>, PwlError>>()?;
        runtime.used_parallel = true;
        for (end, cell) in (lo..=hi).zip(cells) {
            apply(end, cell, runtime)?;
        }
        return Ok(());
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    for end in lo..=hi {
        let cell = best_predecessor(model, cache, prev_row, first, last_for(end), end)?;
        apply(end, cell, runtime)?;
    }
    Ok(())
}

struct Sweep {
    objective: Vec<f64>,
    back: Vec<usize>,
}

fn run_sweep<C: CostModel + Sync>(
    model: &C,
    cache: &C::Cache,
    layout: Layout,
    ctx: &ExecutionContext<'_>,
    runtime: &mut RuntimeStats,
) -> Result<Sweep, PwlError> {
    let n = layout.n;
    let cells = (layout.segments + 1) * n;
    let mut objective = vec![f64::INFINITY; cells];
    let mut back = vec![NO_BACKPOINTER; cells];
    objective[0] = 0.0;

    let parallel = can_use_parallel(ctx);
    for k in 1..=layout.segments {
        let (done, rest) = objective.split_at_mut(k * n);
        let prev_row = &done[(k - 1) * n..];
        fill_row(
            model,
            cache,
            layout,
            k,
            prev_row,
            &mut rest[..n],
            &mut back[k * n..(k + 1) * n],
            parallel,
            runtime,
        )?;
        ctx.report_progress(k as f32 / layout.segments as f32);
    }

    Ok(Sweep { objective, back })
}

fn backtrack(sweep: &Sweep, layout: Layout) -> Result<Vec<usize>, PwlError> {
    let n = layout.n;
    let mut breakpoints = vec![0; layout.segments + 1];
    breakpoints[layout.segments] = n - 1;

    let mut cursor = n - 1;
    for k in (1..=layout.segments).rev() {
        let prev = sweep.back[k * n + cursor];
        if prev == NO_BACKPOINTER {
            return Err(PwlError::numerical_issue(format!(
                "backtracking failed at segment={k}, end={cursor}"
            )));
        }
        breakpoints[k - 1] = prev;
        cursor = prev;
    }

    let well_formed = breakpoints[0] == 0
        && breakpoints
            .windows(2)
            .all(|pair| pair[1] >= pair[0] + layout.step);
    if !well_formed {
        return Err(PwlError::numerical_issue(format!(
            "backtracking produced malformed breakpoints {breakpoints:?}"
        )));
    }
    Ok(breakpoints)
}

impl<C: CostModel + Sync> Partitioner<C> {
    /// Finds the breakpoints minimising the summed segment cost.
    ///
    /// Runs in O(n^2 * segments) time and O(n * segments) memory. Among
    /// equal-cost partitions the one with the leftmost breakpoints wins, and
    /// ranges the cost model rejects as unfittable are never selected.
    pub fn partition(
        &self,
        series: &SampleSeries,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Partition, PwlError> {
        let n = series.len();
        let config = FitConfig::new(self.segments, self.min_segment_len);
        config.check_feasible(n)?;

        let table_bytes = estimate_table_bytes(n, self.segments)?;
        let required_bytes = checked_usize_add(
            table_bytes,
            self.cost_model.worst_case_cache_bytes(n),
            "dp state bytes",
        )?;
        ctx.check_memory_budget(required_bytes, "dp state")?;

        log::debug!(
            "partitioning n={n} segments={} min_segment_len={} cost_model={} table_bytes={table_bytes}",
            self.segments,
            self.min_segment_len,
            self.cost_model.name()
        );

        let mut warnings = vec![];
        if !series.is_x_non_decreasing() {
            log::warn!("x is not non-decreasing; segments follow index order, not x order");
            warnings.push(
                "x is not non-decreasing; segments follow index order and predict lookups may be ambiguous"
                    .to_string(),
            );
        }

        let started_at = Instant::now();
        let cache = self.cost_model.precompute(series)?;
        let layout = Layout {
            n,
            segments: self.segments,
            step: self.min_segment_len - 1,
        };
        let mut runtime = RuntimeStats::default();
        let sweep = run_sweep(&self.cost_model, &cache, layout, ctx, &mut runtime)?;

        let objective = sweep.objective[self.segments * n + n - 1];
        if !objective.is_finite() {
            log::debug!(
                "no feasible fit: degenerate_candidates={}",
                runtime.degenerate_candidates
            );
            return Err(PwlError::NoFeasibleFit {
                segments: self.segments,
            });
        }
        let breakpoints = backtrack(&sweep, layout)?;

        let runtime_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        ctx.record_scalar("fit.cost_evals", runtime.cost_evals as f64);
        ctx.record_scalar(
            "fit.candidates_considered",
            runtime.candidates_considered as f64,
        );
        ctx.record_scalar(
            "fit.degenerate_candidates",
            runtime.degenerate_candidates as f64,
        );
        ctx.record_scalar("fit.runtime_ms", runtime_ms as f64);
        ctx.report_progress(1.0);

        log::debug!(
            "partition done: objective={objective} breakpoints={breakpoints:?} cost_evals={} runtime_ms={runtime_ms}",
            runtime.cost_evals
        );

        #[cfg(feature = "rayon")]
        let thread_count = if runtime.used_parallel {
            Some(rayon::current_num_threads())
        } else {
            None
        };

        #[cfg(not(feature = "rayon"))]
        let thread_count = None;

        let notes = vec![
            format!("final_objective={objective}"),
            format!(
                "cost_evals={}, candidates_considered={}, degenerate_candidates={}",
                runtime.cost_evals, runtime.candidates_considered, runtime.degenerate_candidates
            ),
        ];

        let diagnostics = Diagnostics {
            n,
            segments: self.segments,
            min_segment_len: self.min_segment_len,
            runtime_ms: Some(runtime_ms),
            notes,
            warnings,
            algorithm: Cow::Borrowed("dp"),
            cost_model: Cow::Borrowed(self.cost_model.name()),
            repro_mode: ctx.repro_mode,
            thread_count,
            cost_evals: runtime.cost_evals,
            candidates_considered: runtime.candidates_considered,
            degenerate_candidates: runtime.degenerate_candidates,
            table_bytes: Some(table_bytes),
            ..Diagnostics::default()
        };

        Ok(Partition {
            breakpoints,
            objective,
            diagnostics,
        })
    }
}
