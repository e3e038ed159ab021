// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use pwl_core::{PwlError, SampleSeries};
use pwl_costs::{CostLeastSquares, CostModel, LeastSquaresCache};
use pwl_offline::{Continuity, FitConfig, PiecewiseLinearModel, fit, fit_with_config};

const MIN_PROPTEST_CASES: u32 = 1000;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn increasing_x(steps: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    steps
        .iter()
        .map(|step| {
            acc += step;
            acc
        })
        .collect()
}

fn series_from(x: Vec<f64>, y: Vec<f64>) -> SampleSeries {
    SampleSeries::load(x, y).expect("generated series should load")
}

fn assert_structure(model: &PiecewiseLinearModel, n: usize, k: usize, l: usize) {
    let bps = model.breakpoints();
    assert_eq!(bps.len(), k + 1, "expected {k} segments");
    assert_eq!(bps[0], 0);
    assert_eq!(bps[k], n - 1);
    for pair in bps.windows(2) {
        assert!(
            pair[1] - pair[0] + 1 >= l,
            "segment {pair:?} violates min_segment_len={l}"
        );
    }

    let stats = model.segment_stats();
    assert_eq!(stats.len(), k);
    for (idx, row) in stats.iter().enumerate() {
        assert_eq!(row.segment, idx + 1);
        assert_eq!(row.start_index, bps[idx]);
        assert_eq!(row.end_index, bps[idx + 1]);
        assert!(row.ssr >= 0.0);
        assert!(row.sst >= 0.0);
        assert!(
            row.r_squared <= 1.0 + 1e-12 || row.r_squared.is_nan(),
            "segment {} has r_squared={}",
            row.segment,
            row.r_squared
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn search(
    cost: &CostLeastSquares,
    cache: &LeastSquaresCache,
    start: usize,
    remaining: usize,
    n: usize,
    l: usize,
    acc: f64,
    best: &mut Option<f64>,
) {
    if remaining == 1 {
        if n - start >= l {
            let last = cost.segment_cost(cache, start, n - 1);
            if last.is_finite() {
                let total = acc + last;
                if best.is_none_or(|current| total < current) {
                    *best = Some(total);
                }
            }
        }
        return;
    }

    let mut end = start + l - 1;
    while end < n - 1 {
        let segment = cost.segment_cost(cache, start, end);
        if segment.is_finite() {
            search(cost, cache, end, remaining - 1, n, l, acc + segment, best);
        }
        end += 1;
    }
}

/// Minimum total cost over every admissible shared-breakpoint partition.
fn exhaustive_minimum(series: &SampleSeries, k: usize, l: usize) -> Option<f64> {
    let cost = CostLeastSquares::default();
    let cache = cost.precompute(series).expect("cache should build");
    let mut best = None;
    search(&cost, &cache, 0, k, series.len(), l, 0.0, &mut best);
    best
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn fitted_models_respect_structure_and_are_repeatable(
        steps in prop::collection::vec(0.1f64..3.0, 6..48),
        seed_y in prop::collection::vec(-20.0f64..20.0, 48),
        k in 1usize..6,
        l in 2usize..6,
    ) {
        let n = steps.len();
        prop_assume!(k * l <= n);

        let series = series_from(increasing_x(&steps), seed_y[..n].to_vec());
        let first = fit(&series, k, l).expect("fit should succeed on distinct x");
        let second = fit(&series, k, l).expect("refit should succeed");

        assert_structure(&first, n, k, l);
        prop_assert_eq!(first.breakpoints(), second.breakpoints());
        prop_assert_eq!(first.segments(), second.segments());
    }

    #[test]
    fn objective_matches_exhaustive_search(
        steps in prop::collection::vec(0.1f64..3.0, 4..12),
        seed_y in prop::collection::vec(-10.0f64..10.0, 12),
        k in 1usize..4,
        l in 2usize..4,
    ) {
        let n = steps.len();
        prop_assume!(k * l <= n);

        let series = series_from(increasing_x(&steps), seed_y[..n].to_vec());
        let model = fit(&series, k, l).expect("fit should succeed on distinct x");
        let best = exhaustive_minimum(&series, k, l).expect("distinct x always admits a fit");

        let tolerance = 1e-9 * (1.0 + best.abs());
        prop_assert!(
            (model.objective() - best).abs() <= tolerance,
            "dp objective {} differs from exhaustive minimum {}",
            model.objective(),
            best
        );
    }

    #[test]
    fn repeated_x_fails_only_when_every_partition_is_vertical(
        raw_x in prop::collection::vec(0u8..4, 4..12),
        seed_y in prop::collection::vec(-10.0f64..10.0, 12),
        k in 1usize..4,
        l in 2usize..4,
    ) {
        let n = raw_x.len();
        prop_assume!(k * l <= n);

        let mut sorted = raw_x.clone();
        sorted.sort_unstable();
        let x: Vec<f64> = sorted.iter().map(|&v| f64::from(v)).collect();
        let series = series_from(x, seed_y[..n].to_vec());

        match (fit(&series, k, l), exhaustive_minimum(&series, k, l)) {
            (Ok(model), Some(best)) => {
                assert_structure(&model, n, k, l);
                for pair in model.breakpoints().windows(2) {
                    prop_assert!(series.x()[pair[0]] < series.x()[pair[1]]);
                }
                let tolerance = 1e-9 * (1.0 + best.abs());
                prop_assert!((model.objective() - best).abs() <= tolerance);
            }
            (Err(err), None) => {
                prop_assert_eq!(err, PwlError::NoFeasibleFit { segments: k });
            }
            (got, expected) => {
                prop_assert!(false, "fit returned {got:?} but exhaustive search found {expected:?}");
            }
        }
    }

    #[test]
    fn breakpoint_queries_resolve_to_left_segment(
        steps in prop::collection::vec(0.1f64..3.0, 8..32),
        seed_y in prop::collection::vec(-20.0f64..20.0, 32),
        k in 2usize..5,
    ) {
        let n = steps.len();
        prop_assume!(k * 2 <= n);

        let series = series_from(increasing_x(&steps), seed_y[..n].to_vec());
        let model = fit(&series, k, 2).expect("fit should succeed");
        for (idx, &b) in model.breakpoints()[1..k].iter().enumerate() {
            let at = series.x()[b];
            let predicted = model.predict_one(at).expect("predict should succeed");
            prop_assert_eq!(predicted, model.segments()[idx].eval(at));
        }
    }

    #[test]
    fn joined_fit_is_continuous_and_keeps_breakpoints(
        steps in prop::collection::vec(0.1f64..3.0, 8..32),
        seed_y in prop::collection::vec(-20.0f64..20.0, 32),
        k in 2usize..5,
    ) {
        let n = steps.len();
        prop_assume!(k * 2 <= n);

        let series = series_from(increasing_x(&steps), seed_y[..n].to_vec());
        let independent = fit(&series, k, 2).expect("independent fit should succeed");
        let joined = fit_with_config(
            &series,
            &FitConfig::new(k, 2).with_continuity(Continuity::Joined),
            &Default::default(),
        )
        .expect("joined fit should succeed");

        prop_assert_eq!(independent.breakpoints(), joined.breakpoints());
        for (pair, &b) in joined.segments().windows(2).zip(&joined.breakpoints()[1..k]) {
            let at = series.x()[b];
            let gap = (pair[0].eval(at) - pair[1].eval(at)).abs();
            let scale = 1.0 + pair[0].eval(at).abs();
            prop_assert!(gap <= 1e-6 * scale, "gap {gap} at x={at}");
        }
    }
}
