// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use pwl_core::{ReproMode, SampleSeries};
use pwl_costs::{CostLeastSquares, CostModel, fit_direct};

const MIN_PROPTEST_CASES: u32 = 1000;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn close(lhs: f64, rhs: f64, scale: f64) -> bool {
    (lhs - rhs).abs() <= 1e-6 * (1.0 + scale)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn cached_fit_agrees_with_two_pass_fit(
        steps in prop::collection::vec(0.5f64..5.0, 2..64),
        seed_y in prop::collection::vec(-100.0f64..100.0, 64),
        offset in -1.0e6f64..1.0e6,
        start_frac in 0.0f64..1.0,
        len_frac in 0.0f64..1.0,
    ) {
        let n = steps.len();
        let mut acc = offset;
        let x: Vec<f64> = steps.iter().map(|step| { acc += step; acc }).collect();
        let series = SampleSeries::load(x, seed_y[..n].to_vec()).expect("series should load");

        let start = ((n - 2) as f64 * start_frac) as usize;
        let end = start + 1 + ((n - 2 - start) as f64 * len_frac) as usize;

        for mode in [ReproMode::Strict, ReproMode::Balanced] {
            let cost = CostLeastSquares::new(mode);
            let cache = cost.precompute(&series).expect("cache should build");
            let cached = cost.fit(&cache, start, end).expect("distinct x should fit");
            let direct = fit_direct(&series, start, end).expect("distinct x should fit");

            prop_assert!(cached.ssr >= 0.0);
            prop_assert!(direct.ssr >= 0.0);
            prop_assert!(direct.ssr <= direct.sst * (1.0 + 1e-9) + 1e-9);
            prop_assert!(close(cached.slope, direct.slope, direct.slope.abs()));
            prop_assert!(close(cached.ssr, direct.ssr, direct.sst));
            prop_assert!(close(cached.sst, direct.sst, direct.sst));
            prop_assert_eq!(cost.segment_cost(&cache, start, end), cached.ssr);
        }
    }

    #[test]
    fn constant_x_ranges_cost_infinity(
        raw_x in prop::collection::vec(0u8..3, 2..32),
        seed_y in prop::collection::vec(-10.0f64..10.0, 32),
    ) {
        let n = raw_x.len();
        let mut sorted = raw_x.clone();
        sorted.sort_unstable();
        let x: Vec<f64> = sorted.iter().map(|&v| f64::from(v)).collect();
        let series = SampleSeries::load(x.clone(), seed_y[..n].to_vec()).expect("series should load");

        let cost = CostLeastSquares::default();
        let cache = cost.precompute(&series).expect("cache should build");
        for start in 0..n - 1 {
            for end in start + 1..n {
                let vertical = x[start] == x[end];
                let value = cost.segment_cost(&cache, start, end);
                prop_assert_eq!(value.is_infinite(), vertical, "range [{}, {}]", start, end);
                prop_assert_eq!(fit_direct(&series, start, end).is_err(), vertical);
            }
        }
    }
}
