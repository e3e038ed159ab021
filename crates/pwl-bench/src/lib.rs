// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Deterministic workloads shared by the benchmarks.

use pwl_core::{PwlError, SampleSeries};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// Uniform noise in `[-0.5, 0.5)`.
fn lcg_noise(state: &mut u64) -> f64 {
    (lcg_next(state) >> 11) as f64 / (1u64 << 53) as f64 - 0.5
}

/// Strictly increasing x with `pieces` slope regimes and seeded noise on y.
///
/// Slopes alternate sign so that every regime boundary is a real kink.
pub fn kinked_series(n: usize, pieces: usize, seed: u64) -> Result<SampleSeries, PwlError> {
    let pieces = pieces.max(1);
    let regime = n.div_ceil(pieces).max(1);
    let mut state = seed;
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut level = 0.0;

    for idx in 0..n {
        let piece = idx / regime;
        let slope = if piece % 2 == 0 {
            1.0 + piece as f64
        } else {
            -0.5 * piece as f64
        };
        if idx > 0 {
            level += slope;
        }
        x.push(idx as f64 + 0.25 * lcg_noise(&mut state));
        y.push(level + lcg_noise(&mut state));
    }

    // Jitter stays below half a step, so x remains increasing.
    SampleSeries::load(x, y)
}

#[cfg(test)]
mod tests {
    use super::kinked_series;

    #[test]
    fn kinked_series_is_sorted_and_repeatable() {
        let first = kinked_series(500, 4, 7).expect("series should load");
        let second = kinked_series(500, 4, 7).expect("series should load");
        assert_eq!(first.len(), 500);
        assert!(first.is_x_non_decreasing());
        assert_eq!(first.x(), second.x());
        assert_eq!(first.y(), second.y());
        let other = kinked_series(500, 4, 8).expect("series should load");
        assert_ne!(first.y(), other.y());
    }
}
