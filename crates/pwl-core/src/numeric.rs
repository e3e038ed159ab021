// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Prefix-sum primitives shared by the segment fitter.
//!
//! Every function returns `values.len() + 1` entries with a leading zero, so
//! the sum over the half-open range `[a, b)` is `out[b] - out[a]`.

/// Plain running sums.
pub fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() + 1);
    let mut acc = 0.0;
    out.push(acc);
    for &value in values {
        acc += value;
        out.push(acc);
    }
    out
}

/// Running sums with Kahan-Babuska (Neumaier) compensation.
pub fn prefix_sums_kahan(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() + 1);
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    out.push(0.0);
    for &value in values {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
        out.push(sum + compensation);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{prefix_sums, prefix_sums_kahan};

    #[test]
    fn prefix_sums_have_leading_zero_and_running_totals() {
        let out = prefix_sums(&[1.0, 2.0, 3.0]);
        assert_eq!(out, vec![0.0, 1.0, 3.0, 6.0]);
        assert_eq!(prefix_sums(&[]), vec![0.0]);
    }

    #[test]
    fn kahan_recovers_small_terms_lost_by_plain_summation() {
        let values = [1.0e16, 1.0, -1.0e16];
        assert_eq!(prefix_sums(&values)[3], 0.0);
        assert_eq!(prefix_sums_kahan(&values)[3], 1.0);
    }
}
