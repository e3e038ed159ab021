// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Reproducibility mode used to control determinism/performance trade-offs.
///
/// `Strict` switches prefix sums to compensated summation and keeps the
/// partitioner on its sequential path. `Balanced` uses plain sums and lets
/// the `rayon` feature parallelise wide rows.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReproMode {
    Strict,
    #[default]
    Balanced,
}

impl ReproMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
        }
    }
}
