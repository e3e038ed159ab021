// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pwl_core::PwlError;

const DEFAULT_SEGMENTS: usize = 3;
const DEFAULT_MIN_SEGMENT_LEN: usize = 2;

/// How segment lines relate at a shared breakpoint.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Continuity {
    /// Each segment carries its own least-squares line.
    #[default]
    Independent,
    /// Lines are refitted jointly so adjacent segments meet at the breakpoint x.
    Joined,
}

impl Continuity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Independent => "independent",
            Self::Joined => "joined",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PwlError> {
        match raw.to_ascii_lowercase().as_str() {
            "independent" => Ok(Self::Independent),
            "joined" | "continuous" => Ok(Self::Joined),
            _ => Err(PwlError::invalid_input(format!(
                "invalid continuity '{raw}'; expected one of: independent, joined"
            ))),
        }
    }
}

/// What `predict` does with queries outside `[x_min, x_max]`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DomainPolicy {
    /// Extend the nearest boundary segment's line.
    #[default]
    Extrapolate,
    /// Fail with `OutOfDomain`.
    Strict,
}

/// Parameters of one fit.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct FitConfig {
    /// Number of segments K.
    pub segments: usize,
    /// Minimum number of samples per segment L, shared breakpoints included.
    pub min_segment_len: usize,
    pub continuity: Continuity,
    pub domain: DomainPolicy,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            segments: DEFAULT_SEGMENTS,
            min_segment_len: DEFAULT_MIN_SEGMENT_LEN,
            continuity: Continuity::default(),
            domain: DomainPolicy::default(),
        }
    }
}

impl FitConfig {
    pub fn new(segments: usize, min_segment_len: usize) -> Self {
        Self {
            segments,
            min_segment_len,
            ..Self::default()
        }
    }

    pub fn with_continuity(mut self, continuity: Continuity) -> Self {
        self.continuity = continuity;
        self
    }

    pub fn with_domain(mut self, domain: DomainPolicy) -> Self {
        self.domain = domain;
        self
    }

    /// Checks the parameters that do not depend on the series length.
    pub fn validate(&self) -> Result<(), PwlError> {
        if self.segments == 0 {
            return Err(PwlError::infeasible("segments must be >= 1; got 0"));
        }
        if self.min_segment_len < 2 {
            return Err(PwlError::infeasible(format!(
                "min_segment_len must be >= 2; got {}",
                self.min_segment_len
            )));
        }
        Ok(())
    }

    /// Checks that `n` samples can hold `segments` segments of `min_segment_len`.
    pub fn check_feasible(&self, n: usize) -> Result<(), PwlError> {
        self.validate()?;

        let k = self.segments;
        let l = self.min_segment_len;
        if k > n.saturating_sub(1) {
            return Err(PwlError::infeasible(format!(
                "segments={k} exceeds n-1={} for n={n}",
                n.saturating_sub(1)
            )));
        }
        match k.checked_mul(l) {
            Some(required) if required <= n => Ok(()),
            _ => Err(PwlError::infeasible(format!(
                "segments*min_segment_len={k}*{l} exceeds n={n}"
            ))),
        }
    }
}
