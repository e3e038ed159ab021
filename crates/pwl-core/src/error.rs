// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, PwlError>;

/// Errors produced while loading a series, fitting a model, or predicting.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum PwlError {
    /// Fewer than two samples were supplied.
    #[error("series must contain at least 2 points; got {got}")]
    EmptySeries { got: usize },

    /// A sample is not a finite number.
    #[error("non-numeric data in column '{column}' at index {index}")]
    NonNumericData { column: &'static str, index: usize },

    /// Malformed input that is not covered by a more specific variant.
    #[error("{0}")]
    InvalidInput(String),

    /// A segment range holds too few points for a line fit.
    #[error("segment [{start}, {end}] has {len} point(s); at least 2 are required")]
    InsufficientPoints { start: usize, end: usize, len: usize },

    /// All x values in a segment range coincide, so no slope is defined.
    #[error("segment [{start}, {end}] has zero x-variance; a vertical segment has no slope")]
    DegenerateSegment { start: usize, end: usize },

    /// The requested segment count and minimum length cannot be met.
    #[error("{0}")]
    InfeasibleConstraints(String),

    /// Every feasible partition contains a degenerate segment.
    #[error("no feasible fit: every partition into {segments} segment(s) contains a degenerate segment")]
    NoFeasibleFit { segments: usize },

    /// A strict-mode prediction fell outside the fitted x-domain.
    #[error("query x={query} lies outside the fitted domain [{x_min}, {x_max}]")]
    OutOfDomain { query: f64, x_min: f64, x_max: f64 },

    #[error("{0}")]
    NumericalIssue(String),

    #[error("{0}")]
    ResourceLimit(String),
}

impl PwlError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn infeasible(msg: impl Into<String>) -> Self {
        Self::InfeasibleConstraints(msg.into())
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    /// Stable machine-readable code for structured error output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptySeries { .. } => "empty_series",
            Self::NonNumericData { .. } => "non_numeric_data",
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::DegenerateSegment { .. } => "degenerate_segment",
            Self::InfeasibleConstraints(_) => "infeasible_constraints",
            Self::NoFeasibleFit { .. } => "no_feasible_fit",
            Self::OutOfDomain { .. } => "out_of_domain",
            Self::NumericalIssue(_) => "numerical_issue",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }

    /// True for errors caused by the shape or content of the input series.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptySeries { .. } | Self::NonNumericData { .. } | Self::InvalidInput(_)
        )
    }
}
