// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod numeric;
pub mod observability;
pub mod repro;
pub mod sample_series;

pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
pub use error::{PwlError, Result};
pub use execution_context::ExecutionContext;
pub use numeric::{prefix_sums, prefix_sums_kahan};
pub use observability::{ProgressSink, TelemetrySink};
pub use repro::ReproMode;
pub use sample_series::SampleSeries;
