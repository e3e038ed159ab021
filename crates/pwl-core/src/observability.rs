// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Receives fractional progress updates in `[0.0, 1.0]`.
pub trait ProgressSink: Sync {
    fn on_progress(&self, fraction: f32);
}

/// Receives named scalar measurements emitted at the end of a fit.
pub trait TelemetrySink: Sync {
    fn record_scalar(&self, key: &'static str, value: f64);
}
