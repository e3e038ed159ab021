// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::PwlError;
use crate::observability::{ProgressSink, TelemetrySink};
use crate::repro::ReproMode;

/// Execution settings passed through a fit call.
///
/// Everything here tunes how a fit runs, never what it computes: two contexts
/// that differ only in sinks or parallelism produce identical models.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub repro_mode: ReproMode,
    pub memory_budget_bytes: Option<usize>,
    pub progress: Option<&'a dyn ProgressSink>,
    pub telemetry: Option<&'a dyn TelemetrySink>,
}

impl Default for ExecutionContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ExecutionContext<'a> {
    /// Creates a context with safe defaults and no optional hooks.
    pub fn new() -> Self {
        Self {
            repro_mode: ReproMode::Balanced,
            memory_budget_bytes: None,
            progress: None,
            telemetry: None,
        }
    }

    /// Sets the reproducibility mode.
    pub fn with_repro_mode(mut self, repro_mode: ReproMode) -> Self {
        self.repro_mode = repro_mode;
        self
    }

    /// Caps the bytes the partitioner may allocate for its tables.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Sets an optional progress sink.
    pub fn with_progress_sink(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets an optional telemetry sink.
    pub fn with_telemetry_sink(mut self, telemetry: &'a dyn TelemetrySink) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Fails with `ResourceLimit` when `required_bytes` exceeds the budget.
    pub fn check_memory_budget(&self, required_bytes: usize, what: &str) -> Result<(), PwlError> {
        if let Some(limit_bytes) = self.memory_budget_bytes
            && required_bytes > limit_bytes
        {
            return Err(PwlError::resource_limit(format!(
                "memory_budget_bytes exceeded for {what}: required_bytes={required_bytes}, limit_bytes={limit_bytes}; reduce the segment count or raise the budget"
            )));
        }
        Ok(())
    }

    /// Emits clamped progress to the sink, if configured.
    pub fn report_progress(&self, fraction: f32) {
        if !fraction.is_finite() {
            return;
        }

        if let Some(sink) = self.progress {
            sink.on_progress(fraction.clamp(0.0, 1.0));
        }
    }

    /// Emits a scalar telemetry value to the sink, if configured.
    pub fn record_scalar(&self, key: &'static str, value: f64) {
        if let Some(sink) = self.telemetry {
            sink.record_scalar(key, value);
        }
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("repro_mode", &self.repro_mode)
            .field("memory_budget_bytes", &self.memory_budget_bytes)
            .field("progress", &self.progress.is_some())
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}
