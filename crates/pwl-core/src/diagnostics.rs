// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::repro::ReproMode;
use std::borrow::Cow;

/// Diagnostics schema version for fit metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Structured diagnostics captured from a fit.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub segments: usize,
    pub min_segment_len: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub algorithm: Cow<'static, str>,
    pub cost_model: Cow<'static, str>,
    pub repro_mode: ReproMode,
    pub thread_count: Option<usize>,
    pub cost_evals: usize,
    pub candidates_considered: usize,
    pub degenerate_candidates: usize,
    pub table_bytes: Option<usize>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            segments: 0,
            min_segment_len: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            algorithm: Cow::Borrowed(""),
            cost_model: Cow::Borrowed(""),
            repro_mode: ReproMode::Balanced,
            thread_count: None,
            cost_evals: 0,
            candidates_considered: 0,
            degenerate_candidates: 0,
            table_bytes: None,
        }
    }
}
