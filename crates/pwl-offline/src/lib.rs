// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod config;
pub mod fit;
mod joined;
pub mod model;
pub mod partition;

pub use config::{Continuity, DomainPolicy, FitConfig};
pub use fit::{fit, fit_with_config};
pub use model::{PiecewiseLinearModel, Segment, SegmentStats, r_squared};
pub use partition::{Partition, Partitioner};
