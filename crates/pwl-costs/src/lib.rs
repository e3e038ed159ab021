// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod least_squares;
pub mod model;

pub use least_squares::{CostLeastSquares, LeastSquaresCache, LineFit, fit_direct};
pub use model::CostModel;
