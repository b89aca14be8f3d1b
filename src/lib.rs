//! Short-horizon forecasting of multi-channel climate series.
//!
//! A [`series::Series`] is split chronologically, standardized with the statistics of its train
//! split and cut into sliding windows by a [`window::WindowGenerator`]. A small dense
//! [`model::Forecaster`] is trained on the windows, scored per channel with
//! [`metrics::MultiMae`] and exported as a compressed half-precision artifact.

#![deny(unsafe_code, rust_2018_idioms, rust_2021_compatibility)]
#![warn(missing_docs)]

pub mod autodiff;
pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod optim;
pub mod record;
pub mod series;
pub mod tensor;
pub mod train;
pub mod window;

pub use error::{Error, Result};
