//! Peak detection and quantal analysis of multi-ROI fluorescence recordings.
//!
//! Traces flow from a [`data::Dataset`] through optional baseline removal and
//! smoothing ([`baseline`]), automatic or manual peak detection
//! ([`peak_detection`]) into [`data::Results`], then into amplitude histograms
//! ([`histogram`]) and a multi-Gaussian fit of the quantal size ([`quantal`]).
pub mod baseline;
pub mod data;
pub mod error;
pub mod export;
pub mod grouping;
pub mod histogram;
pub mod loader;
pub mod parameters;
pub mod peak_detection;
pub mod processing;
pub mod quantal;
pub mod utils;

pub use quantal_common::{Real, Time};
