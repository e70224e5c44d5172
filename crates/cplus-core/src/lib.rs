//! Scenario analysis core: ranks competing activities per pixel by pushing
//! their pathway, carbon and priority-weighting rasters through a fixed
//! sequence of raster operations.
//!
//! Pixel math is delegated to a [`services::RasterBackend`]; this crate owns
//! the ordering, the expressions, the directory layout, cancellation and
//! progress reporting.

pub mod cancel;
pub mod config;
pub mod error;
pub mod expr;
pub mod extent;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod priority;
pub mod progress;
pub mod scenario;
pub mod services;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use config::{AnalysisConfig, Coefficients};
pub use error::AnalysisError;
pub use extent::SpatialExtent;
pub use pipeline::{AnalysisHandle, AnalysisState, ScenarioAnalysis};
pub use scenario::{Scenario, ScenarioResult};
