//! Scenario pipeline stages, in execution order:
//! snapping → combination → pathway normalization → aggregation →
//! activity normalization → weighting → cleaning → highest position.
//!
//! Every stage polls cancellation on entry, at the top of each per-item
//! iteration and right before each raster operation, so a cancelled run
//! never launches another operation.
pub mod aggregate;
pub mod cleaning;
pub mod combine;
pub mod highest_position;
pub mod normalize;
pub mod snapping;
pub mod weighting;

use crate::error::AnalysisError;
use crate::extent::SpatialExtent;
use crate::layout::RunLayout;
use crate::progress::Feedback;
use crate::services::RasterBackend;

/// What a stage needs from the controller.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub backend: &'a dyn RasterBackend,
    pub layout: &'a RunLayout,
    pub extent: &'a SpatialExtent,
    pub feedback: &'a Feedback,
}

impl StageContext<'_> {
    pub fn checkpoint(&self) -> Result<(), AnalysisError> {
        if self.feedback.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
