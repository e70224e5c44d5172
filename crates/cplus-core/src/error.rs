use std::path::PathBuf;

use thiserror::Error;

use crate::services::ServiceError;

/// Run-level failure taxonomy.
///
/// `Cancelled` is not a failure: it lets every stage unwind with `?` as soon
/// as the cancellation flag is observed, and the controller maps it to the
/// `Cancelled` state without recording it as the run error.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no base directory configured for scenario outputs")]
    MissingBaseDir,

    #[error("no defined pathways or activity layer for the activity {activity}")]
    MissingActivityLayer { activity: String },

    #[error("there is no map layer for the activity {activity} at the {stage} stage")]
    MissingStageRaster { activity: String, stage: &'static str },

    #[error("{layer} contains invalid band statistics: maximum {max} is below minimum {min}")]
    InvalidStatistics { layer: String, min: f64, max: f64 },

    #[error("no weighted activity rasters are available for the highest position analysis")]
    NoRankInputs,

    #[error("could not create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Service(ServiceError),

    #[error("could not start the analysis worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("analysis worker terminated unexpectedly")]
    WorkerPanicked,

    #[error("processing has been cancelled by the user")]
    Cancelled,
}

impl From<ServiceError> for AnalysisError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Cancelled => AnalysisError::Cancelled,
            other => AnalysisError::Service(other),
        }
    }
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_service_call_cancels_the_run() {
        let err: AnalysisError = ServiceError::Cancelled.into();
        assert!(err.is_cancelled());

        let err: AnalysisError = ServiceError::NoInputs { operation: "aggregate" }.into();
        assert!(matches!(err, AnalysisError::Service(ServiceError::NoInputs { .. })));
    }
}
