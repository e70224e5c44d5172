//! Sum each activity's rasters into one activity raster.

use tracing::info;

use super::StageContext;
use crate::error::AnalysisError;
use crate::layout::RunSubdir;
use crate::model::Activity;
use crate::services::{AggregateRequest, CellStatistic};

/// No-data value written by aggregation and the highest position analysis.
pub const OUTPUT_NODATA: f64 = -9999.0;

pub fn aggregate_activities(ctx: &StageContext<'_>, activities: Vec<Activity>) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    let mut out = Vec::with_capacity(activities.len());
    for activity in activities {
        ctx.checkpoint()?;

        let inputs = activity.aggregation_inputs();
        let Some(reference) = inputs.first() else {
            return Err(AnalysisError::MissingActivityLayer { activity: activity.name });
        };

        let output = ctx.layout.output_file(RunSubdir::ImplementationModels, &activity.name)?;
        let request = AggregateRequest {
            statistic: CellStatistic::Sum,
            inputs: &inputs,
            ignore_nodata: true,
            output_nodata: OUTPUT_NODATA,
            reference,
            extent: ctx.extent,
            output: &output,
        };
        info!("Used parameters for implementation models generation: {request:?}");

        ctx.checkpoint()?;
        let path = ctx.backend.aggregate(&request, ctx.feedback)?;
        out.push(activity.with_path(path));
    }
    Ok(out)
}
