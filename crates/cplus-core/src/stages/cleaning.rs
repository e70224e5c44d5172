//! Turn zero-valued pixels of the weighted rasters into no-data.
//!
//! A single-input sum with an output no-data value of `0` does exactly
//! that; zero carries no meaning as a score.

use tracing::info;

use super::StageContext;
use crate::error::AnalysisError;
use crate::model::Activity;
use crate::services::{AggregateRequest, CellStatistic};

pub fn clean_activities(ctx: &StageContext<'_>, activities: Vec<Activity>) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    let mut out = Vec::with_capacity(activities.len());
    for activity in activities {
        ctx.checkpoint()?;

        let inputs = vec![activity.require_path("cleaning")?.to_path_buf()];
        let output = ctx.layout.cleaned_output_file(&activity.name)?;
        let request = AggregateRequest {
            statistic: CellStatistic::Sum,
            inputs: &inputs,
            ignore_nodata: true,
            output_nodata: 0.0,
            reference: &inputs[0],
            extent: ctx.extent,
            output: &output,
        };
        info!("Used parameters for updates on the weighted implementation models: {request:?}");

        ctx.checkpoint()?;
        let path = ctx.backend.aggregate(&request, ctx.feedback)?;
        out.push(activity.with_path(path));
    }
    Ok(out)
}
