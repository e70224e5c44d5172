//! Terminal stage: per pixel, the rank of the highest-scoring activity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::aggregate::OUTPUT_NODATA;
use super::StageContext;
use crate::error::AnalysisError;
use crate::expr::layer_alias;
use crate::extent::DEFAULT_CRS;
use crate::model::Activity;
use crate::services::RankRequest;

/// Stable sort by the current `style_pixel_value`, then renumber 1..=n.
pub fn assign_ranks(mut activities: Vec<Activity>) -> Vec<Activity> {
    activities.sort_by_key(|a| a.style_pixel_value);
    for (index, activity) in activities.iter_mut().enumerate() {
        activity.style_pixel_value = index as i64 + 1;
    }
    activities
}

/// Raster each activity contributes, keyed by activity name.
fn layer_map(activities: &[Activity]) -> (HashMap<&str, &Path>, Option<&Path>) {
    let mut layers = HashMap::new();
    let mut first = None;
    for activity in activities {
        let raster = activity
            .path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| activity.pathways().last().map(|p| p.path.as_path()));
        if let Some(raster) = raster {
            first.get_or_insert(raster);
            layers.insert(activity.name.as_str(), raster);
        }
    }
    (layers, first)
}

/// Rasters in rank order, skipping activities without a resolved layer.
pub fn ranked_sources(weighted: &[Activity], ranked: &[Activity]) -> Vec<PathBuf> {
    let (layers, _) = layer_map(weighted);
    ranked
        .iter()
        .filter_map(|activity| layers.get(activity.name.as_str()).map(|p| p.to_path_buf()))
        .collect()
}

/// Returns the ranked activities and the scenario decision raster.
pub fn select_highest_position(
    ctx: &StageContext<'_>,
    weighted: Vec<Activity>,
    output: &Path,
) -> Result<(Vec<Activity>, PathBuf), AnalysisError> {
    ctx.checkpoint()?;

    let (_, first) = layer_map(&weighted);
    let reference = first.ok_or(AnalysisError::NoRankInputs)?.to_path_buf();

    let ranked = assign_ranks(weighted.clone());
    let sources = ranked_sources(&weighted, &ranked);
    info!(
        "Layers sources {:?}",
        sources.iter().map(|s| layer_alias(s)).collect::<Vec<_>>()
    );

    let crs = match ctx.backend.describe(&reference) {
        Ok(info) => info.extent.crs,
        Err(err) => {
            warn!("Could not read the CRS of {}, assuming {DEFAULT_CRS}: {err}", reference.display());
            DEFAULT_CRS.to_string()
        }
    };
    let extent = ctx.extent.clone().with_crs(crs);

    let request = RankRequest {
        inputs: &sources,
        ignore_nodata: true,
        output_nodata: OUTPUT_NODATA,
        reference: &reference,
        extent: &extent,
        output,
    };
    info!("Used parameters for highest position analysis {request:?}");

    ctx.checkpoint()?;
    let result = ctx.backend.highest_position(&request, ctx.feedback)?;
    Ok((ranked, result))
}
