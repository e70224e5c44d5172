//! Best-effort resampling of every input layer onto a reference grid.
//!
//! A layer that fails to snap keeps its original path; only cancellation
//! and run-directory errors stop the stage.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::StageContext;
use crate::config::SnappingConfig;
use crate::error::AnalysisError;
use crate::layout::RunSubdir;
use crate::model::{replace_pathways, unique_pathways, Activity};
use crate::priority::PriorityCatalog;
use crate::services::AlignRequest;

/// Align one layer and restore its original no-data value.
///
/// Returns `Ok(None)` when any raster operation fails.
pub fn snap_layer(
    ctx: &StageContext<'_>,
    input: &Path,
    reference: &Path,
    subdir: RunSubdir,
    snapping: &SnappingConfig,
) -> Result<Option<PathBuf>, AnalysisError> {
    ctx.checkpoint()?;
    let backend = ctx.backend;

    let nodata = match backend.describe(input) {
        Ok(info) => info.nodata,
        Err(err) => {
            warn!("Could not read {} for snapping, keeping the original layer: {err}", input.display());
            return Ok(None);
        }
    };

    let (aligned_output, output) = ctx.layout.snapped_files(subdir, input)?;
    let request = AlignRequest {
        input,
        reference,
        extent: ctx.extent,
        output: &aligned_output,
        rescale_values: snapping.rescale_values,
        resampling: snapping.resampling,
    };

    let aligned = match backend.align(&request, ctx.feedback) {
        Ok(path) => path,
        Err(err) => {
            warn!("Problem snapping {}, keeping the original layer: {err}", input.display());
            return Ok(None);
        }
    };

    ctx.checkpoint()?;
    match backend.replace_nodata(&aligned, &output, nodata, ctx.feedback) {
        Ok(path) => Ok(Some(path)),
        Err(err) => {
            warn!("Problem restoring no-data on {}, keeping the original layer: {err}", aligned.display());
            Ok(None)
        }
    }
}

/// Snap pathways, their carbon layers and the activities' priority layers.
pub fn snap_analysis_data(
    ctx: &StageContext<'_>,
    activities: Vec<Activity>,
    catalog: &PriorityCatalog,
    reference: &Path,
    snapping: &SnappingConfig,
) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    let mut snapped_pathways = Vec::new();
    for pathway in unique_pathways(&activities) {
        ctx.checkpoint()?;

        info!("Snapping carbon layers from {} pathway", pathway.name);
        let mut carbon_paths = Vec::with_capacity(pathway.carbon_paths.len());
        for carbon in &pathway.carbon_paths {
            let snapped = snap_layer(ctx, carbon, reference, RunSubdir::SnappedCarbonLayers, snapping)?;
            carbon_paths.push(snapped.unwrap_or_else(|| carbon.clone()));
        }

        info!("Snapping {} pathway layer", pathway.name);
        let path = snap_layer(ctx, &pathway.path, reference, RunSubdir::SnappedPathways, snapping)?
            .unwrap_or_else(|| pathway.path.clone());

        snapped_pathways.push(pathway.with_carbon_paths(carbon_paths).with_path(path));
    }
    let activities = replace_pathways(activities, &snapped_pathways);

    let mut out = Vec::with_capacity(activities.len());
    for activity in activities {
        ctx.checkpoint()?;
        info!(
            "Snapping {} priority weighting layers from model {}",
            activity.priority_layers.len(),
            activity.name
        );

        let mut references = Vec::with_capacity(activity.priority_layers.len());
        for mut reference_layer in activity.priority_layers.clone() {
            let Some(path) = catalog.layer_path(&reference_layer).filter(|p| p.exists()) else {
                references.push(reference_layer);
                continue;
            };
            if let Some(snapped) = snap_layer(ctx, &path, reference, RunSubdir::SnappedPriorityLayers, snapping)? {
                reference_layer.path = Some(snapped);
            }
            references.push(reference_layer);
        }
        out.push(activity.with_priority_layers(references));
    }

    Ok(out)
}
