//! Bias each activity raster with its priority-weighting layers.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::StageContext;
use crate::error::AnalysisError;
use crate::expr::{Expr, LayerSet};
use crate::layout::RunSubdir;
use crate::model::Activity;
use crate::priority::{PriorityCatalog, ResolvedPriorityLayer};

#[derive(Debug, Clone, PartialEq)]
pub enum WeightingOutcome {
    /// Weighted clones of the activities that had priority layers.
    Weighted(Vec<Activity>),
    /// No activity had any priority layer; continue with the unweighted set.
    Skipped,
}

/// `activity + Σ coefficient * layer` over positive coefficients, plus the
/// input layers the expression references.
pub fn weighting_expression(activity_raster: &Path, priority_layers: &[ResolvedPriorityLayer]) -> (Expr, Vec<PathBuf>) {
    let mut layers = LayerSet::new();
    let mut terms = vec![layers.bind(activity_raster)];

    for layer in priority_layers {
        for &coefficient in layer.coefficients.iter().filter(|&&c| c > 0.0) {
            terms.push(Expr::scaled(coefficient, layers.bind(&layer.path)));
        }
    }

    (Expr::sum(terms), layers.into_paths())
}

pub fn weight_activities(
    ctx: &StageContext<'_>,
    activities: &[Activity],
    catalog: &PriorityCatalog,
) -> Result<WeightingOutcome, AnalysisError> {
    ctx.checkpoint()?;

    if activities.iter().all(|a| a.priority_layers.is_empty()) {
        info!("There are no defined priority layers in groups, skipping models weighting step");
        return Ok(WeightingOutcome::Skipped);
    }

    let mut weighted = Vec::new();
    for original in activities {
        ctx.checkpoint()?;
        let activity = original.clone();
        let raster = activity.require_path("weighting")?.to_path_buf();

        if activity.priority_layers.is_empty() {
            info!("There are no associated priority weighting layers for model {}", activity.name);
            continue;
        }

        let resolved: Vec<ResolvedPriorityLayer> = activity
            .priority_layers
            .iter()
            .filter_map(|reference| match catalog.resolve(reference) {
                Ok(layer) => Some(layer),
                Err(err) => {
                    warn!("{err}, skipping the layer from the model {} weighting", activity.name);
                    None
                }
            })
            .collect();

        let (expression, layers) = weighting_expression(&raster, &resolved);
        let output = ctx.layout.output_file(RunSubdir::WeightedModels, &activity.name)?;
        info!(
            "Used parameters for calculating weighting models: expression {expression}, extent {}, layers {layers:?}, output {}",
            ctx.extent,
            output.display()
        );

        ctx.checkpoint()?;
        let path = ctx.backend.evaluate(&expression, ctx.extent, &layers, &output, ctx.feedback)?;
        weighted.push(activity.with_path(path));
    }

    Ok(WeightingOutcome::Weighted(weighted))
}
