//! Merge each pathway with its carbon layers into one raster.

use std::path::PathBuf;

use tracing::info;

use super::StageContext;
use crate::config::Coefficients;
use crate::error::AnalysisError;
use crate::expr::{Expr, LayerSet};
use crate::layout::RunSubdir;
use crate::model::{replace_pathways, unique_pathways, Activity, Pathway};

/// Weighted sum of a pathway raster and its carbon layers.
///
/// `carbon_layers` are the carbon rasters that exist on disk; the average
/// divides by the number of carbon layers configured on the pathway. The
/// carbon term is only present for a positive carbon coefficient. Returns
/// the expression and the input layers it references.
pub fn combination_expression(
    pathway: &Pathway,
    carbon_layers: &[PathBuf],
    coefficients: Coefficients,
) -> (Expr, Vec<PathBuf>) {
    let mut layers = LayerSet::new();
    let base = layers.bind(&pathway.path);
    let mut terms = vec![if coefficients.suitability_index > 0.0 {
        Expr::scaled(coefficients.suitability_index, base)
    } else {
        base
    }];

    if coefficients.carbon_coefficient > 0.0 {
        match carbon_layers {
            [] => {}
            [single] => terms.push(Expr::scaled(coefficients.carbon_coefficient, layers.bind(single))),
            many => {
                let total = Expr::sum(many.iter().map(|p| layers.bind(p)).collect());
                let average = total.divided_by(Expr::constant(pathway.carbon_paths.len() as f64));
                terms.push(Expr::scaled(coefficients.carbon_coefficient, average));
            }
        }
    }

    (Expr::sum(terms), layers.into_paths())
}

pub fn combine_pathways(
    ctx: &StageContext<'_>,
    activities: Vec<Activity>,
    coefficients: Coefficients,
) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    if coefficients.carbon_coefficient <= 0.0 && coefficients.suitability_index <= 0.0 {
        info!("Carbon coefficient and suitability index are both zero, skipping pathway combination");
        return Ok(activities);
    }

    let mut combined = Vec::new();
    for pathway in unique_pathways(&activities) {
        ctx.checkpoint()?;
        if pathway.carbon_paths.is_empty() {
            continue;
        }

        let carbon_layers: Vec<PathBuf> = pathway.carbon_paths.iter().filter(|p| p.exists()).cloned().collect();
        let (expression, layers) = combination_expression(&pathway, &carbon_layers, coefficients);

        let output = ctx.layout.output_file(RunSubdir::PathwaysCarbonLayers, &pathway.name)?;
        info!(
            "Used parameters for combining pathways and carbon layers generation: expression {expression}, extent {}, layers {layers:?}, output {}",
            ctx.extent,
            output.display()
        );

        ctx.checkpoint()?;
        let result = ctx.backend.evaluate(&expression, ctx.extent, &layers, &output, ctx.feedback)?;
        combined.push(pathway.with_path(result));
    }

    Ok(replace_pathways(activities, &combined))
}
