//! Min-max normalization, applied to pathways and again to activities.
//!
//! ```text
//! normalized = k * (value - min) / (max - min)    k = carbon coefficient + suitability index
//! normalized =     (value - min) / (max - min)    when k <= 0
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::StageContext;
use crate::config::Coefficients;
use crate::error::AnalysisError;
use crate::expr::{layer_alias, Expr};
use crate::layout::RunSubdir;
use crate::model::{replace_pathways, unique_pathways, Activity};
use crate::services::BandStatistics;

pub fn normalization_expression(raster: &Path, stats: &BandStatistics, normalization_index: f64) -> Expr {
    let scaled = Expr::layer(layer_alias(raster))
        .minus(Expr::constant(stats.min))
        .divided_by(Expr::constant(stats.max).minus(Expr::constant(stats.min)));
    if normalization_index > 0.0 {
        Expr::scaled(normalization_index, scaled)
    } else {
        scaled
    }
}

fn normalize_raster(
    ctx: &StageContext<'_>,
    raster: &Path,
    name: &str,
    subdir: RunSubdir,
    coefficients: Coefficients,
) -> Result<PathBuf, AnalysisError> {
    let stats = ctx.backend.band_statistics(raster)?;
    if stats.is_empty() {
        warn!("{name} has no valid pixels, keeping it unnormalized");
        return Ok(raster.to_path_buf());
    }
    info!("Found minimum {} and maximum {} for {name}", stats.min, stats.max);

    if stats.max < stats.min {
        return Err(AnalysisError::InvalidStatistics {
            layer: name.to_string(),
            min: stats.min,
            max: stats.max,
        });
    }

    let expression = normalization_expression(raster, &stats, coefficients.normalization_index());
    let output = ctx.layout.output_file(subdir, name)?;
    info!(
        "Used parameters for normalization of {name}: expression {expression}, extent {}, output {}",
        ctx.extent,
        output.display()
    );

    ctx.checkpoint()?;
    let layers = [raster.to_path_buf()];
    Ok(ctx.backend.evaluate(&expression, ctx.extent, &layers, &output, ctx.feedback)?)
}

pub fn normalize_pathways(
    ctx: &StageContext<'_>,
    activities: Vec<Activity>,
    coefficients: Coefficients,
) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    let mut normalized = Vec::new();
    for pathway in unique_pathways(&activities) {
        ctx.checkpoint()?;
        let path = normalize_raster(ctx, &pathway.path, &pathway.name, RunSubdir::NormalizedPathways, coefficients)?;
        normalized.push(pathway.with_path(path));
    }

    Ok(replace_pathways(activities, &normalized))
}

pub fn normalize_activities(
    ctx: &StageContext<'_>,
    activities: Vec<Activity>,
    coefficients: Coefficients,
) -> Result<Vec<Activity>, AnalysisError> {
    ctx.checkpoint()?;

    let mut out = Vec::with_capacity(activities.len());
    for activity in activities {
        ctx.checkpoint()?;
        let raster = activity.require_path("models normalization")?.to_path_buf();
        let path = normalize_raster(ctx, &raster, &activity.name, RunSubdir::NormalizedModels, coefficients)?;
        out.push(activity.with_path(path));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(min: f64, max: f64) -> BandStatistics {
        BandStatistics { min, max, mean: (min + max) / 2.0, valid_count: 4 }
    }

    #[test]
    fn zero_index_is_pure_min_max_scaling() {
        let expr = normalization_expression(Path::new("/n/model.tif"), &stats(2.0, 10.0), 0.0);
        assert_eq!(expr.to_string(), r#"("model@1" - 2) / (10 - 2)"#);
    }

    #[test]
    fn positive_index_scales_the_result() {
        let expr = normalization_expression(Path::new("/n/model.tif"), &stats(0.0, 4.0), 1.5);
        assert_eq!(expr.to_string(), r#"1.5 * (("model@1" - 0) / (4 - 0))"#);
    }
}
