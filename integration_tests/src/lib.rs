//! Fixture helpers shared by the cross-crate tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use cplus_core::config::{AnalysisConfig, JsonSettings};
use cplus_core::model::{ActivityConfig, Pathway};
use cplus_core::progress::{NullSink, ProgressSink};
use cplus_core::{Scenario, ScenarioAnalysis, SpatialExtent};
use cplus_engine::{read_grid, write_grid, Grid, GridEngine};
use serde_json::{json, Value};
use uuid::Uuid;

pub const CRS: &str = "EPSG:32735";
pub const NODATA: f64 = -9999.0;

/// 10 m cells anchored at the origin.
pub fn extent_for(width: usize, height: usize) -> SpatialExtent {
    SpatialExtent::new(0.0, width as f64 * 10.0, 0.0, height as f64 * 10.0, CRS)
}

/// Write a `width`x`height` JSON grid (row-major, north row first).
pub fn write_layer(dir: &Path, name: &str, width: usize, height: usize, values: &[f32]) -> Result<PathBuf> {
    let grid = Grid::from_values(width, height, extent_for(width, height), Some(NODATA), values.to_vec())
        .with_context(|| format!("{} values do not fill a {width}x{height} grid", values.len()))?;
    let path = dir.join(format!("{name}.json"));
    write_grid(&grid, &path)?;
    Ok(path)
}

pub fn read_values(path: &Path) -> Result<Vec<Option<f64>>> {
    let grid = read_grid(path)?;
    Ok((0..grid.height)
        .flat_map(|row| (0..grid.width).map(move |col| (row, col)))
        .map(|(row, col)| grid.value(row, col))
        .collect())
}

pub fn pathway_activity(name: &str, pathways: Vec<Pathway>, style_pixel_value: i64) -> ActivityConfig {
    ActivityConfig {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        description: String::new(),
        path: None,
        pathways,
        priority_layers: Vec::new(),
        style_pixel_value,
    }
}

pub fn direct_activity(name: &str, path: PathBuf, style_pixel_value: i64) -> ActivityConfig {
    ActivityConfig {
        path: Some(path),
        ..pathway_activity(name, Vec::new(), style_pixel_value)
    }
}

pub fn scenario(extent: SpatialExtent, activities: Vec<ActivityConfig>) -> Scenario {
    Scenario {
        uuid: Uuid::new_v4(),
        name: "Integration scenario".to_string(),
        description: String::new(),
        extent,
        activities,
    }
}

/// Settings object with `base_dir` set, merged with `extra`.
pub fn settings(base_dir: &Path, extra: Value) -> Result<JsonSettings> {
    let mut value = json!({ "base_dir": base_dir.display().to_string() });
    if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), extra) {
        target.extend(extra);
    }
    Ok(JsonSettings::from_value(value)?)
}

pub fn analysis(scenario: Scenario, settings: &JsonSettings) -> ScenarioAnalysis {
    analysis_with_sink(scenario, settings, Arc::new(NullSink))
}

pub fn analysis_with_sink(
    scenario: Scenario,
    settings: &JsonSettings,
    sink: Arc<dyn ProgressSink>,
) -> ScenarioAnalysis {
    ScenarioAnalysis::new(scenario, AnalysisConfig::from_store(settings), Arc::new(GridEngine::new()), sink)
}
