use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extent::SpatialExtent;
use crate::model::ActivityConfig;

/// A scenario as submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub extent: SpatialExtent,
    pub activities: Vec<ActivityConfig>,
}

/// Output record binding a scenario to its run directory and final raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_uuid: Uuid,
    pub scenario_name: String,
    pub scenario_directory: PathBuf,
    pub analysis_output: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_deserializes_with_defaults() {
        let json = r#"{
            "name": "Bushbuckridge",
            "extent": {"xmin": 30.0, "xmax": 31.5, "ymin": -25.0, "ymax": -24.0},
            "activities": [
                {"name": "Agroforestry", "path": "/data/agroforestry.tif"},
                {"name": "Grassland", "pathways": [
                    {"name": "Restore grassland", "path": "/data/grass.tif", "carbon_paths": ["/data/soc.tif"]}
                ], "priority_layers": [{"uuid": "0e7bb0a2-54b4-4a52-9c4d-4b0f8e0b3d11", "name": "biodiversity"}]}
            ]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();

        assert_eq!(scenario.extent.crs, crate::extent::DEFAULT_CRS);
        assert_eq!(scenario.activities.len(), 2);
        assert_eq!(scenario.activities[1].pathways[0].carbon_paths.len(), 1);
        assert_eq!(scenario.activities[1].priority_layers[0].name, "biodiversity");
    }
}
