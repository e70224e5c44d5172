//! Activities ("implementation models") and their pathways.
//!
//! Records are treated as values: a stage takes the activities it is given
//! and returns new records pointing at the rasters it produced, so two
//! stages never observe half-updated state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::priority::PriorityLayerRef;

/// One data source contributing to an activity, with optional carbon layers.
///
/// A pathway read without a uuid carries the nil uuid until
/// [`validate_activities`] assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    #[serde(default = "Uuid::nil")]
    pub uuid: Uuid,
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub carbon_paths: Vec<PathBuf>,
}

impl Pathway {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            carbon_paths: Vec::new(),
        }
    }

    pub fn with_carbon_paths(mut self, carbon_paths: Vec<PathBuf>) -> Self {
        self.carbon_paths = carbon_paths;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    fn same_record(&self, other: &Pathway) -> bool {
        self.name == other.name && self.path == other.path && self.carbon_paths == other.carbon_paths
    }
}

/// An activity exactly as the user configured it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub pathways: Vec<Pathway>,
    #[serde(default)]
    pub priority_layers: Vec<PriorityLayerRef>,
    #[serde(default)]
    pub style_pixel_value: i64,
}

/// Where an activity's score comes from, resolved once at validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivitySource {
    DirectLayer(PathBuf),
    /// Pathway rasters, plus a direct layer when one was also configured.
    PathwaySet {
        pathways: Vec<Pathway>,
        layer: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub uuid: Uuid,
    pub name: String,
    pub source: ActivitySource,
    pub priority_layers: Vec<PriorityLayerRef>,
    /// Output ordering rank, reassigned by the highest position stage.
    pub style_pixel_value: i64,
    /// Raster produced by the latest activity-level stage.
    pub path: Option<PathBuf>,
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

impl TryFrom<ActivityConfig> for Activity {
    type Error = AnalysisError;

    fn try_from(config: ActivityConfig) -> Result<Self, Self::Error> {
        let layer = non_empty(config.path);
        let source = match (layer, config.pathways.is_empty()) {
            (layer, false) => ActivitySource::PathwaySet { pathways: config.pathways, layer },
            (Some(layer), true) => ActivitySource::DirectLayer(layer),
            (None, true) => return Err(AnalysisError::MissingActivityLayer { activity: config.name }),
        };

        Ok(Activity {
            uuid: config.uuid,
            name: config.name,
            source,
            priority_layers: config.priority_layers,
            style_pixel_value: config.style_pixel_value,
            path: None,
        })
    }
}

impl Activity {
    pub fn pathways(&self) -> &[Pathway] {
        match &self.source {
            ActivitySource::DirectLayer(_) => &[],
            ActivitySource::PathwaySet { pathways, .. } => pathways,
        }
    }

    pub fn direct_layer(&self) -> Option<&Path> {
        match &self.source {
            ActivitySource::DirectLayer(layer) => Some(layer.as_path()),
            ActivitySource::PathwaySet { layer, .. } => layer.as_deref(),
        }
    }

    /// Direct layer first, then every pathway raster.
    pub fn aggregation_inputs(&self) -> Vec<PathBuf> {
        self.direct_layer()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(self.pathways().iter().map(|p| p.path.clone()))
            .collect()
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_priority_layers(mut self, priority_layers: Vec<PriorityLayerRef>) -> Self {
        self.priority_layers = priority_layers;
        self
    }

    fn with_pathways(mut self, updated: &HashMap<Uuid, Pathway>) -> Self {
        if let ActivitySource::PathwaySet { pathways, .. } = &mut self.source {
            for pathway in pathways.iter_mut() {
                if let Some(replacement) = updated.get(&pathway.uuid) {
                    *pathway = replacement.clone();
                }
            }
        }
        self
    }

    /// The current stage raster, or a `MissingStageRaster` error.
    pub fn require_path(&self, stage: &'static str) -> Result<&Path, AnalysisError> {
        self.path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| AnalysisError::MissingStageRaster {
                activity: self.name.clone(),
                stage,
            })
    }
}

/// Validate every configured activity.
///
/// Pathways configured without a uuid get one here; identical records
/// (same name, path and carbon layers) share it, so a pathway listed under
/// several activities is processed once.
pub fn validate_activities(configs: &[ActivityConfig]) -> Result<Vec<Activity>, AnalysisError> {
    let mut assigned: Vec<Pathway> = Vec::new();
    configs
        .iter()
        .cloned()
        .map(|mut config| {
            for pathway in config.pathways.iter_mut().filter(|p| p.uuid.is_nil()) {
                let known = assigned.iter().find(|known| known.same_record(pathway)).map(|known| known.uuid);
                match known {
                    Some(uuid) => pathway.uuid = uuid,
                    None => {
                        pathway.uuid = Uuid::new_v4();
                        assigned.push(pathway.clone());
                    }
                }
            }
            Activity::try_from(config)
        })
        .collect()
}

/// Every pathway across `activities`, once each, in first-seen order.
pub fn unique_pathways(activities: &[Activity]) -> Vec<Pathway> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for pathway in activities.iter().flat_map(Activity::pathways) {
        if !seen.contains(&pathway.uuid) {
            seen.push(pathway.uuid);
            out.push(pathway.clone());
        }
    }
    out
}

/// Replace pathway records (matched by uuid) inside every activity.
pub fn replace_pathways(activities: Vec<Activity>, updated: &[Pathway]) -> Vec<Activity> {
    let by_id: HashMap<Uuid, Pathway> = updated.iter().map(|p| (p.uuid, p.clone())).collect();
    activities.into_iter().map(|a| a.with_pathways(&by_id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, path: Option<&str>, pathways: Vec<Pathway>) -> ActivityConfig {
        ActivityConfig {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            path: path.map(PathBuf::from),
            pathways,
            priority_layers: Vec::new(),
            style_pixel_value: 0,
        }
    }

    #[test]
    fn activity_without_any_layer_is_rejected() {
        let err = Activity::try_from(config("Agroforestry", None, vec![])).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingActivityLayer { ref activity } if activity == "Agroforestry"));
    }

    #[test]
    fn empty_path_counts_as_absent() {
        assert!(Activity::try_from(config("Empty", Some(""), vec![])).is_err());
    }

    #[test]
    fn direct_layer_and_pathways_are_both_aggregated() {
        let pathway = Pathway::new("Restore", "/p/restore.tif");
        let activity = Activity::try_from(config("Mixed", Some("/a/direct.tif"), vec![pathway])).unwrap();
        assert_eq!(
            activity.aggregation_inputs(),
            vec![PathBuf::from("/a/direct.tif"), PathBuf::from("/p/restore.tif")]
        );
    }

    #[test]
    fn shared_pathways_are_processed_once_and_updated_everywhere() {
        let shared = Pathway::new("Shared", "/p/shared.tif");
        let a = Activity::try_from(config("A", None, vec![shared.clone()])).unwrap();
        let b = Activity::try_from(config("B", None, vec![shared.clone(), Pathway::new("Own", "/p/own.tif")])).unwrap();
        let activities = vec![a, b];

        let unique = unique_pathways(&activities);
        assert_eq!(unique.len(), 2, "shared pathway must be listed once");

        let updated = vec![shared.with_path(PathBuf::from("/out/shared_norm.tif"))];
        let activities = replace_pathways(activities, &updated);
        for activity in &activities {
            assert_eq!(activity.pathways()[0].path, PathBuf::from("/out/shared_norm.tif"));
        }
        assert_eq!(activities[1].pathways()[1].path, PathBuf::from("/p/own.tif"));
    }

    #[test]
    fn pathways_without_uuid_are_matched_by_value() {
        let json = r#"[
            {"name": "A", "pathways": [{"name": "Restore", "path": "/p/restore.tif", "carbon_paths": ["/c/soc.tif"]}]},
            {"name": "B", "pathways": [
                {"name": "Restore", "path": "/p/restore.tif", "carbon_paths": ["/c/soc.tif"]},
                {"name": "Restore", "path": "/p/restore.tif"}
            ]}
        ]"#;
        let configs: Vec<ActivityConfig> = serde_json::from_str(json).unwrap();
        assert!(configs[0].pathways[0].uuid.is_nil());

        let activities = validate_activities(&configs).unwrap();
        let a = &activities[0].pathways()[0];
        let b = activities[1].pathways();
        assert!(!a.uuid.is_nil());
        assert_eq!(a.uuid, b[0].uuid, "identical records share one id");
        assert_ne!(a.uuid, b[1].uuid, "different carbon layers make a different pathway");
        assert_eq!(unique_pathways(&activities).len(), 2);
    }

    #[test]
    fn explicit_pathway_uuids_are_kept() {
        let shared = Pathway::new("Shared", "/p/shared.tif");
        let other = Pathway { uuid: Uuid::new_v4(), ..shared.clone() };
        let activities = validate_activities(&[
            config("A", None, vec![shared.clone()]),
            config("B", None, vec![other.clone()]),
        ])
        .unwrap();
        assert_eq!(activities[0].pathways()[0].uuid, shared.uuid);
        assert_eq!(activities[1].pathways()[0].uuid, other.uuid);
    }

    #[test]
    fn require_path_reports_the_stage() {
        let activity = Activity::try_from(config("Direct", Some("/a.tif"), vec![])).unwrap();
        let err = activity.require_path("cleaning").unwrap_err();
        assert!(matches!(err, AnalysisError::MissingStageRaster { stage: "cleaning", .. }));
    }
}
