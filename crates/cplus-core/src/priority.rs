//! Priority-weighting layers (PWLs) and their resolution for a run.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Accepts both `1.5` and `"1.5"`; settings stores keep group values as text.
pub(crate) fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| D::Error::custom("number out of range")),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected a number, found {other}"))),
    }
}

/// A named group a PWL belongs to, carrying the weighting coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityGroup {
    pub name: String,
    #[serde(deserialize_with = "number_or_string")]
    pub value: f64,
}

/// A PWL record as held by the settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityLayer {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub groups: Vec<PriorityGroup>,
}

/// An activity's reference to a PWL record.
///
/// `path` is only set when snapping produced a resampled copy of the layer
/// for this run; it then takes precedence over the record's path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityLayerRef {
    pub uuid: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// A PWL ready to be used as a weighting term.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPriorityLayer {
    pub name: String,
    pub path: PathBuf,
    /// One coefficient per group the layer belongs to.
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum UnresolvedLayer {
    #[error("no priority weighting layer record with id {0}")]
    MissingRecord(Uuid),
    #[error("priority weighting layer {0} has no path")]
    MissingPath(String),
    #[error("path {path} for priority weighting layer {name} doesn't exist")]
    FileNotFound { name: String, path: PathBuf },
}

/// Read-only view of the configured PWL records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityCatalog {
    layers: Vec<PriorityLayer>,
}

impl PriorityCatalog {
    pub fn new(layers: Vec<PriorityLayer>) -> Self {
        Self { layers }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&PriorityLayer> {
        self.layers.iter().find(|layer| &layer.uuid == uuid)
    }

    /// Group coefficients of every record carrying `name`.
    pub fn coefficients_for(&self, name: &str) -> Vec<f64> {
        self.layers
            .iter()
            .filter(|layer| layer.name == name)
            .flat_map(|layer| layer.groups.iter().map(|group| group.value))
            .collect()
    }

    /// Path the reference currently points at, without checking the disk.
    pub fn layer_path(&self, reference: &PriorityLayerRef) -> Option<PathBuf> {
        let path = match &reference.path {
            Some(path) => Some(path.clone()),
            None => self.get(&reference.uuid)?.path.clone(),
        };
        path.filter(|p| !p.as_os_str().is_empty())
    }

    pub fn resolve(&self, reference: &PriorityLayerRef) -> Result<ResolvedPriorityLayer, UnresolvedLayer> {
        let record = self
            .get(&reference.uuid)
            .ok_or(UnresolvedLayer::MissingRecord(reference.uuid))?;
        let name = if reference.name.is_empty() {
            record.name.clone()
        } else {
            reference.name.clone()
        };

        let path = self
            .layer_path(reference)
            .ok_or_else(|| UnresolvedLayer::MissingPath(name.clone()))?;
        if !path.exists() {
            return Err(UnresolvedLayer::FileNotFound { name, path });
        }

        let coefficients = self.coefficients_for(&name);
        Ok(ResolvedPriorityLayer { name, path, coefficients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, path: Option<PathBuf>, values: &[f64]) -> PriorityLayer {
        PriorityLayer {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            path,
            groups: values
                .iter()
                .enumerate()
                .map(|(i, v)| PriorityGroup { name: format!("group {i}"), value: *v })
                .collect(),
        }
    }

    fn reference_to(layer: &PriorityLayer) -> PriorityLayerRef {
        PriorityLayerRef { uuid: layer.uuid, name: layer.name.clone(), path: None }
    }

    #[test]
    fn group_values_parse_from_strings_and_numbers() {
        let json = r#"{"uuid":"7a1f3b2e-8d4c-4e5f-9a6b-0c1d2e3f4a5b","name":"biodiversity",
            "path":"/tmp/bio.tif","groups":[{"name":"Biodiversity","value":"2.5"},{"name":"Livelihood","value":1}]}"#;
        let layer: PriorityLayer = serde_json::from_str(json).unwrap();
        assert_eq!(layer.groups[0].value, 2.5);
        assert_eq!(layer.groups[1].value, 1.0);
    }

    #[test]
    fn resolve_reports_missing_record_and_path() {
        let without_path = record("carbon", None, &[1.0]);
        let catalog = PriorityCatalog::new(vec![without_path.clone()]);

        let orphan = PriorityLayerRef { uuid: Uuid::new_v4(), name: "orphan".into(), path: None };
        assert!(matches!(catalog.resolve(&orphan), Err(UnresolvedLayer::MissingRecord(_))));
        assert_eq!(
            catalog.resolve(&reference_to(&without_path)),
            Err(UnresolvedLayer::MissingPath("carbon".into()))
        );
    }

    #[test]
    fn resolve_skips_layers_missing_on_disk() {
        let layer = record("water", Some(PathBuf::from("/definitely/not/here.tif")), &[3.0]);
        let catalog = PriorityCatalog::new(vec![layer.clone()]);
        assert!(matches!(
            catalog.resolve(&reference_to(&layer)),
            Err(UnresolvedLayer::FileNotFound { .. })
        ));
    }

    #[test]
    fn resolve_collects_coefficients_across_same_named_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bio.tif");
        std::fs::write(&file, b"").unwrap();

        let first = record("bio", Some(file.clone()), &[1.0, 0.0]);
        let second = record("bio", None, &[4.0]);
        let catalog = PriorityCatalog::new(vec![first.clone(), second]);

        let resolved = catalog.resolve(&reference_to(&first)).unwrap();
        assert_eq!(resolved.path, file);
        assert_eq!(resolved.coefficients, vec![1.0, 0.0, 4.0]);
    }

    #[test]
    fn snapped_path_overrides_record_path() {
        let layer = record("bio", Some(PathBuf::from("/orig.tif")), &[1.0]);
        let catalog = PriorityCatalog::new(vec![layer.clone()]);
        let mut reference = reference_to(&layer);
        reference.path = Some(PathBuf::from("/snapped.tif"));
        assert_eq!(catalog.layer_path(&reference), Some(PathBuf::from("/snapped.tif")));
    }
}
