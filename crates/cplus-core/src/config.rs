//! Settings access and the configuration snapshot injected into a run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::priority::{PriorityCatalog, PriorityLayer};
use crate::services::ResamplingMethod;

// ── Setting keys ──────────────────────────────────────────────────────────────

pub const BASE_DIR: &str = "base_dir";
pub const CARBON_COEFFICIENT: &str = "carbon_coefficient";
pub const PATHWAY_SUITABILITY_INDEX: &str = "pathway_suitability_index";
pub const SNAPPING_ENABLED: &str = "snapping_enabled";
pub const SNAP_LAYER: &str = "snap_layer";
pub const RESCALE_VALUES: &str = "rescale_values";
pub const RESAMPLING_METHOD: &str = "resampling_method";
pub const PRIORITY_LAYERS: &str = "priority_layers";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings must be a JSON object")]
    NotAnObject,
}

/// Read-only key/value settings source.
pub trait SettingsStore {
    fn get_value(&self, key: &str) -> Option<Value>;
}

impl SettingsStore for Map<String, Value> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }
}

/// Typed read with a default.
///
/// Values stored as text (`"0.5"`, `"true"`) are coerced to `T`; anything
/// that still does not fit logs a warning and yields `default`.
pub fn get_or<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str, default: T) -> T {
    let Some(value) = store.get_value(key) else {
        return default;
    };
    if value.is_null() {
        return default;
    }

    let text = value.as_str().map(str::to_owned);
    match serde_json::from_value::<T>(value) {
        Ok(parsed) => parsed,
        Err(err) => match text.and_then(|t| serde_json::from_str::<T>(t.trim()).ok()) {
            Some(parsed) => parsed,
            None => {
                warn!("Setting {key} has an unexpected type, using the default: {err}");
                default
            }
        },
    }
}

/// Settings loaded from a JSON object on disk.
#[derive(Debug, Clone, Default)]
pub struct JsonSettings {
    values: Map<String, Value>,
}

impl JsonSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }
}

impl SettingsStore for JsonSettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get_value(key)
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Carbon coefficient and pathway suitability index.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coefficients {
    pub carbon_coefficient: f64,
    pub suitability_index: f64,
}

impl Coefficients {
    pub fn new(carbon_coefficient: f64, suitability_index: f64) -> Self {
        Self { carbon_coefficient, suitability_index }
    }

    /// Scale factor applied by normalization.
    pub fn normalization_index(&self) -> f64 {
        self.carbon_coefficient + self.suitability_index
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnappingConfig {
    pub enabled: bool,
    pub reference_layer: Option<PathBuf>,
    pub rescale_values: bool,
    pub resampling: ResamplingMethod,
}

impl SnappingConfig {
    /// The reference layer, when snapping is on and the layer is a file.
    pub fn active_reference(&self) -> Option<&Path> {
        if !self.enabled {
            return None;
        }
        self.reference_layer.as_deref().filter(|path| path.is_file())
    }
}

/// Immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisConfig {
    pub base_dir: Option<PathBuf>,
    pub coefficients: Coefficients,
    pub snapping: SnappingConfig,
    pub priority_layers: PriorityCatalog,
}

impl AnalysisConfig {
    pub fn from_store(store: &dyn SettingsStore) -> Self {
        let base_dir: Option<PathBuf> = get_or(store, BASE_DIR, None);
        let snap_layer: Option<PathBuf> = get_or(store, SNAP_LAYER, None);

        let code: i64 = get_or(store, RESAMPLING_METHOD, 0);
        let resampling = ResamplingMethod::from_code(code).unwrap_or_else(|| {
            warn!("Unknown resampling method code {code}, using nearest neighbour");
            ResamplingMethod::default()
        });

        let priority_layers: Vec<PriorityLayer> = get_or(store, PRIORITY_LAYERS, Vec::new());

        Self {
            base_dir: base_dir.filter(|p| !p.as_os_str().is_empty()),
            coefficients: Coefficients {
                carbon_coefficient: get_or(store, CARBON_COEFFICIENT, 0.0),
                suitability_index: get_or(store, PATHWAY_SUITABILITY_INDEX, 0.0),
            },
            snapping: SnappingConfig {
                enabled: get_or(store, SNAPPING_ENABLED, false),
                reference_layer: snap_layer.filter(|p| !p.as_os_str().is_empty()),
                rescale_values: get_or(store, RESCALE_VALUES, false),
                resampling,
            },
            priority_layers: PriorityCatalog::new(priority_layers),
        }
    }
}
