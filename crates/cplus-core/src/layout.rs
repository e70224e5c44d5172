//! Run directory layout and output file naming.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::expr::layer_alias;

pub const SCENARIO_OUTPUT_FILE_NAME: &str = "cplus_scenario_output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSubdir {
    SnappedPathways,
    SnappedCarbonLayers,
    SnappedPriorityLayers,
    PathwaysCarbonLayers,
    NormalizedPathways,
    ImplementationModels,
    NormalizedModels,
    WeightedModels,
}

impl RunSubdir {
    pub fn dir_name(self) -> &'static str {
        match self {
            RunSubdir::SnappedPathways => "pathways",
            RunSubdir::SnappedCarbonLayers => "carbon_layers",
            RunSubdir::SnappedPriorityLayers => "priority_layers",
            RunSubdir::PathwaysCarbonLayers => "pathways_carbon_layers",
            RunSubdir::NormalizedPathways => "normalized_pathways",
            RunSubdir::ImplementationModels => "implementation_models",
            RunSubdir::NormalizedModels => "normalized_ims",
            RunSubdir::WeightedModels => "weighted_ims",
        }
    }
}

/// Strip characters that are not allowed in file names.
pub fn clean_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..4].to_string()
}

/// One scenario run directory, `scenario_%Y_%m_%d_%H_%M_%S` under the base dir.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    extension: String,
}

fn create_dir(path: &Path) -> Result<(), AnalysisError> {
    fs::create_dir_all(path).map_err(|source| AnalysisError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

impl RunLayout {
    pub fn create(base_dir: &Path, started: DateTime<Local>, extension: &str) -> Result<Self, AnalysisError> {
        let root = base_dir.join(format!("scenario_{}", started.format("%Y_%m_%d_%H_%M_%S")));
        create_dir(&root)?;
        Ok(Self {
            root,
            extension: extension.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of `subdir`, created on first use.
    pub fn subdir(&self, subdir: RunSubdir) -> Result<PathBuf, AnalysisError> {
        let path = self.root.join(subdir.dir_name());
        create_dir(&path)?;
        Ok(path)
    }

    fn stem_for(name: &str) -> String {
        format!("{}_{}", clean_filename(&name.replace(' ', "_")), short_id())
    }

    /// `<subdir>/<clean name>_<4 char id>.<ext>`
    pub fn output_file(&self, subdir: RunSubdir, name: &str) -> Result<PathBuf, AnalysisError> {
        let dir = self.subdir(subdir)?;
        Ok(dir.join(format!("{}.{}", Self::stem_for(name), self.extension)))
    }

    /// Aligned and `_final` paths for snapping `input` into `subdir`.
    ///
    /// Named after the input's file stem; a stem already used in `subdir`
    /// gets `_2`, `_3`, ... appended so layers from different folders with
    /// the same file name do not overwrite each other.
    pub fn snapped_files(&self, subdir: RunSubdir, input: &Path) -> Result<(PathBuf, PathBuf), AnalysisError> {
        let dir = self.subdir(subdir)?;
        let stem = layer_alias(input);
        let files = |name: &str| {
            (
                dir.join(format!("{name}.{}", self.extension)),
                dir.join(format!("{name}_final.{}", self.extension)),
            )
        };

        let mut candidate = files(&stem);
        let mut n = 2;
        while candidate.0.exists() || candidate.1.exists() {
            candidate = files(&format!("{stem}_{n}"));
            n += 1;
        }
        Ok(candidate)
    }

    /// `weighted_ims/<clean name>_<4 char id>_cleaned.<ext>`
    pub fn cleaned_output_file(&self, name: &str) -> Result<PathBuf, AnalysisError> {
        let dir = self.subdir(RunSubdir::WeightedModels)?;
        Ok(dir.join(format!("{}_cleaned.{}", Self::stem_for(name), self.extension)))
    }

    /// Final decision raster, directly under the run directory.
    pub fn scenario_output(&self, scenario: &Uuid) -> PathBuf {
        let id = scenario.simple().to_string();
        self.root
            .join(format!("{SCENARIO_OUTPUT_FILE_NAME}_{}.{}", &id[..4], self.extension))
    }
}
