//! The scenario analysis controller.
//!
//! Drives the stages in fixed order on one thread of control, owns the
//! cancellation flag and the user-visible status, and records either the
//! scenario result or the terminal error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::extent::{align_extent, SpatialExtent, DEFAULT_CRS};
use crate::layout::RunLayout;
use crate::model::{validate_activities, Activity};
use crate::progress::{Feedback, ProgressSink, Severity};
use crate::scenario::{Scenario, ScenarioResult};
use crate::services::RasterBackend;
use crate::stages::aggregate::aggregate_activities;
use crate::stages::cleaning::clean_activities;
use crate::stages::combine::combine_pathways;
use crate::stages::highest_position::select_highest_position;
use crate::stages::normalize::{normalize_activities, normalize_pathways};
use crate::stages::snapping::snap_analysis_data;
use crate::stages::weighting::{weight_activities, WeightingOutcome};
use crate::stages::StageContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisState {
    Pending,
    Aligning,
    Snapping,
    CombiningPathways,
    NormalizingPathways,
    AggregatingModels,
    NormalizingModels,
    Weighting,
    Cleaning,
    SelectingHighestPosition,
    Succeeded,
    Cancelled,
    Failed,
}

impl AnalysisState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisState::Succeeded | AnalysisState::Cancelled | AnalysisState::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            AnalysisState::Pending => "pending",
            AnalysisState::Aligning => "aligning",
            AnalysisState::Snapping => "snapping",
            AnalysisState::CombiningPathways => "combining pathways",
            AnalysisState::NormalizingPathways => "normalizing pathways",
            AnalysisState::AggregatingModels => "aggregating models",
            AnalysisState::NormalizingModels => "normalizing models",
            AnalysisState::Weighting => "weighting",
            AnalysisState::Cleaning => "cleaning",
            AnalysisState::SelectingHighestPosition => "selecting highest position",
            AnalysisState::Succeeded => "succeeded",
            AnalysisState::Cancelled => "cancelled",
            AnalysisState::Failed => "failed",
        }
    }

    fn status_message(self) -> Option<&'static str> {
        let message = match self {
            AnalysisState::Aligning => "Aligning the area of interest extent",
            AnalysisState::Snapping => "Snapping the selected models pathways, carbon layers and priority layers",
            AnalysisState::CombiningPathways => "Adding models pathways with carbon layers",
            AnalysisState::NormalizingPathways => "Normalization of pathways",
            AnalysisState::AggregatingModels => "Creating implementation models layers from pathways",
            AnalysisState::NormalizingModels => "Normalization of the implementation models",
            AnalysisState::Weighting => "Weighting implementation models",
            AnalysisState::Cleaning => "Updating weighted implementation models values",
            AnalysisState::SelectingHighestPosition => "Calculating the highest position",
            _ => return None,
        };
        Some(message)
    }
}

pub struct ScenarioAnalysis {
    scenario: Scenario,
    config: AnalysisConfig,
    backend: Arc<dyn RasterBackend>,
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,

    state: AnalysisState,
    success: bool,
    error: Option<AnalysisError>,
    status_message: Option<String>,
    info_message: Option<(String, Severity)>,

    scenario_directory: Option<PathBuf>,
    analysis_extent: Option<SpatialExtent>,
    analysis_activities: Vec<Activity>,
    weighted_activities: Vec<Activity>,
    result: Option<ScenarioResult>,
}

impl ScenarioAnalysis {
    pub fn new(
        scenario: Scenario,
        config: AnalysisConfig,
        backend: Arc<dyn RasterBackend>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            scenario,
            config,
            backend,
            sink,
            token: CancellationToken::new(),
            state: AnalysisState::Pending,
            success: false,
            error: None,
            status_message: None,
            info_message: None,
            scenario_directory: None,
            analysis_extent: None,
            analysis_activities: Vec::new(),
            weighted_activities: Vec::new(),
            result: None,
        }
    }

    /// Share an externally owned cancellation flag, e.g. one tied to a
    /// signal handler.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn info_message(&self) -> Option<(&str, Severity)> {
        self.info_message.as_ref().map(|(m, s)| (m.as_str(), *s))
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn scenario_directory(&self) -> Option<&Path> {
        self.scenario_directory.as_deref()
    }

    /// Extent snapped to the reference pathway grid, once aligned.
    pub fn analysis_extent(&self) -> Option<&SpatialExtent> {
        self.analysis_extent.as_ref()
    }

    /// Activities as they stood after normalization, before weighting.
    pub fn analysis_activities(&self) -> &[Activity] {
        &self.analysis_activities
    }

    /// Weighted, cleaned and ranked activities.
    pub fn weighted_activities(&self) -> &[Activity] {
        &self.weighted_activities
    }

    pub fn result(&self) -> Option<&ScenarioResult> {
        self.result.as_ref()
    }

    fn set_status(&mut self, message: &str) {
        self.status_message = Some(message.to_string());
        self.sink.status(message);
    }

    fn set_info(&mut self, message: &str, severity: Severity) {
        self.info_message = Some((message.to_string(), severity));
        self.sink.info(message, severity);
    }

    /// Move to `state` unless cancelled, binding a fresh feedback handle.
    fn enter(&mut self, state: AnalysisState) -> Result<Feedback, AnalysisError> {
        if self.token.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        info!(scenario = %self.scenario.name, stage = state.label(), "Entering stage");
        self.state = state;
        if let Some(message) = state.status_message() {
            self.set_status(message);
        }
        Ok(Feedback::new(Arc::clone(&self.sink), self.token.clone(), state.label()))
    }

    /// Run the whole analysis on the current thread.
    ///
    /// Returns the success flag; details are available through the
    /// accessors afterwards.
    pub fn run(&mut self) -> bool {
        if self.state != AnalysisState::Pending {
            warn!("Scenario analysis {} has already been run", self.scenario.name);
            return self.success;
        }

        match self.execute() {
            Ok(result) => {
                info!("Finished scenario analysis, output {}", result.analysis_output.display());
                self.result = Some(result);
                self.state = AnalysisState::Succeeded;
                self.success = true;
                self.sink.progress(100.0);
                self.set_info("Scenario analysis completed", Severity::Success);
            }
            Err(AnalysisError::Cancelled) => {
                info!("Scenario analysis {} cancelled", self.scenario.name);
                self.state = AnalysisState::Cancelled;
                self.success = false;
                self.set_info("Processing has been cancelled by the user.", Severity::Critical);
            }
            Err(err) => {
                error!("Error from scenario analysis {}: {err}", self.scenario.name);
                self.set_info(&err.to_string(), Severity::Critical);
                self.error = Some(err);
                self.token.cancel();
                self.state = AnalysisState::Failed;
                self.success = false;
            }
        }
        self.success
    }

    /// Run on a dedicated worker thread.
    pub fn spawn(mut self) -> Result<AnalysisHandle, AnalysisError> {
        let token = self.token.clone();
        let worker = thread::Builder::new()
            .name(format!("scenario-{}", self.scenario.uuid.simple()))
            .spawn(move || {
                self.run();
                self
            })
            .map_err(AnalysisError::WorkerSpawn)?;
        Ok(AnalysisHandle { token, worker })
    }

    fn execute(&mut self) -> Result<ScenarioResult, AnalysisError> {
        let base_dir = self.config.base_dir.clone().ok_or(AnalysisError::MissingBaseDir)?;
        let backend = Arc::clone(&self.backend);
        let coefficients = self.config.coefficients;
        let snapping = self.config.snapping.clone();
        let catalog = self.config.priority_layers.clone();

        let layout = RunLayout::create(&base_dir, Local::now(), backend.raster_extension())?;
        self.scenario_directory = Some(layout.root().to_path_buf());

        let mut activities = validate_activities(&self.scenario.activities)?;

        self.enter(AnalysisState::Aligning)?;
        let extent = self.aligned_extent(&activities);
        self.analysis_extent = Some(extent.clone());

        macro_rules! stage_context {
            ($feedback:expr, $extent:expr) => {
                StageContext {
                    backend: backend.as_ref(),
                    layout: &layout,
                    extent: $extent,
                    feedback: $feedback,
                }
            };
        }

        if let Some(reference) = snapping.active_reference() {
            let feedback = self.enter(AnalysisState::Snapping)?;
            let ctx = stage_context!(&feedback, &extent);
            activities = snap_analysis_data(&ctx, activities, &catalog, reference, &snapping)?;
        }

        let feedback = self.enter(AnalysisState::CombiningPathways)?;
        activities = combine_pathways(&stage_context!(&feedback, &extent), activities, coefficients)?;

        let feedback = self.enter(AnalysisState::NormalizingPathways)?;
        activities = normalize_pathways(&stage_context!(&feedback, &extent), activities, coefficients)?;

        let feedback = self.enter(AnalysisState::AggregatingModels)?;
        activities = aggregate_activities(&stage_context!(&feedback, &extent), activities)?;

        let feedback = self.enter(AnalysisState::NormalizingModels)?;
        activities = normalize_activities(&stage_context!(&feedback, &extent), activities, coefficients)?;
        self.analysis_activities = activities.clone();

        let feedback = self.enter(AnalysisState::Weighting)?;
        let weighted = match weight_activities(&stage_context!(&feedback, &extent), &activities, &catalog)? {
            WeightingOutcome::Weighted(weighted) => weighted,
            WeightingOutcome::Skipped => activities.clone(),
        };
        self.weighted_activities = weighted.clone();

        let feedback = self.enter(AnalysisState::Cleaning)?;
        let cleaned = clean_activities(&stage_context!(&feedback, &extent), weighted)?;
        self.weighted_activities = cleaned.clone();

        let feedback = self.enter(AnalysisState::SelectingHighestPosition)?;
        let output = layout.scenario_output(&self.scenario.uuid);
        let scenario_extent = self.scenario.extent.clone();
        let (ranked, analysis_output) =
            select_highest_position(&stage_context!(&feedback, &scenario_extent), cleaned, &output)?;
        self.weighted_activities = ranked;

        Ok(ScenarioResult {
            scenario_uuid: self.scenario.uuid,
            scenario_name: self.scenario.name.clone(),
            scenario_directory: layout.root().to_path_buf(),
            analysis_output,
            created_at: Utc::now(),
        })
    }

    /// Scenario extent snapped to the first pathway's grid (or the first
    /// direct layer's when there are no pathways).
    fn aligned_extent(&self, activities: &[Activity]) -> SpatialExtent {
        let target = self.scenario.extent.clone();
        let reference = activities
            .iter()
            .find_map(|a| a.pathways().first().map(|p| p.path.clone()))
            .or_else(|| activities.iter().find_map(|a| a.direct_layer().map(Path::to_path_buf)));

        let aligned = match reference.map(|path| (self.backend.describe(&path), path)) {
            Some((Ok(info), _)) => {
                let crs = info.extent.crs.clone();
                align_extent(&info, &target).with_crs(crs)
            }
            Some((Err(err), path)) => {
                warn!("Could not read reference layer {}, using the original extent: {err}", path.display());
                target.clone().with_crs(DEFAULT_CRS)
            }
            None => target.clone().with_crs(DEFAULT_CRS),
        };

        info!("Original area of interest extent: {}", target.to_wkt_polygon());
        info!("Snapped area of interest extent {}", aligned.to_wkt_polygon());
        aligned
    }
}

/// Handle to an analysis running on its own thread.
pub struct AnalysisHandle {
    token: CancellationToken,
    worker: JoinHandle<ScenarioAnalysis>,
}

impl AnalysisHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<ScenarioAnalysis, AnalysisError> {
        self.worker.join().map_err(|_| AnalysisError::WorkerPanicked)
    }
}
