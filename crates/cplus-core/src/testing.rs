//! Recording raster backend for exercising the pipeline without pixels.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cancel::CancellationToken;
use crate::expr::Expr;
use crate::extent::SpatialExtent;
use crate::progress::Feedback;
use crate::services::{
    AggregateRequest, AlignRequest, BandStatistics, CellStatistics, RankRequest, RasterAlgebra, RasterAligner,
    RasterInfo, RasterSource, ServiceError,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub stage: &'static str,
    pub expression: Option<String>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Writes empty marker files for every output and records each call.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    stats: HashMap<PathBuf, BandStatistics>,
    fail_op: Option<&'static str>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statistics(self, raster: impl Into<PathBuf>, min: f64, max: f64) -> Self {
        self.with_band_statistics(raster, BandStatistics { min, max, mean: (min + max) / 2.0, valid_count: 1 })
    }

    pub fn with_band_statistics(mut self, raster: impl Into<PathBuf>, stats: BandStatistics) -> Self {
        self.stats.insert(raster.into(), stats);
        self
    }

    /// Every call to `op` fails with a write error.
    pub fn failing(mut self, op: &'static str) -> Self {
        self.fail_op = Some(op);
        self
    }

    /// Cancel `token` once `calls` operations have been recorded.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    fn record(
        &self,
        op: &'static str,
        feedback: &Feedback,
        expression: Option<&Expr>,
        inputs: Vec<PathBuf>,
        output: PathBuf,
    ) -> Result<PathBuf, ServiceError> {
        let mut calls = self.calls.lock().expect("calls lock");
        calls.push(Call {
            op,
            stage: feedback.stage(),
            expression: expression.map(Expr::to_string),
            inputs,
            output: output.clone(),
        });
        if let Some((after, token)) = &self.cancel_after {
            if calls.len() >= *after {
                token.cancel();
            }
        }
        if self.fail_op == Some(op) {
            return Err(ServiceError::Write { path: output, source: std::io::Error::other("injected failure") });
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).expect("output dir");
        }
        fs::write(&output, b"").expect("marker file");
        Ok(output)
    }
}

impl RasterSource for RecordingBackend {
    fn describe(&self, raster: &Path) -> Result<RasterInfo, ServiceError> {
        if self.fail_op == Some("describe") {
            return Err(ServiceError::Read { path: raster.to_path_buf(), source: std::io::Error::other("injected") });
        }
        Ok(RasterInfo {
            extent: SpatialExtent::new(0.0, 100.0, 0.0, 100.0, "EPSG:32735"),
            width: 10,
            height: 10,
            x_res: 10.0,
            y_res: 10.0,
            nodata: Some(-9999.0),
        })
    }

    fn band_statistics(&self, raster: &Path) -> Result<BandStatistics, ServiceError> {
        Ok(self
            .stats
            .get(raster)
            .copied()
            .unwrap_or(BandStatistics { min: 0.0, max: 10.0, mean: 5.0, valid_count: 100 }))
    }

    fn raster_extension(&self) -> &str {
        "tif"
    }
}

impl RasterAlgebra for RecordingBackend {
    fn evaluate(
        &self,
        expression: &Expr,
        _extent: &SpatialExtent,
        layers: &[PathBuf],
        output: &Path,
        feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError> {
        self.record("evaluate", feedback, Some(expression), layers.to_vec(), output.to_path_buf())
    }
}

impl CellStatistics for RecordingBackend {
    fn aggregate(&self, request: &AggregateRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        self.record("aggregate", feedback, None, request.inputs.to_vec(), request.output.to_path_buf())
    }

    fn highest_position(&self, request: &RankRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        self.record("highest_position", feedback, None, request.inputs.to_vec(), request.output.to_path_buf())
    }
}

impl RasterAligner for RecordingBackend {
    fn align(&self, request: &AlignRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        self.record("align", feedback, None, vec![request.input.to_path_buf()], request.output.to_path_buf())
    }

    fn replace_nodata(
        &self,
        input: &Path,
        output: &Path,
        _nodata: Option<f64>,
        feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError> {
        self.record("replace_nodata", feedback, None, vec![input.to_path_buf()], output.to_path_buf())
    }
}
