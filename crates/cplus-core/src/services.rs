//! Contracts for the external raster engine.
//!
//! The core never decodes rasters or computes pixels itself. Each trait
//! below is one service boundary; [`RasterBackend`] bundles them so a single
//! engine can be injected into the controller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::Expr;
use crate::extent::SpatialExtent;
use crate::progress::Feedback;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("could not read raster {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write raster {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("raster {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("expression references layer {alias} which is not among the inputs")]
    UnknownLayer { alias: String },

    #[error("no input layers supplied to {operation}")]
    NoInputs { operation: &'static str },

    #[error("{0} is not supported by this raster backend")]
    Unsupported(String),

    /// The operation observed the run's cancellation flag and stopped.
    #[error("raster operation cancelled")]
    Cancelled,
}

/// Geometry and no-data description of a single-band raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    pub extent: SpatialExtent,
    pub width: usize,
    pub height: usize,
    /// Map units per pixel along x.
    pub x_res: f64,
    /// Map units per pixel along y (positive).
    pub y_res: f64,
    pub nodata: Option<f64>,
}

/// Band 1 statistics over valid (non no-data) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_count: usize,
}

impl BandStatistics {
    /// Statistics of a band without any valid pixel.
    pub fn empty() -> Self {
        Self { min: 0.0, max: 0.0, mean: 0.0, valid_count: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.valid_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatistic {
    Sum,
    Mean,
    Min,
    Max,
}

/// Resampling algorithms, numbered as the align-raster settings store them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingMethod {
    #[default]
    NearestNeighbour,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Max,
    Min,
    Median,
    FirstQuartile,
    ThirdQuartile,
}

impl ResamplingMethod {
    pub fn from_code(code: i64) -> Option<Self> {
        use ResamplingMethod::*;
        let method = match code {
            0 => NearestNeighbour,
            1 => Bilinear,
            2 => Cubic,
            3 => CubicSpline,
            4 => Lanczos,
            5 => Average,
            6 => Mode,
            7 => Max,
            8 => Min,
            9 => Median,
            10 => FirstQuartile,
            11 => ThirdQuartile,
            _ => return None,
        };
        Some(method)
    }
}

/// Pixel-wise statistic over a stack of rasters.
#[derive(Debug, Clone, Copy)]
pub struct AggregateRequest<'a> {
    pub statistic: CellStatistic,
    pub inputs: &'a [PathBuf],
    pub ignore_nodata: bool,
    pub output_nodata: f64,
    pub reference: &'a Path,
    pub extent: &'a SpatialExtent,
    pub output: &'a Path,
}

/// Per-pixel 1-based index of the highest-valued raster in `inputs`.
#[derive(Debug, Clone, Copy)]
pub struct RankRequest<'a> {
    pub inputs: &'a [PathBuf],
    pub ignore_nodata: bool,
    pub output_nodata: f64,
    pub reference: &'a Path,
    pub extent: &'a SpatialExtent,
    pub output: &'a Path,
}

/// Resample `input` onto the pixel grid of `reference`, clipped to `extent`.
#[derive(Debug, Clone, Copy)]
pub struct AlignRequest<'a> {
    pub input: &'a Path,
    pub reference: &'a Path,
    pub extent: &'a SpatialExtent,
    pub output: &'a Path,
    pub rescale_values: bool,
    pub resampling: ResamplingMethod,
}

pub trait RasterSource {
    fn describe(&self, raster: &Path) -> Result<RasterInfo, ServiceError>;

    fn band_statistics(&self, raster: &Path) -> Result<BandStatistics, ServiceError>;

    /// File extension (without dot) used for rasters this backend writes.
    fn raster_extension(&self) -> &str;
}

pub trait RasterAlgebra {
    fn evaluate(
        &self,
        expression: &Expr,
        extent: &SpatialExtent,
        layers: &[PathBuf],
        output: &Path,
        feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError>;
}

pub trait CellStatistics {
    fn aggregate(&self, request: &AggregateRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError>;

    fn highest_position(&self, request: &RankRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError>;
}

pub trait RasterAligner {
    /// Returns the path of the aligned raster, normally `output`.
    fn align(&self, request: &AlignRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError>;

    /// Copy `input` to `output`, declaring `nodata` as its no-data value.
    fn replace_nodata(
        &self,
        input: &Path,
        output: &Path,
        nodata: Option<f64>,
        feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError>;
}

/// Everything the scenario pipeline needs from a raster engine.
pub trait RasterBackend: RasterSource + RasterAlgebra + CellStatistics + RasterAligner + Send + Sync {}

impl<T> RasterBackend for T where T: RasterSource + RasterAlgebra + CellStatistics + RasterAligner + Send + Sync {}
