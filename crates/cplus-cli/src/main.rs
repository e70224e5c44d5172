/// Command-line front end for the scenario analysis pipeline.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cplus_core::config::{AnalysisConfig, JsonSettings, BASE_DIR};
use cplus_core::extent::{snap_to_grid, SpatialExtent, DEFAULT_CRS};
use cplus_core::progress::{ChannelSink, ProgressEvent, Severity};
use cplus_core::services::RasterSource;
use cplus_core::{Scenario, ScenarioAnalysis};
use cplus_engine::GridEngine;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cplus", about = "Rank activities per pixel for a land-use scenario")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full scenario analysis.
    Run {
        /// Scenario definition (JSON).
        #[arg(long)]
        scenario: PathBuf,

        /// Settings file (JSON object).
        #[arg(long)]
        settings: PathBuf,

        /// Overrides the settings' base directory for run outputs.
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// Snap an extent to a raster's pixel grid.
    Align {
        #[arg(long)]
        reference: PathBuf,

        /// xmin,xmax,ymin,ymax
        #[arg(long, value_parser = parse_extent, allow_hyphen_values = true)]
        extent: SpatialExtent,
    },
    /// Print band statistics of a raster.
    Stats {
        #[arg(long)]
        raster: PathBuf,
    },
}

fn parse_extent(s: &str) -> Result<SpatialExtent, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("invalid coordinate '{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        &[xmin, xmax, ymin, ymax] if xmin < xmax && ymin < ymax => {
            Ok(SpatialExtent::new(xmin, xmax, ymin, ymax, DEFAULT_CRS))
        }
        &[_, _, _, _] => Err("expected xmin < xmax and ymin < ymax".to_string()),
        _ => Err(format!("expected 4 comma-separated values, got {}", values.len())),
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let file = File::open(path).with_context(|| format!("Cannot open scenario {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Invalid scenario {}", path.display()))
}

fn print_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Status(message) => eprintln!("[status] {message}"),
        ProgressEvent::Info { message, severity } => {
            let tag = match severity {
                Severity::Info => "info",
                Severity::Warning => "warning",
                Severity::Critical => "critical",
                Severity::Success => "success",
            };
            eprintln!("[{tag}] {message}");
        }
        ProgressEvent::Progress(_) => {}
    }
}

fn drain(events: &Receiver<ProgressEvent>) {
    events.try_iter().for_each(print_event);
}

fn run(scenario: &Path, settings: &Path, base_dir: Option<PathBuf>) -> Result<()> {
    let mut store =
        JsonSettings::load(settings).with_context(|| format!("Cannot load settings {}", settings.display()))?;
    if let Some(dir) = base_dir {
        store.set(BASE_DIR, dir.display().to_string());
    }
    let config = AnalysisConfig::from_store(&store);
    let scenario = load_scenario(scenario)?;
    info!(scenario = %scenario.name, activities = scenario.activities.len(), "Starting scenario analysis");

    let (sink, events) = ChannelSink::new();
    let analysis = ScenarioAnalysis::new(scenario, config, Arc::new(GridEngine::new()), Arc::new(sink));
    let handle = analysis.spawn().context("Cannot start the analysis")?;

    while !handle.is_finished() {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => print_event(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let analysis = handle.join().context("Analysis worker failed")?;
    drain(&events);

    match (analysis.result(), analysis.error()) {
        (Some(result), _) => {
            println!("{}", serde_json::to_string_pretty(result)?);
            Ok(())
        }
        (None, Some(err)) => bail!("Scenario analysis failed: {err}"),
        (None, None) => bail!("Scenario analysis ended in state {}", analysis.state().label()),
    }
}

fn align(reference: &Path, extent: SpatialExtent) -> Result<()> {
    let info = GridEngine::new()
        .describe(reference)
        .with_context(|| format!("Cannot read reference {}", reference.display()))?;
    let snapped = snap_to_grid(&info, &extent)
        .context("Cannot snap extent")?
        .with_crs(info.extent.crs.clone());
    println!("{snapped}");
    println!("{}", snapped.to_wkt_polygon());
    Ok(())
}

fn stats(raster: &Path) -> Result<()> {
    let stats = GridEngine::new()
        .band_statistics(raster)
        .with_context(|| format!("Cannot compute statistics for {}", raster.display()))?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run { scenario, settings, base_dir } => run(&scenario, &settings, base_dir),
        Command::Align { reference, extent } => align(&reference, extent),
        Command::Stats { raster } => stats(&raster),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_argument_parses_four_values() {
        let extent = parse_extent("30.5, 31.5,-25,-24").unwrap();
        assert_eq!((extent.xmin, extent.xmax, extent.ymin, extent.ymax), (30.5, 31.5, -25.0, -24.0));
        assert_eq!(extent.crs, DEFAULT_CRS);
    }

    #[test]
    fn extent_argument_rejects_bad_input() {
        assert!(parse_extent("1,2,3").is_err());
        assert!(parse_extent("2,1,3,4").is_err(), "xmin must be below xmax");
        assert!(parse_extent("a,b,c,d").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
