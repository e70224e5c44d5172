use std::path::Path;
use std::sync::Arc;

use cplus_core::cancel::CancellationToken;
use cplus_core::model::Pathway;
use cplus_core::progress::{ProgressSink, Severity};
use cplus_core::{AnalysisState, Scenario};
use integration_tests::{analysis, analysis_with_sink, extent_for, pathway_activity, scenario, settings, write_layer};
use serde_json::json;

/// Cancels the run as soon as a given status message is published.
struct CancelOnStatus {
    trigger: &'static str,
    token: CancellationToken,
}

impl ProgressSink for CancelOnStatus {
    fn status(&self, message: &str) {
        if message == self.trigger {
            self.token.cancel();
        }
    }

    fn info(&self, _message: &str, _severity: Severity) {}

    fn progress(&self, _percent: f64) {}
}

fn two_pathway_scenario(data: &Path) -> Scenario {
    let p1 = write_layer(data, "p1", 2, 2, &[0.0, 1.0, 2.0, 3.0]).unwrap();
    let p2 = write_layer(data, "p2", 2, 2, &[3.0, 2.0, 1.0, 0.0]).unwrap();
    scenario(
        extent_for(2, 2),
        vec![
            pathway_activity("A", vec![Pathway::new("p1", p1)], 1),
            pathway_activity("B", vec![Pathway::new("p2", p2)], 2),
        ],
    )
}

#[test]
fn cancelling_mid_run_stops_before_the_next_stage() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let sink = CancelOnStatus {
        trigger: "Normalization of the implementation models",
        token: token.clone(),
    };

    let mut analysis = analysis_with_sink(
        two_pathway_scenario(data.path()),
        &settings(out.path(), json!({})).unwrap(),
        Arc::new(sink),
    )
    .with_cancellation_token(token);

    assert!(!analysis.run());
    assert_eq!(analysis.state(), AnalysisState::Cancelled);
    assert!(analysis.error().is_none());
    assert!(analysis.result().is_none());
    assert_eq!(
        analysis.info_message(),
        Some(("Processing has been cancelled by the user.", Severity::Critical))
    );

    let root = analysis.scenario_directory().unwrap();
    assert!(root.join("implementation_models").is_dir(), "aggregation finished before cancelling");
    assert!(!root.join("normalized_ims").exists(), "no operation ran after cancelling");
    assert!(!root.join("weighted_ims").exists());
}

#[test]
fn cancelling_a_spawned_run_before_it_starts() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let analysis = analysis(two_pathway_scenario(data.path()), &settings(out.path(), json!({})).unwrap());
    analysis.cancel();

    let handle = analysis.spawn().unwrap();
    let analysis = handle.join().unwrap();
    assert_eq!(analysis.state(), AnalysisState::Cancelled);
    assert!(!analysis.success());
}
