//! Observer notifications and the per-stage feedback handle.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Success,
}

/// Receives run notifications. Implementations must not block the caller.
pub trait ProgressSink: Send + Sync {
    fn status(&self, message: &str);
    fn info(&self, message: &str, severity: Severity);
    /// Overall percentage in `0..=100`.
    fn progress(&self, percent: f64);
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn status(&self, message: &str) {
        info!(target: "cplus::status", "{message}");
    }

    fn info(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Critical => error!(target: "cplus::status", "{message}"),
            Severity::Warning => warn!(target: "cplus::status", "{message}"),
            Severity::Info | Severity::Success => info!(target: "cplus::status", "{message}"),
        }
    }

    fn progress(&self, percent: f64) {
        tracing::debug!(target: "cplus::progress", percent, "progress");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn status(&self, _message: &str) {}
    fn info(&self, _message: &str, _severity: Severity) {}
    fn progress(&self, _percent: f64) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressEvent {
    Status(String),
    Info { message: String, severity: Severity },
    Progress(f64),
}

/// Fire-and-forget sink backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn status(&self, message: &str) {
        let _ = self.sender.send(ProgressEvent::Status(message.to_string()));
    }

    fn info(&self, message: &str, severity: Severity) {
        let _ = self.sender.send(ProgressEvent::Info { message: message.to_string(), severity });
    }

    fn progress(&self, percent: f64) {
        let _ = self.sender.send(ProgressEvent::Progress(percent));
    }
}

/// Progress/cancellation handle given to raster services for one stage.
///
/// A fresh `Feedback` is bound for every stage so that late progress from a
/// previous operation cannot leak into the next one.
#[derive(Clone)]
pub struct Feedback {
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,
    stage: &'static str,
}

impl Feedback {
    pub fn new(sink: Arc<dyn ProgressSink>, token: CancellationToken, stage: &'static str) -> Self {
        Self { sink, token, stage }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Dropped once the run has been cancelled.
    pub fn set_progress(&self, percent: f64) {
        if !self.token.is_cancelled() {
            self.sink.progress(percent.clamp(0.0, 100.0));
        }
    }

    pub fn status(&self, message: &str) {
        self.sink.status(message);
    }

    pub fn info(&self, message: &str, severity: Severity) {
        self.sink.info(message, severity);
    }
}

impl std::fmt::Debug for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedback")
            .field("stage", &self.stage)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_events_in_order() {
        let (sink, events) = ChannelSink::new();
        sink.status("Normalization of pathways");
        sink.info("careful", Severity::Warning);
        sink.progress(42.0);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ProgressEvent::Status("Normalization of pathways".into()),
                ProgressEvent::Info { message: "careful".into(), severity: Severity::Warning },
                ProgressEvent::Progress(42.0),
            ]
        );
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, events) = ChannelSink::new();
        drop(events);
        sink.status("nobody listening");
    }

    #[test]
    fn feedback_drops_progress_after_cancellation() {
        let (sink, events) = ChannelSink::new();
        let token = CancellationToken::new();
        let feedback = Feedback::new(Arc::new(sink), token.clone(), "cleaning");

        feedback.set_progress(150.0);
        token.cancel();
        feedback.set_progress(50.0);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received, vec![ProgressEvent::Progress(100.0)]);
    }
}
