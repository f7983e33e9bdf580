//! Progress events flowing from the routine worker to the control surface.
//!
//! Uses std::sync::mpsc channel for single-producer, single-consumer communication.
//! Events are fire-and-forget: if the consumer is gone, they are dropped.

use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Current stage name (text)
pub const STAGE: &str = "stage";
/// Progress of the current task in percent
pub const TASK_PROGRESS: &str = "task_progress";
/// A routine cycle finished; value is elapsed seconds
pub const DONE: &str = "done";
/// A cycle was abandoned; value is the reason
pub const FAILURE: &str = "failure";
/// One ITOPOD kill (value is always 1)
pub const ITOPOD_SNIPES: &str = "itopod_snipes";
pub const EXP: &str = "exp";
pub const EXP_PER_HOUR: &str = "xph";
pub const QUEST_POINTS: &str = "qp";
pub const QUEST_POINTS_PER_HOUR: &str = "qph";
pub const BOSS: &str = "boss";

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ProgressValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressValue::Number(n) => write!(f, "{}", crate::automation::metrics::human_format(*n)),
            ProgressValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named metric update.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub metric: String,
    pub value: ProgressValue,
}

impl ProgressEvent {
    pub fn number(metric: &str, value: f64) -> Self {
        Self {
            metric: metric.to_string(),
            value: ProgressValue::Number(value),
        }
    }

    pub fn text(metric: &str, value: impl Into<String>) -> Self {
        Self {
            metric: metric.to_string(),
            value: ProgressValue::Text(value.into()),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.metric, self.value)
    }
}

/// Creates a new progress channel.
///
/// The channel is unbounded; events queue up if the consumer is slow.
pub fn create_progress_channel() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
    channel()
}

/// Sending half held by the routine worker.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    pub fn emit(&self, event: ProgressEvent) {
        crate::log(&format!("Progress: {}", event));
        // Fire-and-forget: a closed channel only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn stage(&self, name: &str, percent: f64) {
        self.emit(ProgressEvent::text(STAGE, name));
        self.emit(ProgressEvent::number(TASK_PROGRESS, percent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_send_receive() {
        let (sender, receiver) = create_progress_channel();
        let reporter = ProgressReporter::new(sender);

        reporter.stage("BossClearing", 12.5);

        assert_eq!(receiver.recv().unwrap(), ProgressEvent::text(STAGE, "BossClearing"));
        assert_eq!(receiver.recv().unwrap(), ProgressEvent::number(TASK_PROGRESS, 12.5));
    }

    #[test]
    fn test_emit_after_consumer_dropped_is_ignored() {
        let (sender, receiver) = create_progress_channel();
        drop(receiver);
        ProgressReporter::new(sender).emit(ProgressEvent::number(EXP, 1.0));
    }

    #[test]
    fn test_channel_closes_when_reporter_dropped() {
        let (sender, receiver) = create_progress_channel();
        let reporter = ProgressReporter::new(sender);
        reporter.emit(ProgressEvent::number(ITOPOD_SNIPES, 1.0));
        drop(reporter);

        assert!(receiver.recv().is_ok());
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn test_display_uses_human_format() {
        assert_eq!(ProgressEvent::number(EXP, 1_500_000.0).to_string(), "exp = 1.5M");
        assert_eq!(ProgressEvent::text(STAGE, "Done").to_string(), "stage = Done");
    }
}
