//! Live progress reporting from inside a capability invocation.

use tokio::sync::mpsc;

/// One progress report emitted by a running capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// New completion percentage for the stage, if it changed.
    pub progress: Option<u8>,
    /// A human-readable description of the task in flight.
    pub message: Option<String>,
}

/// Handle a capability uses to report progress while running.
///
/// Reports are forwarded over an unbounded channel to the orchestrator's
/// per-stage drain task. Dropping every clone of the reporter closes the
/// channel, which is how the orchestrator knows the progress stream for a
/// stage has ended.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    /// Creates a reporter plus the receiving half the orchestrator drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Creates a reporter that discards all reports.
    ///
    /// Useful in tests and for capabilities invoked outside a pipeline.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Reports a new completion percentage for the current stage.
    ///
    /// Regressions are ignored downstream; stage progress never decreases.
    pub fn progress(&self, percent: u8) {
        self.send(ProgressUpdate {
            progress: Some(percent),
            message: None,
        });
    }

    /// Reports the task currently being worked on.
    pub fn task(&self, message: impl Into<String>) {
        self.send(ProgressUpdate {
            progress: None,
            message: Some(message.into()),
        });
    }

    /// Reports a percentage and task description together.
    pub fn update(&self, percent: u8, message: impl Into<String>) {
        self.send(ProgressUpdate {
            progress: Some(percent),
            message: Some(message.into()),
        });
    }

    fn send(&self, update: ProgressUpdate) {
        if let Some(ref tx) = self.tx {
            // The drain task outlives the invocation; a closed channel just
            // means the orchestrator stopped listening.
            let _ = tx.send(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_are_received_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.progress(10);
        reporter.task("compiling");
        reporter.update(50, "linking");
        drop(reporter);

        assert_eq!(rx.recv().await.unwrap().progress, Some(10));
        assert_eq!(rx.recv().await.unwrap().message.as_deref(), Some("compiling"));
        let last = rx.recv().await.unwrap();
        assert_eq!(last.progress, Some(50));
        assert_eq!(last.message.as_deref(), Some("linking"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        reporter.progress(99);
        reporter.task("ignored");
    }
}
