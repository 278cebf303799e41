//! Structured progress reporting for the overwrite protocol.
//!
//! Each protocol step emits an event so the operator can see how far a
//! destructive run got, which matters when it stops halfway.

use std::sync::Arc;
use std::time::Instant;

/// Step of the overwrite protocol an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePhase {
    Resolve,
    Enumerate,
    Cleanup,
    DeleteIndex,
    CreateIndex,
    Upload,
    Ingest,
    Rebind,
}

impl OverwritePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Enumerate => "enumerate",
            Self::Cleanup => "cleanup",
            Self::DeleteIndex => "delete-index",
            Self::CreateIndex => "create-index",
            Self::Upload => "upload",
            Self::Ingest => "ingest",
            Self::Rebind => "rebind",
        }
    }
}

/// Progress event emitted during an overwrite.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: OverwritePhase,

    /// Current progress (documents cleaned, polls made, ...)
    pub current: u64,

    /// Total expected work (if known)
    pub total: Option<u64>,

    /// Human-readable message
    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: OverwritePhase,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            current,
            total,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    /// Format as a single operator-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!(" {}/{}", self.current, total),
            None => String::new(),
        };
        format!("[{}]{} {}", self.phase.as_str(), progress, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress reporter that emits events through a callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that only logs.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    /// Emit a progress event to tracing and, if set, the callback.
    ///
    /// With a callback the operator already sees the event, so it is only
    /// logged at debug level.
    pub fn emit(&self, event: ProgressEvent) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let event = event.with_elapsed(elapsed);

        match &self.callback {
            Some(callback) => {
                tracing::debug!(
                    phase = event.phase.as_str(),
                    current = event.current,
                    total = ?event.total,
                    elapsed_secs = elapsed,
                    "{}",
                    event.message
                );
                callback(event);
            }
            None => tracing::info!(
                phase = event.phase.as_str(),
                current = event.current,
                total = ?event.total,
                elapsed_secs = elapsed,
                "{}",
                event.message
            ),
        }
    }

    pub fn step(&self, phase: OverwritePhase, message: impl Into<String>) {
        self.emit(ProgressEvent::new(phase, 0, None, message));
    }

    pub fn counted(
        &self,
        phase: OverwritePhase,
        current: u64,
        total: u64,
        message: impl Into<String>,
    ) {
        self.emit(ProgressEvent::new(phase, current, Some(total), message));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_event_format() {
        let event = ProgressEvent::new(OverwritePhase::Cleanup, 2, Some(3), "removed file-1");
        assert_eq!(event.format_simple(), "[cleanup] 2/3 removed file-1");

        let event = ProgressEvent::new(OverwritePhase::DeleteIndex, 0, None, "deleted vs_1");
        assert_eq!(event.format_simple(), "[delete-index] deleted vs_1");
    }

    #[test]
    fn test_progress_reporter_emit() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let reporter = ProgressReporter::new(Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        }));
        reporter.counted(OverwritePhase::Cleanup, 1, 4, "file-a");
        reporter.step(OverwritePhase::Rebind, "asst_1");

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].phase, OverwritePhase::Cleanup);
        assert_eq!(captured[0].total, Some(4));
        assert!(captured[1].elapsed_secs.is_some());
    }

    #[test]
    fn test_noop_reporter() {
        ProgressReporter::noop().step(OverwritePhase::Resolve, "vs_1");
    }
}
