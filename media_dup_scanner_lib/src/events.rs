use std::path::PathBuf;
use std::time::Duration;

/// A progress report for the currently running phase.
///
/// `current_path` is informational only; with parallel workers it may lag or
/// lead the `processed` counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub current_path: PathBuf,
    /// Wall-clock time spent scanning. Excludes time spent paused.
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
}

/// Lifecycle and progress notifications emitted by the scan engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Progress(ScanProgress),
    /// Enumeration finished; the catalog now reflects the filesystem.
    FilesEnumerated,
    /// All fingerprints for this scan have been built and persisted.
    BuildingHashesDone,
    /// Display thumbnails for the current duplicate set are ready.
    ThumbnailsRetrieved,
    ScanDone,
    /// The scan was cancelled before completing.
    ScanAborted,
    DatabaseCleaned { removed: usize },
}

/// The observer interface an embedder registers to receive [`ScanEvent`]s.
///
/// Events are delivered from worker threads; implementations should return
/// quickly (forward to a channel if real work is needed).
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: ScanEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_event(&self, _event: ScanEvent) {}
}

/// Forwarding into a channel is the common embedding; sending never blocks
/// the scan (events to a disconnected receiver are dropped).
impl EventSink for crossbeam_channel::Sender<ScanEvent> {
    fn on_event(&self, event: ScanEvent) {
        let _send_error = self.try_send(event);
    }
}
