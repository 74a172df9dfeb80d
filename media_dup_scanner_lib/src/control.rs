use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::Relaxed};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::definitions::{PAUSE_POLL_INTERVAL, PROGRESS_EMIT_INTERVAL};
use crate::events::{EventSink, ScanEvent, ScanProgress};

/// Returned from a checkpoint when the scan has been cancelled. Workers
/// propagate it upward with `?`; it never escapes the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Pause/cancel coordination for one scan, shared by all workers.
///
/// Both signals are plain atomic flags. Workers observe them only at unit
/// boundaries via [`checkpoint`](Self::checkpoint); a blocking decoder call
/// already in flight runs to completion.
#[derive(Debug, Default)]
pub(crate) struct ScanControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    stopwatch: Mutex<PausableStopwatch>,
}

impl ScanControl {
    /// Clear both flags and restart the scan clock.
    pub fn reset(&self) {
        self.paused.store(false, Relaxed);
        self.cancelled.store(false, Relaxed);
        *self.stopwatch.lock() = PausableStopwatch::started();
    }

    /// Sleep while paused, then report whether the scan may continue.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        while self.paused.load(Relaxed) && !self.cancelled.load(Relaxed) {
            std::thread::sleep(PAUSE_POLL_INTERVAL);
        }

        if self.cancelled.load(Relaxed) {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Relaxed);
        self.stopwatch.lock().pause();
    }

    pub fn resume(&self) {
        self.stopwatch.lock().resume();
        self.paused.store(false, Relaxed);
    }

    /// Cancel the scan. Resumes first so paused workers can observe the
    /// cancellation and exit.
    pub fn cancel(&self) {
        self.resume();
        self.cancelled.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.stopwatch.lock().elapsed()
    }
}

/// A stopwatch that stops accumulating while the scan is paused, keeping
/// ETA estimates meaningful across pauses.
#[derive(Debug, Default)]
pub(crate) struct PausableStopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl PausableStopwatch {
    pub fn started() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }
    }

    pub fn pause(&mut self) {
        if let Some(started) = self.running_since.take() {
            self.accumulated += started.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        let running = self
            .running_since
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO);

        self.accumulated + running
    }
}

/// Counts completed work units for one phase and emits throttled progress
/// events.
pub(crate) struct ProgressTracker<'a> {
    control: &'a ScanControl,
    sink: &'a Arc<dyn EventSink>,
    total: usize,
    processed: AtomicUsize,
    last_emit: Mutex<Instant>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(control: &'a ScanControl, sink: &'a Arc<dyn EventSink>, total: usize) -> Self {
        Self {
            control,
            sink,
            total,
            processed: AtomicUsize::new(0),
            // backdate so the first completed unit reports immediately
            last_emit: Mutex::new(
                Instant::now()
                    .checked_sub(PROGRESS_EMIT_INTERVAL)
                    .unwrap_or_else(Instant::now),
            ),
        }
    }

    /// Record one completed unit. Emits a progress event if the throttle
    /// interval has passed, and always for the final unit.
    pub fn tick(&self, current_path: &Path) {
        let processed = self.processed.fetch_add(1, Relaxed) + 1;
        let is_final = processed == self.total;

        if !is_final {
            let mut last_emit = self.last_emit.lock();
            if last_emit.elapsed() < PROGRESS_EMIT_INTERVAL {
                return;
            }
            *last_emit = Instant::now();
        }

        let elapsed = self.control.elapsed();
        self.sink.on_event(ScanEvent::Progress(ScanProgress {
            processed,
            total: self.total,
            current_path: current_path.to_path_buf(),
            elapsed,
            estimated_remaining: estimate_remaining(elapsed, processed, self.total),
        }));
    }
}

// remaining = elapsed * (total - index - 1) / (index + 1), where index is the
// zero-based index of the unit just completed.
fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Duration {
    if processed == 0 || total <= processed {
        return Duration::ZERO;
    }

    elapsed.mul_f64((total - processed) as f64 / processed as f64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel_escapes_pause() {
        let control = ScanControl::default();
        control.reset();
        control.pause();
        control.cancel();
        assert_eq!(control.checkpoint(), Err(Cancelled));
    }

    #[test]
    fn test_checkpoint_passes_when_idle() {
        let control = ScanControl::default();
        control.reset();
        assert_eq!(control.checkpoint(), Ok(()));
    }

    #[test]
    fn test_remaining_estimate() {
        let elapsed = Duration::from_secs(10);
        // halfway through: as much again remains
        assert_eq!(estimate_remaining(elapsed, 5, 10), Duration::from_secs(10));
        // done
        assert_eq!(estimate_remaining(elapsed, 10, 10), Duration::ZERO);
    }

    #[test]
    fn test_stopwatch_does_not_accumulate_while_paused() {
        let mut watch = PausableStopwatch::started();
        watch.pause();
        let at_pause = watch.elapsed();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(watch.elapsed(), at_pause);

        watch.resume();
        std::thread::sleep(Duration::from_millis(5));
        assert!(watch.elapsed() > at_pause);
    }
}
