//! Progress reporting for in-flight transfers.
//!
//! The transfer publishes its byte count into a `watch` channel, which only
//! ever holds the latest value. A small forwarder task drains it into the
//! [`ProgressSink`] at most once per interval, so a slow presentation layer
//! delays only the forwarder and never the transfer. Finishing cuts the
//! throttle short and waits at most [`FINISH_GRACE`] for the sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Default minimum spacing between two sink updates.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Longest a finishing transfer waits for the sink to take its last update.
pub const FINISH_GRACE: Duration = Duration::from_millis(250);

/// Snapshot of a transfer's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Resource being fetched.
    pub url: Url,
    /// Bytes of the destination file present so far, including resumed bytes.
    pub bytes_transferred: u64,
    /// Expected size, when the server reported one.
    pub total_bytes: Option<u64>,
}

/// Consumer of progress updates (console, UI, log).
pub trait ProgressSink: Send + Sync {
    /// Called at a bounded rate while bytes arrive.
    fn on_progress(&self, update: &ProgressUpdate);

    /// Called once after the last update for a transfer.
    fn on_finish(&self, _update: &ProgressUpdate) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Throttled, non-blocking bridge from one transfer to a [`ProgressSink`].
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<ProgressUpdate>,
    done: oneshot::Sender<()>,
    forwarder: JoinHandle<()>,
}

impl ProgressReporter {
    /// Starts forwarding updates for `url` to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn ProgressSink>,
        url: Url,
        initial_bytes: u64,
        total_bytes: Option<u64>,
        interval: Duration,
    ) -> Self {
        let initial = ProgressUpdate {
            url,
            bytes_transferred: initial_bytes,
            total_bytes,
        };
        let (tx, mut rx) = watch::channel(initial);
        let (done, mut done_rx) = oneshot::channel::<()>();

        let forwarder = tokio::spawn(async move {
            let mut delivered = rx.borrow_and_update().clone();
            sink.on_progress(&delivered);
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        delivered = rx.borrow_and_update().clone();
                        sink.on_progress(&delivered);
                    }
                    _ = &mut done_rx => break,
                }
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = &mut done_rx => break,
                }
            }
            let last = rx.borrow().clone();
            if last.bytes_transferred != delivered.bytes_transferred {
                sink.on_progress(&last);
            }
            sink.on_finish(&last);
        });

        Self {
            tx,
            done,
            forwarder,
        }
    }

    /// Publishes the current byte count. Never waits.
    pub fn report(&self, bytes_transferred: u64) {
        self.tx.send_if_modified(|update| {
            if update.bytes_transferred == bytes_transferred {
                false
            } else {
                update.bytes_transferred = bytes_transferred;
                true
            }
        });
    }

    /// Flushes the last update to the sink.
    ///
    /// Skips any remaining throttle delay and gives up on a sink that takes
    /// longer than [`FINISH_GRACE`]; the forwarder then completes detached.
    pub async fn finish(self) {
        let Self {
            tx,
            done,
            mut forwarder,
        } = self;
        drop(tx);
        drop(done);
        match tokio::time::timeout(FINISH_GRACE, &mut forwarder).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(error = %error, "progress forwarder ended abnormally"),
            Err(_) => debug!("progress sink still busy; not waiting for it"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<u64>>,
        finished: Mutex<Option<ProgressUpdate>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, update: &ProgressUpdate) {
            self.updates.lock().unwrap().push(update.bytes_transferred);
        }

        fn on_finish(&self, update: &ProgressUpdate) {
            *self.finished.lock().unwrap() = Some(update.clone());
        }
    }

    fn url() -> Url {
        Url::parse("https://data.example.org/granule.h5").unwrap()
    }

    #[tokio::test]
    async fn test_reporter_delivers_final_count() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::spawn(
            sink.clone(),
            url(),
            1000,
            Some(5000),
            Duration::from_millis(50),
        );
        for bytes in (1000..=5000).step_by(500) {
            reporter.report(bytes);
        }
        reporter.finish().await;

        let finished = sink.finished.lock().unwrap().clone().unwrap();
        assert_eq!(finished.bytes_transferred, 5000);
        assert_eq!(finished.total_bytes, Some(5000));
        assert_eq!(*sink.updates.lock().unwrap().last().unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_reporter_throttles_burst() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::spawn(
            sink.clone(),
            url(),
            0,
            None,
            Duration::from_secs(60),
        );
        tokio::task::yield_now().await;
        for bytes in 1..=1000 {
            reporter.report(bytes);
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        // Only the latest value of the burst reaches the sink.
        assert_eq!(*sink.updates.lock().unwrap(), vec![0, 1000]);
        reporter.forwarder.abort();
    }

    #[tokio::test]
    async fn test_finish_skips_throttle_delay() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::spawn(
            sink.clone(),
            url(),
            0,
            Some(4000),
            Duration::from_secs(30),
        );
        for bytes in [1000, 2000, 3000, 4000] {
            reporter.report(bytes);
            tokio::task::yield_now().await;
        }

        let started = std::time::Instant::now();
        reporter.finish().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        let finished = sink.finished.lock().unwrap().clone().unwrap();
        assert_eq!(finished.bytes_transferred, 4000);
        assert_eq!(*sink.updates.lock().unwrap().last().unwrap(), 4000);
    }

    struct SlowFinishSink;

    impl ProgressSink for SlowFinishSink {
        fn on_progress(&self, _update: &ProgressUpdate) {}

        fn on_finish(&self, _update: &ProgressUpdate) {
            std::thread::sleep(Duration::from_secs(2));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_finish_does_not_wait_for_slow_sink() {
        let reporter = ProgressReporter::spawn(
            Arc::new(SlowFinishSink),
            url(),
            0,
            None,
            Duration::from_millis(10),
        );
        reporter.report(10);

        let started = std::time::Instant::now();
        reporter.finish().await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_null_progress_accepts_updates() {
        let update = ProgressUpdate {
            url: url(),
            bytes_transferred: 1,
            total_bytes: None,
        };
        NullProgress.on_progress(&update);
        NullProgress.on_finish(&update);
    }
}
