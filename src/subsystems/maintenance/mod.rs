//! Maintenance subsystem: log rotation.
//!
//! Rotation runs once at startup and once at shutdown (driven from `main`).
//! With `maintenance.check_interval_secs > 0` a [`RotationTick`] component
//! also checks the log periodically until shutdown.

pub mod rotation;

pub use rotation::LogRotator;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::subsystems::runtime::{Component, ComponentFuture};

/// Run one rotation check, logging instead of propagating failures.
///
/// Rotation must never take the process down; a failed check leaves the
/// live log intact and is retried at the next check point.
pub fn rotate_logged(rotator: &LogRotator) {
    match rotator.maybe_archive() {
        Ok(Some(_)) | Ok(None) => {}
        Err(e) => error!(log = %rotator.log_path().display(), "log rotation failed: {e}"),
    }
}

/// Periodic rotation check, run as a runtime [`Component`].
pub struct RotationTick {
    rotator: LogRotator,
    interval: Duration,
}

impl RotationTick {
    pub fn new(rotator: LogRotator, interval: Duration) -> Self {
        Self { rotator, interval }
    }
}

impl Component for RotationTick {
    fn id(&self) -> &str {
        "rotation"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; startup rotation already ran.
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs(), "log rotation tick started");

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        debug!("log rotation tick stopping");
                        break;
                    }

                    _ = ticker.tick() => {
                        let rotator = self.rotator.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || rotate_logged(&rotator)).await {
                            error!("log rotation task panicked: {e}");
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tick_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let rotator = LogRotator::new(tmp.path().join("app.log"), tmp.path().join("archives"), 1);
        let tick = Box::new(RotationTick::new(rotator, Duration::from_secs(3600)));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tick.run(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn tick_rotates_oversized_log() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("app.log");
        fs::write(&log, vec![b'x'; 4096]).unwrap();
        let rotator = LogRotator::new(&log, tmp.path().join("archives"), 1);
        let tick = Box::new(RotationTick::new(rotator, Duration::from_millis(10)));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(tick.run(shutdown.clone()));

        for _ in 0..200 {
            if fs::metadata(&log).unwrap().len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::read_dir(tmp.path().join("archives")).unwrap().count(), 1);
    }

    #[test]
    fn rotate_logged_swallows_errors() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("app.log");
        fs::write(&log, vec![b'x'; 4096]).unwrap();
        let blocker = tmp.path().join("archives");
        fs::write(&blocker, b"file").unwrap();

        rotate_logged(&LogRotator::new(&log, &blocker, 1));
        assert_eq!(fs::metadata(&log).unwrap().len(), 4096);
    }
}
