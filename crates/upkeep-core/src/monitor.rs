//! Periodic resource monitor
//!
//! Samples memory on its own timer while a run is in flight. Samples go
//! out over a bounded channel; when the consumer falls behind, new
//! samples are dropped instead of stalling the sampler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::resources::SystemProbe;

/// One memory sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub available_memory_mb: Option<u64>,
    pub process_memory_mb: Option<u64>,
}

/// Folded view of the samples taken during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub samples: usize,
    pub peak_process_mb: Option<u64>,
    pub lowest_available_mb: Option<u64>,
}

impl MonitorSummary {
    pub fn observe(&mut self, sample: &ResourceSample) {
        self.samples += 1;
        if let Some(mb) = sample.process_memory_mb {
            self.peak_process_mb = Some(self.peak_process_mb.map_or(mb, |p| p.max(mb)));
        }
        if let Some(mb) = sample.available_memory_mb {
            self.lowest_available_mb = Some(self.lowest_available_mb.map_or(mb, |l| l.min(mb)));
        }
    }

    /// Consume samples until the monitor stops
    pub async fn collect(mut rx: mpsc::Receiver<ResourceSample>) -> Self {
        let mut summary = Self::default();
        while let Some(sample) = rx.recv().await {
            summary.observe(&sample);
        }
        summary
    }
}

/// Shortest sampling period; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct ResourceMonitor;

impl ResourceMonitor {
    /// Start sampling every `interval` until `cancel` fires
    ///
    /// The receiver yields `None` once the sampler has stopped. Periods
    /// below one millisecond are raised to one millisecond.
    pub fn spawn(
        probe: Arc<dyn SystemProbe>,
        interval: Duration,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, mpsc::Receiver<ResourceSample>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut dropped = 0u64;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let sample = ResourceSample {
                    timestamp: Utc::now(),
                    available_memory_mb: probe.available_memory_mb(),
                    process_memory_mb: probe.process_memory_mb(),
                };

                match tx.try_send(sample) {
                    Ok(()) => trace!("resource sample sent"),
                    Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            debug!(dropped, "resource monitor stopped");
        });

        (handle, rx)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    struct Steady;

    impl SystemProbe for Steady {
        fn available_disk_bytes(&self, _path: &Path) -> Option<u64> {
            None
        }

        fn available_memory_mb(&self) -> Option<u64> {
            Some(2048)
        }

        fn process_memory_mb(&self) -> Option<u64> {
            Some(64)
        }
    }

    #[tokio::test]
    async fn test_samples_until_cancelled() {
        let cancel = CancellationToken::new();
        let (handle, mut rx) =
            ResourceMonitor::spawn(Arc::new(Steady), Duration::from_millis(10), 4, cancel.clone());

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.available_memory_mb, Some(2048));
        assert_eq!(sample.process_memory_mb, Some(64));

        cancel.cancel();
        handle.await.unwrap();
        while rx.recv().await.is_some() {}
    }

    #[test]
    fn test_summary_tracks_extremes() {
        let mut summary = MonitorSummary::default();
        for (available, process) in [(Some(900), Some(40)), (Some(700), None), (None, Some(90))] {
            summary.observe(&ResourceSample {
                timestamp: Utc::now(),
                available_memory_mb: available,
                process_memory_mb: process,
            });
        }

        assert_eq!(summary.samples, 3);
        assert_eq!(summary.peak_process_mb, Some(90));
        assert_eq!(summary.lowest_available_mb, Some(700));
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_block() {
        let cancel = CancellationToken::new();
        let (handle, mut rx) =
            ResourceMonitor::spawn(Arc::new(Steady), Duration::from_millis(1), 1, cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let cancel = CancellationToken::new();
        let (handle, mut rx) =
            ResourceMonitor::spawn(Arc::new(Steady), Duration::ZERO, 4, cancel.clone());

        assert!(rx.recv().await.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
