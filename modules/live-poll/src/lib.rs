//! Fixed-interval polling of the three monitor views: stream status, recent
//! detections and saved plate images.
//!
//! Each view refreshes independently every round. A failed fetch degrades
//! only its own view and never stops the timer. A resource whose previous
//! fetch is still outstanding is skipped for that round. After [`Poller::shutdown`]
//! the timer stops and any in-flight fetch runs to completion with its
//! result discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use platewatch_core::types::{Detection, PlateImage, StreamStatus};
use platewatch_core::DetectionApi;

/// Default refresh period of the monitor views.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Most recent view of the three polled resources. Cheap to clone; readers
/// never block writers for long.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    /// Last successfully fetched status. Kept across a failed status fetch;
    /// the next successful poll re-syncs it.
    pub status: Option<StreamStatus>,
    pub detections: Vec<Detection>,
    pub images: Vec<PlateImage>,
    /// Scheduler rounds issued so far (including the one at spawn).
    pub rounds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Status,
    Detections,
    Images,
}

impl Resource {
    const ALL: [Resource; 3] = [Resource::Status, Resource::Detections, Resource::Images];

    fn name(self) -> &'static str {
        match self {
            Resource::Status => "status",
            Resource::Detections => "detections",
            Resource::Images => "images",
        }
    }

    fn index(self) -> usize {
        match self {
            Resource::Status => 0,
            Resource::Detections => 1,
            Resource::Images => 2,
        }
    }
}

struct Inner {
    api: Arc<dyn DetectionApi>,
    snapshot: RwLock<PollSnapshot>,
    rounds: AtomicU64,
    closed: AtomicBool,
    in_flight: [AtomicBool; 3],
    detection_limit: Option<u32>,
}

impl Inner {
    /// Apply a snapshot mutation unless the poller has been shut down.
    /// The closed check happens under the write lock, so nothing lands
    /// after `shutdown` has returned.
    async fn store(&self, apply: impl FnOnce(&mut PollSnapshot)) {
        let mut snap = self.snapshot.write().await;
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        apply(&mut snap);
    }

    async fn fetch(&self, resource: Resource) {
        match resource {
            Resource::Status => match self.api.livestream_status().await {
                Ok(status) => self.store(|s| s.status = Some(status)).await,
                Err(e) => tracing::warn!("status fetch failed: {}", e.user_message()),
            },
            Resource::Detections => match self.api.recent_detections(self.detection_limit).await {
                Ok(list) => self.store(|s| s.detections = list).await,
                Err(e) => {
                    tracing::warn!("detections fetch failed: {}", e.user_message());
                    self.store(|s| s.detections = Vec::new()).await;
                }
            },
            Resource::Images => match self.api.plate_images().await {
                Ok(list) => self.store(|s| s.images = list).await,
                Err(e) => {
                    tracing::warn!("plate images fetch failed: {}", e.user_message());
                    self.store(|s| s.images = Vec::new()).await;
                }
            },
        }
    }
}

fn spawn_fetch(inner: &Arc<Inner>, resource: Resource) {
    if inner.closed.load(Ordering::SeqCst) {
        return;
    }
    if inner.in_flight[resource.index()].swap(true, Ordering::SeqCst) {
        tracing::debug!(resource = resource.name(), "previous fetch still outstanding, skipping");
        return;
    }
    let inner = inner.clone();
    tokio::spawn(async move {
        inner.fetch(resource).await;
        inner.in_flight[resource.index()].store(false, Ordering::SeqCst);
    });
}

fn spawn_round(inner: &Arc<Inner>) {
    for resource in Resource::ALL {
        spawn_fetch(inner, resource);
    }
    let rounds = inner.rounds.fetch_add(1, Ordering::SeqCst) + 1;
    let inner = inner.clone();
    tokio::spawn(async move {
        inner.store(|s| s.rounds = rounds).await;
    });
}

/// Repeating monitor of the detection backend.
///
/// Spawning issues an immediate first round, then one round per interval
/// until shutdown.
pub struct Poller {
    inner: Arc<Inner>,
    scheduler: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(api: Arc<dyn DetectionApi>, interval: Duration) -> Self {
        Self::spawn_with(api, interval, None)
    }

    /// `detection_limit` caps the recent-detections window per fetch.
    pub fn spawn_with(
        api: Arc<dyn DetectionApi>,
        interval: Duration,
        detection_limit: Option<u32>,
    ) -> Self {
        let inner = Arc::new(Inner {
            api,
            snapshot: RwLock::new(PollSnapshot::default()),
            rounds: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            in_flight: [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)],
            detection_limit,
        });
        let scheduler = tokio::spawn({
            let inner = inner.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    spawn_round(&inner);
                }
            }
        });
        Poller { inner, scheduler }
    }

    pub async fn snapshot(&self) -> PollSnapshot {
        self.inner.snapshot.read().await.clone()
    }

    /// Out-of-band status refresh, used after lifecycle commands. Subject to
    /// the same in-flight guard as scheduled rounds.
    pub fn refresh_status(&self) {
        spawn_fetch(&self.inner, Resource::Status);
    }

    /// Out-of-band full round.
    pub fn refresh_all(&self) {
        for resource in Resource::ALL {
            spawn_fetch(&self.inner, resource);
        }
    }

    /// Stop the timer. In-flight fetches complete but their results are
    /// discarded; once this returns, the snapshot no longer changes.
    pub async fn shutdown(&self) {
        let _guard = self.inner.snapshot.write().await;
        self.inner.closed.store(true, Ordering::SeqCst);
        self.scheduler.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.scheduler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use platewatch_core::types::{
        Ack, AiStats, PlateProcessReport, PlateSearch, StreamState,
    };
    use platewatch_core::{ApiError, StartRequest};
    use std::sync::atomic::AtomicU32;

    fn running_status() -> StreamStatus {
        StreamStatus {
            is_streaming: true,
            is_task_running: true,
            status: StreamState::Active,
        }
    }

    fn one_detection() -> Detection {
        Detection {
            id: 1,
            license_plate: "AB123CD".to_string(),
            confidence_score: 0.9,
            detection_data: serde_json::Value::Null,
            is_automatic: true,
            created_at: "2024-01-20T10:59:12".to_string(),
        }
    }

    fn one_image() -> PlateImage {
        PlateImage {
            filename: "plate_AB123CD_20231201_143022.jpg".to_string(),
            license_plate: "AB123CD".to_string(),
            timestamp: "20231201_143022".to_string(),
            filepath: "uploads/plates/plate_AB123CD_20231201_143022.jpg".to_string(),
            size_bytes: 20480,
        }
    }

    #[derive(Default)]
    struct StubApi {
        status_calls: AtomicU32,
        detections_calls: AtomicU32,
        images_calls: AtomicU32,
        fail_detections: AtomicBool,
        image_delay_secs: AtomicU32,
    }

    fn unused() -> ApiError {
        ApiError::Status {
            status: 418,
            message: None,
        }
    }

    #[async_trait]
    impl DetectionApi for StubApi {
        async fn livestream_status(&self) -> Result<StreamStatus, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(running_status())
        }

        async fn start_livestream(&self, _req: &StartRequest) -> Result<Ack, ApiError> {
            Err(unused())
        }

        async fn stop_livestream(&self) -> Result<Ack, ApiError> {
            Err(unused())
        }

        async fn recent_detections(&self, _limit: Option<u32>) -> Result<Vec<Detection>, ApiError> {
            self.detections_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_detections.load(Ordering::SeqCst) {
                return Err(ApiError::Transport {
                    message: "connection reset".to_string(),
                });
            }
            Ok(vec![one_detection()])
        }

        async fn plate_images(&self) -> Result<Vec<PlateImage>, ApiError> {
            self.images_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.image_delay_secs.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_secs(delay as u64)).await;
            }
            Ok(vec![one_image()])
        }

        async fn delete_plate_image(&self, _filename: &str) -> Result<Ack, ApiError> {
            Err(unused())
        }

        async fn search_plate(&self, _plate: &str) -> Result<PlateSearch, ApiError> {
            Err(unused())
        }

        async fn process_plate(&self, _plate: &str) -> Result<PlateProcessReport, ApiError> {
            Err(unused())
        }

        async fn ai_stats(&self) -> Result<AiStats, ApiError> {
            Err(unused())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_detections_leaves_other_views_alone() {
        let api = Arc::new(StubApi::default());
        api.fail_detections.store(true, Ordering::SeqCst);
        let poller = Poller::spawn(api.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let snap = poller.snapshot().await;

        // Three rounds happened (t=0, 5, 10); every resource was fetched
        // every round despite detections failing each time.
        assert!(api.detections_calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(
            api.status_calls.load(Ordering::SeqCst),
            api.detections_calls.load(Ordering::SeqCst)
        );
        assert!(snap.detections.is_empty());
        assert_eq!(snap.status.unwrap().status, StreamState::Active);
        assert_eq!(snap.images.len(), 1);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resource_is_skipped_not_stacked() {
        let api = Arc::new(StubApi::default());
        api.image_delay_secs.store(12, Ordering::SeqCst);
        let poller = Poller::spawn(api.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        // Rounds at t=0, 5, 10: the first images fetch (done at t=12) is
        // still outstanding, so rounds 2 and 3 skip images only.
        assert_eq!(api.images_calls.load(Ordering::SeqCst), 1);
        assert!(api.status_calls.load(Ordering::SeqCst) >= 3);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snap = poller.snapshot().await;
        assert_eq!(snap.images.len(), 1);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_in_flight_results() {
        let api = Arc::new(StubApi::default());
        api.image_delay_secs.store(10, Ordering::SeqCst);
        let poller = Poller::spawn(api.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = poller.snapshot().await;
        assert!(before.images.is_empty());

        poller.shutdown().await;
        assert!(poller.is_closed());

        // Let the in-flight images fetch complete; its result must be dropped.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let after = poller.snapshot().await;
        assert!(after.images.is_empty());
        assert_eq!(after.rounds, before.rounds);
        assert_eq!(api.images_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_band_status_refresh() {
        let api = Arc::new(StubApi::default());
        let poller = Poller::spawn(api.clone(), Duration::from_secs(1000));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);

        poller.refresh_status();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 2);
        // Only status was re-fetched out of band.
        assert_eq!(api.detections_calls.load(Ordering::SeqCst), 1);

        poller.shutdown().await;
    }
}
