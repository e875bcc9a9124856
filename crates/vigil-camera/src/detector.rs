//! Polling snapshot detector
//!
//! Fetches the camera's still image every `interval_ms`, compares each frame
//! with the previous one and publishes a `MotionDetectedEvent` when the
//! [`FrameAnalyzer`] reports motion. Stopping cancels the loop before its next
//! cycle; a fetch already in flight is allowed to finish.

use crate::collaborators::{DetectorFactory, MotionDetector};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::handle::CameraHandle;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_events::{EventBus, MotionDetectedEvent, MotionRegion};

/// Source of encoded frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn fetch(&self) -> Result<Bytes, CameraError>;
}

/// Motion found between two frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub region: Option<MotionRegion>,
    /// Percent of the frame that changed
    pub area: f64,
}

/// Compares consecutive frames
pub trait FrameAnalyzer: Send + Sync {
    fn analyze(&self, previous: &[u8], current: &[u8]) -> Option<Motion>;
}

/// Reports motion from the change in encoded frame size
///
/// JPEG size tracks scene content closely enough to flag large changes. It
/// cannot localise motion, so `region` is always `None`.
#[derive(Debug, Clone, Copy)]
pub struct SizeDeltaAnalyzer {
    /// Changes below this percentage are sensor noise
    pub noise_level: f64,
    /// Changes at or above this percentage are motion
    pub motion_area: f64,
}

impl SizeDeltaAnalyzer {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            noise_level: f64::from(config.noise_level),
            motion_area: f64::from(config.motion_area),
        }
    }
}

impl FrameAnalyzer for SizeDeltaAnalyzer {
    fn analyze(&self, previous: &[u8], current: &[u8]) -> Option<Motion> {
        if previous.is_empty() || current.is_empty() {
            return None;
        }

        let before = previous.len() as f64;
        let after = current.len() as f64;
        let change = (after - before).abs() / before * 100.0;

        if change < self.noise_level || change < self.motion_area {
            return None;
        }

        Some(Motion {
            region: None,
            area: change.min(100.0),
        })
    }
}

/// Snapshot URL fetched over HTTP
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFrameSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn fetch(&self) -> Result<Bytes, CameraError> {
        let response = self.client.get(&self.url).send().await?;
        let frame = response.error_for_status()?.bytes().await?;
        Ok(frame)
    }
}

/// [`MotionDetector`] that polls a [`FrameSource`]
pub struct PollingDetector {
    camera: String,
    interval: Duration,
    source: Option<Arc<dyn FrameSource>>,
    analyzer: Arc<dyn FrameAnalyzer>,
    bus: EventBus,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl PollingDetector {
    /// `source` is `None` when the camera has no snapshot URL; starting such a
    /// detector fails
    pub fn new(
        camera: impl Into<String>,
        interval: Duration,
        source: Option<Arc<dyn FrameSource>>,
        analyzer: Arc<dyn FrameAnalyzer>,
        bus: EventBus,
    ) -> Self {
        Self {
            camera: camera.into(),
            interval,
            source,
            analyzer,
            bus,
            token: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

#[async_trait]
impl MotionDetector for PollingDetector {
    async fn start(&mut self) -> Result<(), CameraError> {
        if self.task.is_some() {
            return Err(CameraError::DetectorStart {
                camera: self.camera.clone(),
                reason: "detector already running".to_string(),
            });
        }

        let source = self.source.clone().ok_or_else(|| CameraError::DetectorStart {
            camera: self.camera.clone(),
            reason: "no snapshot URL configured".to_string(),
        })?;

        let token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.camera.clone(),
            self.interval,
            source,
            Arc::clone(&self.analyzer),
            self.bus.clone(),
            token.clone(),
        ));

        self.token = Some(token);
        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        if let Some(token) = self.token.take() {
            token.cancel();
        }

        if let Some(task) = self.task.take() {
            task.await.map_err(|e| CameraError::DetectorStop {
                camera: self.camera.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl Drop for PollingDetector {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

async fn poll_loop(
    camera: String,
    interval: Duration,
    source: Arc<dyn FrameSource>,
    analyzer: Arc<dyn FrameAnalyzer>,
    bus: EventBus,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut previous: Option<Bytes> = None;
    let mut consecutive_failures: u32 = 0;

    info!(camera = %camera, interval_ms = interval.as_millis() as u64, "Motion detector polling");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let frame = match source.fetch().await {
            Ok(frame) => {
                consecutive_failures = 0;
                frame
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures == 1 {
                    warn!(camera = %camera, error = %e, "Snapshot fetch failed");
                } else {
                    debug!(camera = %camera, consecutive_failures, error = %e, "Snapshot fetch still failing");
                }
                continue;
            }
        };

        if let Some(prev) = previous.as_ref() {
            if let Some(motion) = analyzer.analyze(prev, &frame) {
                let event_id = Uuid::new_v4().to_string();
                debug!(camera = %camera, %event_id, area = motion.area, "Motion detected");
                bus.publish(MotionDetectedEvent {
                    camera_name: camera.clone(),
                    image: frame.clone(),
                    motion_region: motion.region,
                    motion_area: motion.area,
                    event_id,
                    detected_at: Utc::now(),
                });
            }
        }
        previous = Some(frame);
    }

    debug!(camera = %camera, "Motion detector loop stopped");
}

/// Builds [`PollingDetector`]s over HTTP snapshots
pub struct PollingDetectorFactory {
    client: reqwest::Client,
}

impl PollingDetectorFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl DetectorFactory for PollingDetectorFactory {
    fn create(
        &self,
        config: &CameraConfig,
        camera: &CameraHandle,
        bus: EventBus,
    ) -> Box<dyn MotionDetector> {
        let source = camera.urls.jpeg.as_ref().map(|url| {
            Arc::new(HttpFrameSource::new(self.client.clone(), url.clone())) as Arc<dyn FrameSource>
        });

        Box::new(PollingDetector::new(
            camera.name.clone(),
            config.interval(),
            source,
            Arc::new(SizeDeltaAnalyzer::from_config(config)),
            bus,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vigil_events::{Event, EventHandler, EventKind, HandlerError};

    /// Plays back a fixed sequence of frame sizes, then repeats the last one
    struct ScriptedSource {
        frames: Mutex<VecDeque<usize>>,
        last: Mutex<usize>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(sizes: &[usize]) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(sizes.iter().copied().collect()),
                last: Mutex::new(0),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn fetch(&self) -> Result<Bytes, CameraError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let size = match self.frames.lock().unwrap().pop_front() {
                Some(size) => {
                    *self.last.lock().unwrap() = size;
                    size
                }
                None => *self.last.lock().unwrap(),
            };
            Ok(Bytes::from(vec![0xAB; size]))
        }
    }

    struct MotionCounter {
        seen: Mutex<Vec<MotionDetectedEvent>>,
    }

    #[async_trait]
    impl EventHandler for MotionCounter {
        fn name(&self) -> &str {
            "motion-counter"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            if let Event::MotionDetected(e) = event {
                self.seen.lock().unwrap().push(e.clone());
            }
            Ok(())
        }
    }

    fn analyzer() -> Arc<dyn FrameAnalyzer> {
        Arc::new(SizeDeltaAnalyzer {
            noise_level: 5.0,
            motion_area: 20.0,
        })
    }

    #[test]
    fn test_size_delta_thresholds() {
        let analyzer = SizeDeltaAnalyzer {
            noise_level: 5.0,
            motion_area: 20.0,
        };

        assert!(analyzer.analyze(&[0; 1000], &[0; 1040]).is_none());
        assert!(analyzer.analyze(&[0; 1000], &[0; 1150]).is_none());

        let motion = analyzer.analyze(&[0; 1000], &[0; 1300]).unwrap();
        assert!((motion.area - 30.0).abs() < 1e-9);
        assert!(motion.region.is_none());

        assert!(analyzer.analyze(&[], &[0; 10]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_motion_between_frames() {
        let bus = EventBus::new();
        let counter = Arc::new(MotionCounter {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(&[EventKind::MotionDetected], counter.clone())
            .unwrap();

        let source = ScriptedSource::new(&[1000, 1010, 1600, 1600]);
        let mut detector = PollingDetector::new(
            "porch",
            Duration::from_millis(500),
            Some(source.clone() as Arc<dyn FrameSource>),
            analyzer(),
            bus.clone(),
        );

        detector.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1800)).await;
        detector.stop().await.unwrap();
        bus.wait_idle().await;

        let seen = counter.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].camera_name, "porch");
        assert_eq!(seen[0].image.len(), 1600);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_next_cycle() {
        let source = ScriptedSource::new(&[1000]);
        let mut detector = PollingDetector::new(
            "porch",
            Duration::from_secs(1),
            Some(source.clone() as Arc<dyn FrameSource>),
            analyzer(),
            EventBus::new(),
        );

        detector.start().await.unwrap();
        assert!(detector.is_running());
        tokio::time::sleep(Duration::from_millis(10)).await;
        detector.stop().await.unwrap();
        assert!(!detector.is_running());

        let fetched = source.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), fetched);
    }

    #[tokio::test]
    async fn test_start_without_source_fails() {
        let mut detector = PollingDetector::new(
            "attic",
            Duration::from_secs(1),
            None,
            analyzer(),
            EventBus::new(),
        );

        let err = detector.start().await.unwrap_err();
        assert!(matches!(err, CameraError::DetectorStart { .. }));
        assert!(detector.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let source = ScriptedSource::new(&[1000]);
        let mut detector = PollingDetector::new(
            "porch",
            Duration::from_secs(1),
            Some(source as Arc<dyn FrameSource>),
            analyzer(),
            EventBus::new(),
        );

        detector.start().await.unwrap();
        assert!(detector.start().await.is_err());
        detector.stop().await.unwrap();
    }
}
