//! In-memory collaborators for tests
//!
//! Shared by this crate's tests and the system-level scenarios in the root
//! crate.

use crate::collaborators::{CaptureTrigger, DetectorFactory, MotionDetector, ObjectStore};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::handle::CameraHandle;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_events::EventBus;

#[derive(Default)]
struct DetectorCounters {
    created: AtomicUsize,
    active: AtomicUsize,
    fail_start: AtomicBool,
}

/// Builds detectors that never publish, counting how many are live
#[derive(Default)]
pub struct FakeDetectorFactory {
    counters: Arc<DetectorCounters>,
}

impl FakeDetectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    /// Detectors started and not yet stopped
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.counters.fail_start.store(fail, Ordering::SeqCst);
    }
}

struct FakeDetector {
    camera: String,
    running: bool,
    counters: Arc<DetectorCounters>,
}

#[async_trait]
impl MotionDetector for FakeDetector {
    async fn start(&mut self) -> Result<(), CameraError> {
        if self.counters.fail_start.load(Ordering::SeqCst) {
            return Err(CameraError::DetectorStart {
                camera: self.camera.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.running = true;
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        if std::mem::take(&mut self.running) {
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl DetectorFactory for FakeDetectorFactory {
    fn create(
        &self,
        _config: &CameraConfig,
        camera: &CameraHandle,
        _bus: EventBus,
    ) -> Box<dyn MotionDetector> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeDetector {
            camera: camera.name.clone(),
            running: false,
            counters: Arc::clone(&self.counters),
        })
    }
}

/// Object store backed by a map
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (String, Bytes)>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every upload take `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// MIME type and bytes stored under `key`
    pub fn get(&self, key: &str) -> Option<(String, Bytes)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<String, CameraError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(CameraError::Storage("scripted upload failure".to_string()));
        }

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (mime_type.to_string(), bytes));
        Ok(format!("memory://{}", key))
    }
}

/// Capture trigger that records which cameras it was asked to capture
///
/// It never releases the capture lock; tests end captures explicitly with
/// [`CameraHandle::finish_capture`].
#[derive(Default)]
pub struct RecordingCapture {
    started: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Camera names in trigger order
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureTrigger for RecordingCapture {
    async fn start_capture(&self, camera: &CameraHandle) -> Result<(), CameraError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CameraError::Capture("scripted capture failure".to_string()));
        }
        self.started.lock().unwrap().push(camera.name.clone());
        Ok(())
    }
}
