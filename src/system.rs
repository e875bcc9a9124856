/*!
 * System wiring and lifecycle
 *
 * `HomeSystem` owns every long-lived component: the event bus, the armed
 * state, one controller per camera and the background loops. Callers reach
 * them through the query and command methods; nothing is global.
 */

use crate::capture::CommandCapture;
use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::health::HealthSweep;
use crate::hooks::CommandHooks;
use crate::notify::{LogNotifier, NotificationFanout, Notifier};
use crate::report::StatusReporter;
use crate::storage::LocalObjectStore;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vigil_armed::ArmedStateService;
use vigil_camera::{
    CameraController, CaptureTrigger, ControllerDeps, DetectorFactory, ObjectStore,
    PollingDetectorFactory, RebootClient,
};
use vigil_events::{ArmMode, ArmState, ArmedEvent, EventBus, EventKind, OptionsChangedEvent};
use vigil_probe::{LivenessProbe, PresenceMonitor, TcpProbe};

/// Timeout for a single snapshot fetch
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// The I/O-bound implementations the core drives
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn LivenessProbe>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub storage: Arc<dyn ObjectStore>,
    pub capture: Arc<dyn CaptureTrigger>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Production collaborators for `config`
    pub fn from_config(config: &VigilConfig) -> Result<Self> {
        let snapshots = reqwest::Client::builder()
            .timeout(SNAPSHOT_TIMEOUT)
            .build()?;

        Ok(Self {
            probe: Arc::new(TcpProbe::new(&config.probe)?),
            detectors: Arc::new(PollingDetectorFactory::new(snapshots)),
            storage: Arc::new(LocalObjectStore::new(config.storage.directory.clone())),
            capture: Arc::new(CommandCapture::new(config.capture.clone())),
            notifier: Arc::new(LogNotifier),
        })
    }
}

pub struct HomeSystem {
    bus: EventBus,
    armed: Arc<ArmedStateService>,
    cameras: Vec<Arc<CameraController>>,
    hooks: Arc<CommandHooks>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HomeSystem {
    /// Wire every component, enable autostart cameras and start the
    /// background loops
    pub async fn start(config: &VigilConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new();

        if config.masters.is_empty() {
            warn!("No masters configured, automatic mode will always arm");
        }
        let presence = Arc::new(PresenceMonitor::new(
            config.masters.clone(),
            Arc::clone(&collaborators.probe),
        ));

        let armed = Arc::new(ArmedStateService::new(
            bus.clone(),
            presence.clone(),
            config.system.evaluator_policy(),
        ));
        subscribe(&bus, &[EventKind::Armed], armed.clone())?;

        let deps = ControllerDeps {
            probe: Arc::clone(&collaborators.probe),
            detectors: Arc::clone(&collaborators.detectors),
            storage: Arc::clone(&collaborators.storage),
            capture: Arc::clone(&collaborators.capture),
        };
        let reboot_client = RebootClient::new()?;

        let mut cameras = Vec::with_capacity(config.cameras.len());
        for camera_config in &config.cameras {
            let controller = Arc::new(CameraController::new(
                camera_config.clone(),
                deps.clone(),
                bus.clone(),
                reboot_client.clone(),
            )?);
            subscribe(&bus, &CameraController::SUBSCRIBED_KINDS, controller.clone())?;
            cameras.push(controller);
        }

        let fanout = Arc::new(NotificationFanout::new(Arc::clone(
            &collaborators.notifier,
        )));
        subscribe(&bus, &NotificationFanout::SUBSCRIBED_KINDS, fanout)?;

        let hooks = Arc::new(CommandHooks::new(config.hooks.clone()));
        subscribe(&bus, &CommandHooks::SUBSCRIBED_KINDS, hooks.clone())?;

        autostart(&cameras).await;
        hooks.on_start().await;

        let shutdown = CancellationToken::new();
        let sweep = Arc::new(HealthSweep::new(
            &cameras,
            bus.clone(),
            config.system.health_check_interval(),
        ));
        let reporter = Arc::new(StatusReporter::new(
            armed.clone(),
            cameras.clone(),
            presence,
            Arc::clone(&collaborators.notifier),
            config.system.report_interval(),
            config.system.report_when_disarmed,
        ));

        let tasks = vec![
            tokio::spawn(armed.clone().run(shutdown.clone())),
            tokio::spawn(sweep.run(shutdown.clone())),
            tokio::spawn(reporter.run(shutdown.clone())),
        ];

        info!(cameras = cameras.len(), masters = config.masters.len(), "Vigil started");

        Ok(Self {
            bus,
            armed,
            cameras,
            hooks,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn armed(&self) -> &Arc<ArmedStateService> {
        &self.armed
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.name()).collect()
    }

    pub fn camera(&self, name: &str) -> Result<&Arc<CameraController>> {
        self.cameras
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| VigilError::UnknownCamera(name.to_string()))
    }

    pub async fn is_armed(&self) -> bool {
        self.armed.is_armed().await
    }

    pub async fn arm_mode(&self) -> ArmMode {
        self.armed.arm_mode().await
    }

    pub fn is_detector_enabled(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.is_detector_enabled())
    }

    pub fn is_recording_in_progress(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.is_recording_in_progress())
    }

    pub fn is_reboot_in_progress(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.is_reboot_in_progress())
    }

    pub async fn enable_motion_detection(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.enable_motion_detection().await?)
    }

    pub async fn disable_motion_detection(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.disable_motion_detection().await)
    }

    /// Issue the reboot request; the camera stays marked as rebooting until
    /// [`reboot_complete`](Self::reboot_complete)
    pub async fn perform_reboot(&self, camera: &str) -> Result<u16> {
        Ok(self.camera(camera)?.perform_reboot().await?)
    }

    pub fn reboot_complete(&self, camera: &str) -> Result<bool> {
        Ok(self.camera(camera)?.reboot_complete())
    }

    /// Publish an operator arm request
    pub fn inject_armed_event(&self, mode: ArmMode, state: ArmState) {
        info!(%mode, %state, "Operator armed event");
        self.bus.publish(ArmedEvent::new(mode, state));
    }

    /// Publish runtime camera options
    pub fn apply_options(&self, options: OptionsChangedEvent) {
        self.bus.publish(options);
    }

    /// Wait until every published event has been handled
    pub async fn wait_idle(&self) {
        self.bus.wait_idle().await;
    }

    /// Stop loops and detectors, run stop hooks and drain the bus
    pub async fn shutdown(&self) {
        info!("Vigil shutting down");
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task terminated abnormally");
            }
        }

        self.bus.wait_idle().await;
        join_all(self.cameras.iter().map(|c| c.stop_detector())).await;
        self.hooks.on_stop().await;
        self.bus.shutdown().await;

        info!("Vigil stopped");
    }
}

fn subscribe(
    bus: &EventBus,
    kinds: &[EventKind],
    handler: Arc<dyn vigil_events::EventHandler>,
) -> Result<()> {
    bus.subscribe(kinds, handler)
        .map(|_| ())
        .map_err(|e| VigilError::Config(format!("event subscription failed: {}", e)))
}

/// Enable detection on cameras configured to start monitoring immediately
async fn autostart(cameras: &[Arc<CameraController>]) {
    let starting = cameras.iter().filter(|c| {
        let config = c.config();
        config.autostart_monitoring || config.continuous_monitoring
    });

    join_all(starting.map(|camera| async move {
        if let Err(e) = camera.enable_motion_detection().await {
            error!(camera = %camera.name(), error = %e, "Autostart failed");
        }
    }))
    .await;
}
