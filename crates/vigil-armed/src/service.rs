//! Armed-State Service: the arm/disarm state machine
//!
//! ```text
//!                 masters absent (AUTOMATIC)
//!   ┌──────────┐ ─────────────────────────► ┌──────────┐
//!   │ DISARMED │                            │  ARMED   │
//!   └──────────┘ ◄───────────────────────── └──────────┘
//!                 master present (AUTOMATIC)
//!
//!   {MANUAL, ARMED|DISARMED}  set mode=MANUAL and the state, evaluator goes idle
//!   {AUTOMATIC, AUTO}         set mode=AUTOMATIC, state untouched
//! ```
//!
//! The evaluator tick and inbound events both take the same async mutex, so
//! two transitions never interleave. The presence probe runs outside that
//! mutex and the mode is checked again before the tick acts on its result, so
//! an override accepted mid-tick wins. Only evaluator transitions are published;
//! operator events are already on the bus and re-publishing them would echo.

use crate::policy::EvaluatorPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vigil_events::{ArmMode, ArmState, ArmedEvent, Event, EventBus, EventHandler, HandlerError};
use vigil_probe::MasterPresence;

#[derive(Debug)]
struct ArmedState {
    mode: ArmMode,
    armed: bool,
    tick_count: u64,
}

/// Point-in-time view of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedSnapshot {
    pub mode: ArmMode,
    pub armed: bool,
    pub tick_count: u64,
}

impl ArmedSnapshot {
    /// Resting state as an [`ArmState`]
    pub fn state(&self) -> ArmState {
        ArmState::from_armed(self.armed)
    }
}

/// Process-wide armed state, owned by the system and shared by handle
pub struct ArmedStateService {
    state: Mutex<ArmedState>,
    bus: EventBus,
    presence: Arc<dyn MasterPresence>,
    policy: EvaluatorPolicy,
}

impl ArmedStateService {
    /// Create the service in `{AUTOMATIC, DISARMED}`
    ///
    /// # Panics
    ///
    /// Panics if the policy does not validate. Configuration is validated at
    /// startup, so this only fires on a programming error.
    pub fn new(bus: EventBus, presence: Arc<dyn MasterPresence>, policy: EvaluatorPolicy) -> Self {
        if let Err(e) = policy.validate() {
            panic!("Invalid evaluator policy: {}", e);
        }

        Self {
            state: Mutex::new(ArmedState {
                mode: ArmMode::Automatic,
                armed: false,
                tick_count: 0,
            }),
            bus,
            presence,
            policy,
        }
    }

    /// One evaluator tick
    ///
    /// Returns the state the system transitioned to, if any.
    pub async fn evaluate(&self) -> Option<ArmState> {
        let tick = {
            let mut state = self.state.lock().await;
            state.tick_count += 1;

            if state.mode != ArmMode::Automatic {
                debug!(tick = state.tick_count, "Manual mode in effect, evaluator idle");
                return None;
            }
            state.tick_count
        };

        // Probed unlocked so operator events apply while the network answers
        let masters_present = self.presence.masters_online().await;

        let mut state = self.state.lock().await;
        if state.mode != ArmMode::Automatic {
            info!(tick, masters_present, "Manual override during evaluation, result discarded");
            return None;
        }

        let transition = match (state.armed, masters_present) {
            (false, false) => {
                state.armed = true;
                Some(ArmState::Armed)
            }
            (true, true) => {
                state.armed = false;
                Some(ArmState::Disarmed)
            }
            _ => None,
        };

        match transition {
            Some(new_state) => {
                self.bus
                    .publish(ArmedEvent::new(ArmMode::Automatic, new_state));
                info!(state = %new_state, masters_present, "System {}", new_state);
            }
            None => {
                debug!(
                    state = %ArmState::from_armed(state.armed),
                    masters_present,
                    tick = state.tick_count,
                    "Arm state unchanged"
                );
            }
        }

        transition
    }

    /// Apply an inbound mode/state request
    pub async fn on_armed_event(&self, event: ArmedEvent) {
        let mut state = self.state.lock().await;

        match (event.mode, event.state) {
            (ArmMode::Manual, ArmState::Armed) => {
                state.mode = ArmMode::Manual;
                state.armed = true;
                info!("System ARMED (manual override)");
            }
            (ArmMode::Manual, ArmState::Disarmed) => {
                state.mode = ArmMode::Manual;
                state.armed = false;
                info!("System DISARMED (manual override)");
            }
            (ArmMode::Automatic, ArmState::Auto) => {
                state.mode = ArmMode::Automatic;
                info!(
                    state = %ArmState::from_armed(state.armed),
                    "Automatic arming restored"
                );
            }
            (mode, arm_state) => {
                info!(%mode, state = %arm_state, "Unsupported armed event, ignoring");
            }
        }
    }

    pub async fn is_armed(&self) -> bool {
        self.state.lock().await.armed
    }

    pub async fn arm_mode(&self) -> ArmMode {
        self.state.lock().await.mode
    }

    pub async fn snapshot(&self) -> ArmedSnapshot {
        let state = self.state.lock().await;
        ArmedSnapshot {
            mode: state.mode,
            armed: state.armed,
            tick_count: state.tick_count,
        }
    }

    pub fn policy(&self) -> &EvaluatorPolicy {
        &self.policy
    }

    /// Evaluator loop; returns once `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_s = self.policy.interval_s,
            initial_delay_s = self.policy.initial_delay_s,
            "Armed-state evaluator active"
        );

        let start = Instant::now() + self.policy.initial_delay();
        let mut interval = tokio::time::interval_at(start, self.policy.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.evaluate().await;
                }
            }
        }

        info!("Armed-state evaluator stopped");
    }
}

#[async_trait]
impl EventHandler for ArmedStateService {
    fn name(&self) -> &str {
        "armed-state"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if let Event::Armed(armed) = event {
            self.on_armed_event(*armed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use vigil_events::EventKind;
    use vigil_probe::testing::StaticPresence;

    struct ArmedRecorder {
        seen: StdMutex<Vec<ArmedEvent>>,
    }

    #[async_trait]
    impl EventHandler for ArmedRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            if let Event::Armed(e) = event {
                self.seen.lock().unwrap().push(*e);
            }
            Ok(())
        }
    }

    fn setup(masters_online: bool) -> (EventBus, Arc<StaticPresence>, Arc<ArmedRecorder>, ArmedStateService) {
        let bus = EventBus::new();
        let recorder = Arc::new(ArmedRecorder {
            seen: StdMutex::new(Vec::new()),
        });
        bus.subscribe(&[EventKind::Armed], recorder.clone()).unwrap();

        let presence = Arc::new(StaticPresence::new(masters_online));
        let service = ArmedStateService::new(bus.clone(), presence.clone(), EvaluatorPolicy::default());
        (bus, presence, recorder, service)
    }

    #[tokio::test]
    async fn test_arms_once_when_masters_absent() {
        let (bus, _presence, recorder, service) = setup(false);

        assert_eq!(service.evaluate().await, Some(ArmState::Armed));
        assert_eq!(service.evaluate().await, None);
        bus.wait_idle().await;

        assert!(service.is_armed().await);
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ArmedEvent::new(ArmMode::Automatic, ArmState::Armed)]
        );
    }

    #[tokio::test]
    async fn test_disarms_when_master_returns() {
        let (bus, presence, recorder, service) = setup(false);

        service.evaluate().await;
        presence.set_online(true);
        assert_eq!(service.evaluate().await, Some(ArmState::Disarmed));
        bus.wait_idle().await;

        assert!(!service.is_armed().await);
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
        assert_eq!(
            recorder.seen.lock().unwrap()[1],
            ArmedEvent::new(ArmMode::Automatic, ArmState::Disarmed)
        );
    }

    #[tokio::test]
    async fn test_disarmed_with_master_present_is_noop() {
        let (bus, _presence, recorder, service) = setup(true);

        assert_eq!(service.evaluate().await, None);
        bus.wait_idle().await;

        assert!(!service.is_armed().await);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_mode_freezes_evaluator() {
        let (_bus, presence, _recorder, service) = setup(false);

        service
            .on_armed_event(ArmedEvent::new(ArmMode::Manual, ArmState::Disarmed))
            .await;
        assert_eq!(service.evaluate().await, None);

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.mode, ArmMode::Manual);
        assert!(!snapshot.armed);
        assert_eq!(snapshot.tick_count, 1);
        assert_eq!(presence.calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_restores_mode_without_touching_state() {
        let (_bus, _presence, _recorder, service) = setup(true);

        service
            .on_armed_event(ArmedEvent::new(ArmMode::Manual, ArmState::Armed))
            .await;
        service
            .on_armed_event(ArmedEvent::new(ArmMode::Automatic, ArmState::Auto))
            .await;

        assert!(service.is_armed().await);
        assert_eq!(service.arm_mode().await, ArmMode::Automatic);
    }

    #[tokio::test]
    async fn test_unsupported_combinations_are_ignored() {
        let (_bus, _presence, _recorder, service) = setup(true);

        service
            .on_armed_event(ArmedEvent::new(ArmMode::Automatic, ArmState::Armed))
            .await;
        service
            .on_armed_event(ArmedEvent::new(ArmMode::Manual, ArmState::Auto))
            .await;

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.mode, ArmMode::Automatic);
        assert!(!snapshot.armed);
    }

    #[tokio::test]
    async fn test_manual_events_are_not_republished() {
        let (bus, _presence, recorder, service) = setup(true);
        let service = Arc::new(service);
        bus.subscribe(&[EventKind::Armed], service.clone()).unwrap();

        bus.publish(ArmedEvent::new(ArmMode::Manual, ArmState::Armed));
        bus.wait_idle().await;

        assert!(service.is_armed().await);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    /// Masters absent, answered after a delay
    struct SlowAbsentPresence;

    #[async_trait]
    impl MasterPresence for SlowAbsentPresence {
        async fn masters_online(&self) -> bool {
            tokio::time::sleep(Duration::from_secs(1)).await;
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_during_slow_tick_wins() {
        let bus = EventBus::new();
        let recorder = Arc::new(ArmedRecorder {
            seen: StdMutex::new(Vec::new()),
        });
        bus.subscribe(&[EventKind::Armed], recorder.clone()).unwrap();

        let service = Arc::new(ArmedStateService::new(
            bus.clone(),
            Arc::new(SlowAbsentPresence),
            EvaluatorPolicy::default(),
        ));
        bus.subscribe(&[EventKind::Armed], service.clone()).unwrap();

        let tick = tokio::spawn({
            let service = service.clone();
            async move { service.evaluate().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(ArmedEvent::new(ArmMode::Manual, ArmState::Disarmed));
        bus.wait_idle().await;

        // Applied while the tick is still waiting on presence
        assert_eq!(service.arm_mode().await, ArmMode::Manual);
        assert!(!tick.is_finished());

        assert_eq!(tick.await.unwrap(), None);
        bus.wait_idle().await;

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![ArmedEvent::new(ArmMode::Manual, ArmState::Disarmed)]
        );
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.mode, ArmMode::Manual);
        assert!(!snapshot.armed);
        assert_eq!(snapshot.tick_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_honours_initial_delay_and_interval() {
        let (_bus, presence, _recorder, service) = setup(true);
        let service = Arc::new(service);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(service.clone().run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(presence.calls(), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(presence.calls(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(presence.calls(), 3);

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(service.snapshot().await.tick_count, 3);
    }

    #[test]
    #[should_panic(expected = "Invalid evaluator policy")]
    fn test_invalid_policy_panics() {
        let policy = EvaluatorPolicy {
            interval_s: 0,
            initial_delay_s: 0,
        };
        ArmedStateService::new(EventBus::new(), Arc::new(StaticPresence::new(false)), policy);
    }
}
