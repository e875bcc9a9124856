/*!
 * Shell hooks for arm-state changes and daemon lifecycle
 */

use crate::config::HooksConfig;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vigil_events::{ArmState, Event, EventHandler, EventKind, HandlerError};

/// Runs the configured `[hooks]` commands through `sh -c`
///
/// Commands of one hook run one after another. Output is logged; failures
/// never propagate.
#[derive(Debug, Clone)]
pub struct CommandHooks {
    config: HooksConfig,
}

impl CommandHooks {
    pub const SUBSCRIBED_KINDS: [EventKind; 1] = [EventKind::Armed];

    pub fn new(config: HooksConfig) -> Self {
        Self { config }
    }

    pub async fn on_start(&self) -> usize {
        run_all("on_start", &self.config.on_start).await
    }

    pub async fn on_stop(&self) -> usize {
        run_all("on_stop", &self.config.on_stop).await
    }

    pub async fn on_arm_state(&self, state: ArmState) -> usize {
        match state {
            ArmState::Armed => run_all("on_arm", &self.config.on_arm).await,
            ArmState::Disarmed => run_all("on_disarm", &self.config.on_disarm).await,
            ArmState::Auto => {
                debug!("Automatic mode restored, no hook to run");
                0
            }
        }
    }
}

/// Run every command in order; returns how many succeeded
async fn run_all(hook: &str, commands: &[String]) -> usize {
    let mut succeeded = 0;
    for command in commands {
        if run(hook, command).await {
            succeeded += 1;
        }
    }
    succeeded
}

async fn run(hook: &str, command: &str) -> bool {
    debug!(hook, command, "Running hook");

    let output = match Command::new("sh").arg("-c").arg(command).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(hook, command, error = %e, "Hook failed to start");
            return false;
        }
    };

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(hook, "{}", line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        warn!(hook, "{}", line);
    }

    if !output.status.success() {
        warn!(hook, command, status = %output.status, "Hook exited with failure");
        return false;
    }
    true
}

#[async_trait]
impl EventHandler for CommandHooks {
    fn name(&self) -> &str {
        "command-hooks"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if let Event::Armed(armed) = event {
            self.on_arm_state(armed.state).await;
        }
        Ok(())
    }
}
