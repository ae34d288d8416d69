use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SUPERVISOR_POLL_INTERVAL;
use crate::tasks::Component;

/// Why the supervisor returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    Shutdown,
    Unhealthy(String),
    StartFailed(String),
}

/// Starts components in order, watches their health, and stops them in
/// reverse order once any of them fails or shutdown is requested.
pub struct Supervisor {
    components: Vec<Box<dyn Component>>,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(components: Vec<Box<dyn Component>>) -> Self {
        Self {
            components,
            poll_interval: SUPERVISOR_POLL_INTERVAL,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> SupervisorExit {
        let mut started = 0;
        let mut exit = None;

        for component in self.components.iter_mut() {
            if let Err(e) = component.start().await {
                error!(component = component.name(), error = %e, "Failed to start {}", component.name());
                exit = Some(SupervisorExit::StartFailed(component.name().to_string()));
                break;
            }
            started += 1;
        }

        let exit = match exit {
            Some(exit) => exit,
            None => self.watch(&shutdown).await,
        };

        for component in self.components[..started].iter_mut().rev() {
            component.stop().await;
        }
        info!(?exit, "all components stopped");
        exit
    }

    async fn watch(&self, shutdown: &CancellationToken) -> SupervisorExit {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping components");
                    return SupervisorExit::Shutdown;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Some(bad) = self.components.iter().find(|c| !c.is_healthy()) {
                        warn!(component = bad.name(), "{} is unhealthy, stopping all components", bad.name());
                        return SupervisorExit::Unhealthy(bad.name().to_string());
                    }
                }
            }
        }
    }
}
