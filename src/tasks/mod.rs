pub mod dispatcher;
pub mod game_fetcher;
pub mod game_updater;
pub mod runtime;
pub mod scorhegami;
pub mod supervisor;
pub mod team_sync;

#[cfg(test)]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{
    DETECTOR_INTERVAL_SECS, DISPATCHER_INTERVAL_SECS, GAME_FETCHER_INTERVAL_SECS,
    GAME_UPDATER_INTERVAL_SECS,
};
use crate::error::Result;
use crate::store::StoreTx;

pub use dispatcher::AnnouncementDispatcher;
pub use game_fetcher::GameFetcher;
pub use game_updater::GameUpdater;
pub use runtime::{PollingTask, TaskState};
pub use scorhegami::ScorhegamiDetector;
pub use supervisor::{Supervisor, SupervisorExit};

/// The fixed set of recurring tasks. The name doubles as the advisory lock
/// identifier and the cursor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GameFetcher,
    GameUpdater,
    ScorhegamiDetector,
    AnnouncementDispatcher,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::GameFetcher => "game_fetcher",
            TaskKind::GameUpdater => "game_updater",
            TaskKind::ScorhegamiDetector => "scorhegami_detector",
            TaskKind::AnnouncementDispatcher => "announcement_dispatcher",
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(match self {
            TaskKind::GameFetcher => GAME_FETCHER_INTERVAL_SECS,
            TaskKind::GameUpdater => GAME_UPDATER_INTERVAL_SECS,
            TaskKind::ScorhegamiDetector => DETECTOR_INTERVAL_SECS,
            TaskKind::AnnouncementDispatcher => DISPATCHER_INTERVAL_SECS,
        })
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle shared by everything the supervisor manages.
#[async_trait]
pub trait Component: Send {
    fn name(&self) -> &str;
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self);
    fn is_healthy(&self) -> bool;
}

/// One iteration of a polling task's work.
///
/// The runtime has already taken the task's advisory lock inside `tx`; the
/// cycle owns the transaction from here and must commit it to keep its work.
#[async_trait]
pub trait Cycle: Send + Sync + 'static {
    fn kind(&self) -> TaskKind;
    async fn run(&self, tx: Box<dyn StoreTx>) -> Result<()>;
}
