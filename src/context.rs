use std::sync::Arc;

use crate::api::health::HealthState;
use crate::config::Config;
use crate::provider::{Announcer, GameProvider};
use crate::store::Store;

/// Everything a task needs, handed to each component at construction.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub games: Arc<dyn GameProvider>,
    pub announcer: Arc<dyn Announcer>,
    pub health: Arc<HealthState>,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        games: Arc<dyn GameProvider>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            games,
            announcer,
            health: Arc::new(HealthState::new()),
        }
    }
}
