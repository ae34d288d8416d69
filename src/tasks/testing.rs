//! Test doubles for the provider seams plus a context wired to [`MemoryStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{test_config, Config};
use crate::context::AppContext;
use crate::error::{DeliveryError, ProviderError};
use crate::provider::{Announcer, GameProvider, ProviderGame, ProviderTeam, TeamLine};
use crate::store::memory::MemoryStore;
use crate::types::GameStatus;

#[derive(Debug, Clone)]
pub enum StubGame {
    Found(ProviderGame),
    NotFound,
    Unavailable,
}

#[derive(Default)]
pub struct StubProvider {
    pub listed: Mutex<Vec<ProviderGame>>,
    pub by_id: Mutex<HashMap<i64, StubGame>>,
    pub teams: Mutex<Vec<ProviderTeam>>,
    /// Every date slice passed to `list_games`, in call order.
    pub requested_dates: Mutex<Vec<Vec<NaiveDate>>>,
    pub unreachable: AtomicBool,
    pub get_delay: Mutex<Option<Duration>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn set_game(&self, id: i64, game: StubGame) {
        self.by_id.lock().unwrap().insert(id, game);
    }
}

#[async_trait]
impl GameProvider for StubProvider {
    async fn list_games(&self, dates: &[NaiveDate]) -> Result<Vec<ProviderGame>, ProviderError> {
        self.requested_dates.lock().unwrap().push(dates.to_vec());
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn get_game(&self, id: i64) -> Result<ProviderGame, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let found = self.by_id.lock().unwrap().get(&id).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match found {
            Some(StubGame::Found(game)) => Ok(game),
            Some(StubGame::NotFound) | None => Err(ProviderError::NotFound),
            Some(StubGame::Unavailable) => Err(ProviderError::Status {
                status: 500,
                message: "internal error".to_string(),
            }),
        }
    }

    async fn list_teams(&self) -> Result<Vec<ProviderTeam>, ProviderError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::RateLimited("slow down".to_string()));
        }
        Ok(self.teams.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct StubAnnouncer {
    pub posted: Mutex<Vec<String>>,
    pub reject: AtomicBool,
}

#[async_trait]
impl Announcer for StubAnnouncer {
    async fn post(&self, text: &str) -> Result<String, DeliveryError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 403,
                message: "duplicate content".to_string(),
            });
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push(text.to_string());
        Ok(format!("post-{}", posted.len()))
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub store: MemoryStore,
    pub provider: Arc<StubProvider>,
    pub announcer: Arc<StubAnnouncer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::new();
        let provider = Arc::new(StubProvider::default());
        let announcer = Arc::new(StubAnnouncer::default());
        let ctx = AppContext::new(
            config,
            Arc::new(store.clone()),
            provider.clone(),
            announcer.clone(),
        );
        Self {
            ctx,
            store,
            provider,
            announcer,
        }
    }
}

pub fn team(id: i64, name: &str, abbreviation: &str) -> ProviderTeam {
    ProviderTeam {
        id,
        display_name: name.to_string(),
        abbreviation: Some(abbreviation.to_string()),
    }
}

/// A provider game between two teams with no line score yet.
pub fn scheduled(id: i64, away: ProviderTeam, home: ProviderTeam, date: DateTime<Utc>) -> ProviderGame {
    ProviderGame {
        id,
        home_team: home,
        away_team: away,
        date: Some(date),
        status: GameStatus::Scheduled,
        home_team_data: None,
        away_team_data: None,
    }
}

pub fn line(innings: &[i32], runs: i32, hits: i32, errors: i32) -> TeamLine {
    TeamLine {
        runs,
        hits,
        errors,
        inning_scores: innings.to_vec(),
    }
}
