//! In-memory [`Store`] for tests.
//!
//! Each transaction works on a private copy of the state and publishes it on
//! commit. Advisory locks are shared across transactions and released when the
//! owning transaction is committed, rolled back, or dropped.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::store::{Store, StoreTx};
use crate::types::{
    game_date_for, Announcement, AnnouncementStatus, Cursor, DeliveryOutcome, FinishedGame, Game,
    GameStateUpdate, GameStatus, NewGame, NewTeam, Team,
};

#[derive(Debug, Clone, Default)]
pub struct MemState {
    pub teams: Vec<Team>,
    pub games: Vec<Game>,
    pub cursors: HashMap<String, DateTime<Utc>>,
    pub announcements: Vec<Announcement>,
    next_id: i64,
}

impl MemState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn game(&self, id: i64) -> Option<&Game> {
        self.games.iter().find(|g| g.id == id)
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemState>,
    locks: Mutex<HashSet<i64>>,
    /// Games whose announcement insert fails, to exercise mid-batch errors.
    rejected_announcements: Mutex<HashSet<i64>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemState {
        self.shared.state.lock().unwrap().clone()
    }

    pub fn seed_team(&self, provider_id: i64, name: &str, short_name: &str) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state.teams.push(Team {
            id,
            provider_id: Some(provider_id),
            name: name.to_string(),
            short_name: Some(short_name.to_string()),
        });
        id
    }

    /// Inserts a game with the given fields; `id` is assigned by the store.
    pub fn seed_game(&self, game: Game) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state.games.push(Game { id, ..game });
        id
    }

    pub fn seed_announcement(&self, game_id: i64, content: &str, created_at: DateTime<Utc>) -> i64 {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id();
        state.announcements.push(Announcement {
            id,
            game_id,
            content: content.to_string(),
            status: AnnouncementStatus::Pending,
            external_id: None,
            failed_reason: None,
            posted_at: None,
            created_at,
        });
        id
    }

    pub fn reject_announcements_for(&self, game_id: i64) {
        self.shared.rejected_announcements.lock().unwrap().insert(game_id);
    }

    pub fn set_cursor(&self, task_name: &str, at: DateTime<Utc>) {
        let mut state = self.shared.state.lock().unwrap();
        state.cursors.insert(task_name.to_string(), at);
    }
}

/// Template for seeding games in tests.
pub fn blank_game(away_id: i64, home_id: i64) -> Game {
    Game {
        id: 0,
        provider_id: None,
        away_id,
        home_id,
        start_time: None,
        game_date: None,
        end_time: None,
        status: GameStatus::Scheduled,
        box_score: None,
        rhe: None,
        is_scorhegami: None,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let work = self.shared.state.lock().unwrap().clone();
        Ok(Box::new(MemTx {
            shared: Arc::clone(&self.shared),
            work,
            dirty: false,
            held: Vec::new(),
        }))
    }
}

pub struct MemTx {
    shared: Arc<Shared>,
    work: MemState,
    dirty: bool,
    held: Vec<i64>,
}

impl Drop for MemTx {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.shared.locks.lock() {
            for key in self.held.drain(..) {
                locks.remove(&key);
            }
        }
    }
}

#[async_trait]
impl StoreTx for MemTx {
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool> {
        if self.held.contains(&key) {
            return Ok(true);
        }
        let mut locks = self.shared.locks.lock().unwrap();
        if locks.insert(key) {
            self.held.push(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get_or_create_cursor(&mut self, task_name: &str, now: DateTime<Utc>) -> Result<Cursor> {
        if !self.work.cursors.contains_key(task_name) {
            self.work.cursors.insert(task_name.to_string(), now);
            self.dirty = true;
        }
        Ok(Cursor {
            task_name: task_name.to_string(),
            last_completed: self.work.cursors[task_name],
        })
    }

    async fn set_cursor(&mut self, task_name: &str, last_completed: DateTime<Utc>) -> Result<()> {
        if let Some(c) = self.work.cursors.get_mut(task_name) {
            *c = last_completed;
            self.dirty = true;
        }
        Ok(())
    }

    async fn team_id_by_provider_id(&mut self, provider_id: i64) -> Result<Option<i64>> {
        Ok(self
            .work
            .teams
            .iter()
            .find(|t| t.provider_id == Some(provider_id))
            .map(|t| t.id))
    }

    async fn insert_teams(&mut self, teams: &[NewTeam]) -> Result<u64> {
        let mut inserted = 0;
        for team in teams {
            let conflict = self
                .work
                .teams
                .iter()
                .any(|t| t.provider_id == Some(team.provider_id) || t.name == team.name);
            if conflict {
                continue;
            }
            let id = self.work.next_id();
            self.work.teams.push(Team {
                id,
                provider_id: Some(team.provider_id),
                name: team.name.clone(),
                short_name: team.short_name.clone(),
            });
            inserted += 1;
        }
        self.dirty |= inserted > 0;
        Ok(inserted)
    }

    async fn known_game_provider_ids(&mut self, provider_ids: &[i64]) -> Result<HashSet<i64>> {
        Ok(self
            .work
            .games
            .iter()
            .filter_map(|g| g.provider_id)
            .filter(|pid| provider_ids.contains(pid))
            .collect())
    }

    async fn insert_games(&mut self, games: &[NewGame]) -> Result<Vec<i64>> {
        let mut inserted = Vec::new();
        for game in games {
            if game.away_id == game.home_id {
                return Err(AppError::Invariant("away and home teams must differ".to_string()));
            }
            let conflict = self.work.games.iter().any(|g| {
                g.provider_id == Some(game.provider_id)
                    || (game.start_time.is_some()
                        && g.start_time == game.start_time
                        && g.home_id == game.home_id
                        && g.away_id == game.away_id)
            });
            if conflict {
                continue;
            }
            let id = self.work.next_id();
            self.work.games.push(Game {
                id,
                provider_id: Some(game.provider_id),
                away_id: game.away_id,
                home_id: game.home_id,
                start_time: game.start_time,
                game_date: game.start_time.map(game_date_for),
                end_time: None,
                status: game.status.clone(),
                box_score: None,
                rhe: None,
                is_scorhegami: None,
            });
            inserted.push(game.provider_id);
        }
        self.dirty |= !inserted.is_empty();
        Ok(inserted)
    }

    async fn games_pending_update(&mut self) -> Result<Vec<Game>> {
        Ok(self
            .work
            .games
            .iter()
            .filter(|g| !g.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update_game_state(&mut self, game_id: i64, update: &GameStateUpdate) -> Result<()> {
        if let Some(g) = self.work.games.iter_mut().find(|g| g.id == game_id) {
            g.start_time = update.start_time;
            g.game_date = update.start_time.map(game_date_for);
            g.end_time = update.end_time;
            g.status = update.status.clone();
            g.box_score = update.box_score.clone();
            g.rhe = update.rhe.clone();
            self.dirty = true;
        }
        Ok(())
    }

    async fn delete_game(&mut self, game_id: i64) -> Result<u64> {
        let before = self.work.games.len();
        self.work.games.retain(|g| g.id != game_id);
        self.work.announcements.retain(|a| a.game_id != game_id);
        let removed = (before - self.work.games.len()) as u64;
        self.dirty |= removed > 0;
        Ok(removed)
    }

    async fn games_awaiting_detection(&mut self) -> Result<Vec<FinishedGame>> {
        let code = |team_id: i64| {
            self.work
                .teams
                .iter()
                .find(|t| t.id == team_id)
                .map(|t| t.short_name.clone().unwrap_or_else(|| t.name.clone()))
        };
        let mut pending: Vec<(&Game, FinishedGame)> = Vec::new();
        for g in &self.work.games {
            if g.status != GameStatus::Final || g.is_scorhegami.is_some() {
                continue;
            }
            let (Some(rhe), Some(away), Some(home)) = (&g.rhe, code(g.away_id), code(g.home_id))
            else {
                continue;
            };
            pending.push((
                g,
                FinishedGame {
                    id: g.id,
                    rhe: rhe.clone(),
                    away_short_name: away,
                    home_short_name: home,
                },
            ));
        }
        // NULL end times sort last, matching Postgres ASC ordering.
        pending.sort_by_key(|(g, _)| (g.end_time.is_none(), g.end_time, g.id));
        Ok(pending.into_iter().map(|(_, f)| f).collect())
    }

    async fn count_games_with_rhe(&mut self, rhe: &[i32]) -> Result<i64> {
        Ok(self
            .work
            .games
            .iter()
            .filter(|g| g.rhe.as_deref() == Some(rhe))
            .count() as i64)
    }

    async fn set_scorhegami(&mut self, game_id: i64, is_scorhegami: bool) -> Result<()> {
        if let Some(g) = self.work.games.iter_mut().find(|g| g.id == game_id) {
            g.is_scorhegami = Some(is_scorhegami);
            self.dirty = true;
        }
        Ok(())
    }

    async fn count_scorhegamis(&mut self) -> Result<i64> {
        Ok(self
            .work
            .games
            .iter()
            .filter(|g| g.is_scorhegami == Some(true))
            .count() as i64)
    }

    async fn last_rhe_occurrence(
        &mut self,
        rhe: &[i32],
        excluding_game_id: i64,
    ) -> Result<Option<NaiveDate>> {
        Ok(self
            .work
            .games
            .iter()
            .filter(|g| g.id != excluding_game_id && g.rhe.as_deref() == Some(rhe))
            .filter_map(|g| g.game_date)
            .max())
    }

    async fn insert_announcement(&mut self, game_id: i64, content: &str) -> Result<i64> {
        if self.shared.rejected_announcements.lock().unwrap().contains(&game_id) {
            return Err(AppError::Database(sqlx::Error::Protocol(format!(
                "announcement insert for game {game_id} rejected"
            ))));
        }
        let id = self.work.next_id();
        self.work.announcements.push(Announcement {
            id,
            game_id,
            content: content.to_string(),
            status: AnnouncementStatus::Pending,
            external_id: None,
            failed_reason: None,
            posted_at: None,
            created_at: Utc::now(),
        });
        self.dirty = true;
        Ok(id)
    }

    async fn count_delivered_since(&mut self, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .work
            .announcements
            .iter()
            .filter(|a| a.status == AnnouncementStatus::Success)
            .filter(|a| a.posted_at.is_some_and(|t| t > since))
            .count() as i64)
    }

    async fn oldest_pending_announcement(&mut self) -> Result<Option<Announcement>> {
        Ok(self
            .work
            .announcements
            .iter()
            .filter(|a| a.status == AnnouncementStatus::Pending)
            .min_by_key(|a| (a.created_at, a.id))
            .cloned())
    }

    async fn record_delivery(
        &mut self,
        announcement_id: i64,
        outcome: &DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(a) = self
            .work
            .announcements
            .iter_mut()
            .find(|a| a.id == announcement_id && a.status == AnnouncementStatus::Pending)
        else {
            return Err(AppError::Invariant(format!(
                "announcement {announcement_id} is no longer pending"
            )));
        };
        match outcome {
            DeliveryOutcome::Delivered { external_id } => {
                a.status = AnnouncementStatus::Success;
                a.external_id = Some(external_id.clone());
                a.posted_at = Some(at);
            }
            DeliveryOutcome::Failed { reason } => {
                a.status = AnnouncementStatus::Failed;
                a.failed_reason = Some(reason.clone());
            }
            DeliveryOutcome::Skipped => {
                a.status = AnnouncementStatus::Skipped;
                a.posted_at = Some(at);
            }
        }
        self.dirty = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        if this.dirty {
            let work = std::mem::take(&mut this.work);
            *this.shared.state.lock().unwrap() = work;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
