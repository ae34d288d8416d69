//! Transactional storage seam used by every polling task.
//!
//! A cycle opens one [`StoreTx`], takes its advisory lock inside it, and either
//! commits everything it did or drops/rolls back the lot.

pub mod models;
pub mod postgres;

#[cfg(test)]
pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::types::{
    Announcement, Cursor, DeliveryOutcome, FinishedGame, Game, GameStateUpdate, NewGame, NewTeam,
};

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One open transaction. Dropping it without [`StoreTx::commit`] rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    /// Single non-blocking attempt at a transaction-scoped advisory lock.
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool>;

    // --- cursors ---

    /// Returns the task's cursor, creating it at `now` when absent.
    async fn get_or_create_cursor(&mut self, task_name: &str, now: DateTime<Utc>)
        -> Result<Cursor>;
    async fn set_cursor(&mut self, task_name: &str, last_completed: DateTime<Utc>) -> Result<()>;

    // --- teams ---

    async fn team_id_by_provider_id(&mut self, provider_id: i64) -> Result<Option<i64>>;
    /// Inserts teams, skipping any that conflict with a stored row. Returns inserted count.
    async fn insert_teams(&mut self, teams: &[NewTeam]) -> Result<u64>;

    // --- games ---

    /// Which of `provider_ids` already have a stored game.
    async fn known_game_provider_ids(&mut self, provider_ids: &[i64]) -> Result<HashSet<i64>>;
    /// Inserts games, skipping any that conflict with a stored row on either unique
    /// key. Returns the provider ids actually inserted.
    async fn insert_games(&mut self, games: &[NewGame]) -> Result<Vec<i64>>;
    /// Games whose status is neither final nor postponed.
    async fn games_pending_update(&mut self) -> Result<Vec<Game>>;
    async fn update_game_state(&mut self, game_id: i64, update: &GameStateUpdate) -> Result<()>;
    async fn delete_game(&mut self, game_id: i64) -> Result<u64>;

    // --- scorhegami detection ---

    /// Final games not yet evaluated, oldest completion first.
    async fn games_awaiting_detection(&mut self) -> Result<Vec<FinishedGame>>;
    async fn count_games_with_rhe(&mut self, rhe: &[i32]) -> Result<i64>;
    async fn set_scorhegami(&mut self, game_id: i64, is_scorhegami: bool) -> Result<()>;
    async fn count_scorhegamis(&mut self) -> Result<i64>;
    /// Latest game date among other games sharing `rhe`.
    async fn last_rhe_occurrence(&mut self, rhe: &[i32], excluding_game_id: i64)
        -> Result<Option<NaiveDate>>;

    // --- announcements ---

    async fn insert_announcement(&mut self, game_id: i64, content: &str) -> Result<i64>;
    async fn count_delivered_since(&mut self, since: DateTime<Utc>) -> Result<i64>;
    async fn oldest_pending_announcement(&mut self) -> Result<Option<Announcement>>;
    async fn record_delivery(
        &mut self,
        announcement_id: i64,
        outcome: &DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
