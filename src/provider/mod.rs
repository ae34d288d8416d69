//! External collaborators: the game-data provider (read-only) and the
//! announcement provider (write-only).

pub mod balldontlie;
pub mod x;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::{DeliveryError, ProviderError};
use crate::types::GameStatus;

pub use balldontlie::BalldontlieClient;
pub use x::XClient;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTeam {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
}

/// Per-side line score. Absent until the game has started.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamLine {
    #[serde(default)]
    pub runs: i32,
    #[serde(default)]
    pub hits: i32,
    #[serde(default)]
    pub errors: i32,
    #[serde(default)]
    pub inning_scores: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderGame {
    pub id: i64,
    pub home_team: ProviderTeam,
    pub away_team: ProviderTeam,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub status: GameStatus,
    #[serde(default)]
    pub home_team_data: Option<TeamLine>,
    #[serde(default)]
    pub away_team_data: Option<TeamLine>,
}

#[async_trait]
pub trait GameProvider: Send + Sync {
    /// All games on the given dates, following pagination until exhausted.
    async fn list_games(&self, dates: &[NaiveDate]) -> Result<Vec<ProviderGame>, ProviderError>;

    async fn get_game(&self, id: i64) -> Result<ProviderGame, ProviderError>;

    async fn list_teams(&self) -> Result<Vec<ProviderTeam>, ProviderError>;
}

#[async_trait]
pub trait Announcer: Send + Sync {
    /// Publishes `text`, returning the provider-assigned id.
    async fn post(&self, text: &str) -> Result<String, DeliveryError>;
}
