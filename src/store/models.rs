//! Database row types matching the schema in migrations/.
//! Used by sqlx for typed queries.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppError;
use crate::types::{Announcement, AnnouncementStatus, Cursor, FinishedGame, Game, GameStatus, Team};

#[derive(Debug, sqlx::FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub name: String,
    pub short_name: Option<String>,
}

impl From<TeamRow> for Team {
    fn from(r: TeamRow) -> Self {
        Team {
            id: r.id,
            provider_id: r.provider_id,
            name: r.name,
            short_name: r.short_name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct GameRow {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub away_id: i64,
    pub home_id: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub game_date: Option<NaiveDate>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub box_score: Option<Vec<i32>>,
    pub rhe: Option<Vec<i32>>,
    pub is_scorhegami: Option<bool>,
}

impl From<GameRow> for Game {
    fn from(r: GameRow) -> Self {
        Game {
            id: r.id,
            provider_id: r.provider_id,
            away_id: r.away_id,
            home_id: r.home_id,
            start_time: r.start_time,
            game_date: r.game_date,
            end_time: r.end_time,
            status: GameStatus::parse(&r.status),
            box_score: r.box_score,
            rhe: r.rhe,
            is_scorhegami: r.is_scorhegami,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FinishedGameRow {
    pub id: i64,
    pub rhe: Vec<i32>,
    pub away_short_name: String,
    pub home_short_name: String,
}

impl From<FinishedGameRow> for FinishedGame {
    fn from(r: FinishedGameRow) -> Self {
        FinishedGame {
            id: r.id,
            rhe: r.rhe,
            away_short_name: r.away_short_name,
            home_short_name: r.home_short_name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CursorRow {
    pub task_name: String,
    pub last_completed: DateTime<Utc>,
}

impl From<CursorRow> for Cursor {
    fn from(r: CursorRow) -> Self {
        Cursor {
            task_name: r.task_name,
            last_completed: r.last_completed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AnnouncementRow {
    pub id: i64,
    pub game_id: i64,
    pub content: String,
    pub status: String,
    pub external_id: Option<String>,
    pub failed_reason: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AnnouncementRow> for Announcement {
    type Error = AppError;

    fn try_from(r: AnnouncementRow) -> Result<Self, Self::Error> {
        let status = AnnouncementStatus::parse(&r.status).ok_or_else(|| {
            AppError::Invariant(format!(
                "announcement {} has unknown status '{}'",
                r.id, r.status
            ))
        })?;
        Ok(Announcement {
            id: r.id,
            game_id: r.game_id,
            content: r.content,
            status,
            external_id: r.external_id,
            failed_reason: r.failed_reason,
            posted_at: r.posted_at,
            created_at: r.created_at,
        })
    }
}
