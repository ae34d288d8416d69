use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Game status
// ---------------------------------------------------------------------------

/// Lifecycle status as reported by the game provider. Unknown provider values
/// are kept verbatim and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Other(String),
}

impl GameStatus {
    pub const SCHEDULED: &'static str = "STATUS_SCHEDULED";
    pub const IN_PROGRESS: &'static str = "STATUS_IN_PROGRESS";
    pub const FINAL: &'static str = "STATUS_FINAL";
    pub const POSTPONED: &'static str = "STATUS_POSTPONED";

    pub fn parse(s: &str) -> Self {
        match s {
            Self::SCHEDULED => GameStatus::Scheduled,
            Self::IN_PROGRESS => GameStatus::InProgress,
            Self::FINAL => GameStatus::Final,
            Self::POSTPONED => GameStatus::Postponed,
            other => GameStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GameStatus::Scheduled => Self::SCHEDULED,
            GameStatus::InProgress => Self::IN_PROGRESS,
            GameStatus::Final => Self::FINAL,
            GameStatus::Postponed => Self::POSTPONED,
            GameStatus::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Final | GameStatus::Postponed)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for GameStatus {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GameStatus {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(GameStatus::parse(&s))
    }
}

// ---------------------------------------------------------------------------
// Stored entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub name: String,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    pub provider_id: i64,
    pub name: String,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub away_id: i64,
    pub home_id: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub game_date: Option<NaiveDate>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub box_score: Option<Vec<i32>>,
    pub rhe: Option<Vec<i32>>,
    pub is_scorhegami: Option<bool>,
}

/// A game row as inserted by the fetcher; state columns are filled in by the updater.
#[derive(Debug, Clone)]
pub struct NewGame {
    pub provider_id: i64,
    pub away_id: i64,
    pub home_id: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
}

/// Reconciled provider state written back by the updater.
#[derive(Debug, Clone)]
pub struct GameStateUpdate {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub box_score: Option<Vec<i32>>,
    pub rhe: Option<Vec<i32>>,
}

/// A final game awaiting scorhegami evaluation, with the team codes needed to
/// draft its announcement.
#[derive(Debug, Clone)]
pub struct FinishedGame {
    pub id: i64,
    pub rhe: Vec<i32>,
    pub away_short_name: String,
    pub home_short_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub task_name: String,
    pub last_completed: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl AnnouncementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnouncementStatus::Pending => "pending",
            AnnouncementStatus::Success => "success",
            AnnouncementStatus::Failed => "failed",
            AnnouncementStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnnouncementStatus::Pending),
            "success" => Some(AnnouncementStatus::Success),
            "failed" => Some(AnnouncementStatus::Failed),
            "skipped" => Some(AnnouncementStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnnouncementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub id: i64,
    pub game_id: i64,
    pub content: String,
    pub status: AnnouncementStatus,
    pub external_id: Option<String>,
    pub failed_reason: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Terminal outcome of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { external_id: String },
    Failed { reason: String },
    Skipped,
}

// ---------------------------------------------------------------------------
// Game date
// ---------------------------------------------------------------------------

/// Offset used to place a start time on its local calendar date. UTC-8 keeps
/// late West Coast starts and early East Coast starts on the date fans saw.
const GAME_DATE_UTC_OFFSET_HOURS: i64 = -8;

pub fn game_date_for(start_time: DateTime<Utc>) -> NaiveDate {
    (start_time + Duration::hours(GAME_DATE_UTC_OFFSET_HOURS)).date_naive()
}
