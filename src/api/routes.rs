use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::api::health::{CycleOutcome, HealthState};
use crate::error::AppError;
use crate::store::models::TeamRow;
use crate::tasks::TaskKind;
use crate::types::{GameStatus, Team};

const MAX_GAMES_PER_PAGE: i64 = 50;
const MAX_TEAMS_PER_PAGE: i64 = 10;

#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/games", get(get_games))
        .route("/games/count", get(get_game_count))
        .route("/games/latest_completed_date", get(get_latest_completed_date))
        .route("/games/:id", get(get_game))
        .route("/teams", get(get_teams))
        .route("/teams/:id", get(get_team))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct GamesQuery {
    pub offset: Option<i64>,
    pub count: Option<i64>,
    pub date: Option<NaiveDate>,
    /// Comma-separated provider statuses, e.g. `STATUS_FINAL,STATUS_POSTPONED`.
    pub statuses: Option<String>,
    /// Comma-separated RHE, exactly six values.
    pub rhe: Option<String>,
}

#[derive(Deserialize)]
pub struct GameCountQuery {
    pub is_scorhegami: Option<bool>,
    pub rhe: Option<String>,
}

#[derive(Deserialize)]
pub struct TeamsQuery {
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tasks: Vec<TaskHealthResponse>,
}

#[derive(Serialize)]
pub struct TaskHealthResponse {
    pub task: TaskKind,
    pub last_outcome: CycleOutcome,
    pub last_cycle_at: DateTime<Utc>,
    pub consecutive_failures: u32,
}

#[derive(Serialize)]
pub struct TeamResponse {
    pub id: i64,
    pub short_name: Option<String>,
    pub name: String,
}

impl From<Team> for TeamResponse {
    fn from(t: Team) -> Self {
        TeamResponse {
            id: t.id,
            short_name: t.short_name,
            name: t.name,
        }
    }
}

#[derive(Serialize)]
pub struct GameResponse {
    pub id: i64,
    pub provider_id: Option<i64>,
    pub away_team: TeamResponse,
    pub home_team: TeamResponse,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub box_score: Option<Vec<i32>>,
    pub rhe: Option<Vec<i32>>,
    pub is_scorhegami: Option<bool>,
    pub date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow)]
struct GameWithTeamsRow {
    id: i64,
    provider_id: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    box_score: Option<Vec<i32>>,
    rhe: Option<Vec<i32>>,
    is_scorhegami: Option<bool>,
    game_date: Option<NaiveDate>,
    away_id: i64,
    away_name: String,
    away_short_name: Option<String>,
    home_id: i64,
    home_name: String,
    home_short_name: Option<String>,
}

impl From<GameWithTeamsRow> for GameResponse {
    fn from(r: GameWithTeamsRow) -> Self {
        GameResponse {
            id: r.id,
            provider_id: r.provider_id,
            away_team: TeamResponse {
                id: r.away_id,
                short_name: r.away_short_name,
                name: r.away_name,
            },
            home_team: TeamResponse {
                id: r.home_id,
                short_name: r.home_short_name,
                name: r.home_name,
            },
            start_time: r.start_time,
            end_time: r.end_time,
            status: GameStatus::parse(&r.status),
            box_score: r.box_score,
            rhe: r.rhe,
            is_scorhegami: r.is_scorhegami,
            date: r.game_date,
        }
    }
}

const GAME_WITH_TEAMS_SELECT: &str = r#"
    SELECT g.id, g.provider_id, g.start_time, g.end_time, g.status, g.box_score, g.rhe,
           g.is_scorhegami, g.game_date,
           a.id AS away_id, a.name AS away_name, a.short_name AS away_short_name,
           h.id AS home_id, h.name AS home_name, h.short_name AS home_short_name
    FROM game g
    JOIN team a ON a.id = g.away_id
    JOIN team h ON h.id = g.home_id
"#;

// ---------------------------------------------------------------------------
// Parameter parsing
// ---------------------------------------------------------------------------

/// Parses `1,1,0,2,1,0` into an RHE. Anything but six integers is rejected.
pub fn parse_rhe_param(raw: &str) -> Result<Vec<i32>, AppError> {
    let rhe = raw
        .split(',')
        .map(|v| v.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(format!("rhe must be integers: {e}")))?;
    if rhe.len() != 6 {
        return Err(AppError::BadRequest(format!(
            "rhe must have exactly 6 values, got {}",
            rhe.len()
        )));
    }
    Ok(rhe)
}

pub fn parse_statuses_param(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| GameStatus::parse(s).as_str().to_string())
        .collect()
}

/// Resolves `(offset, count)` with defaults, rejecting out-of-range pages.
pub fn page(offset: Option<i64>, count: Option<i64>, max: i64) -> Result<(i64, i64), AppError> {
    let offset = offset.unwrap_or(0);
    let count = count.unwrap_or(max);
    if offset < 0 {
        return Err(AppError::BadRequest("offset must not be negative".to_string()));
    }
    if !(1..=max).contains(&count) {
        return Err(AppError::BadRequest(format!("count must be between 1 and {max}")));
    }
    Ok((offset, count))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let tasks = state
        .health
        .snapshot()
        .into_iter()
        .map(|(task, h)| TaskHealthResponse {
            task,
            last_outcome: h.last_outcome,
            last_cycle_at: h.last_cycle_at,
            consecutive_failures: h.consecutive_failures,
        })
        .collect();
    Json(HealthResponse { status: "ok", tasks })
}

async fn get_games(
    State(state): State<ApiState>,
    Query(params): Query<GamesQuery>,
) -> Result<Json<Vec<GameResponse>>, AppError> {
    let (offset, count) = page(params.offset, params.count, MAX_GAMES_PER_PAGE)?;
    let rhe = params.rhe.as_deref().map(parse_rhe_param).transpose()?;
    let statuses = params.statuses.as_deref().map(parse_statuses_param);

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(GAME_WITH_TEAMS_SELECT);
    qb.push(" WHERE TRUE");
    if let Some(rhe) = rhe {
        qb.push(" AND g.rhe = ").push_bind(rhe);
    }
    if let Some(date) = params.date {
        qb.push(" AND g.game_date = ").push_bind(date);
    }
    if let Some(statuses) = statuses {
        qb.push(" AND g.status = ANY(").push_bind(statuses).push(")");
    }
    qb.push(" ORDER BY g.start_time DESC NULLS LAST, g.id DESC")
        .push(" OFFSET ")
        .push_bind(offset)
        .push(" LIMIT ")
        .push_bind(count);

    let rows: Vec<GameWithTeamsRow> = qb.build_query_as().fetch_all(&state.pool).await?;
    Ok(Json(rows.into_iter().map(GameResponse::from).collect()))
}

async fn get_game_count(
    State(state): State<ApiState>,
    Query(params): Query<GameCountQuery>,
) -> Result<Json<i64>, AppError> {
    let rhe = params.rhe.as_deref().map(parse_rhe_param).transpose()?;

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM game WHERE TRUE");
    if let Some(rhe) = rhe {
        qb.push(" AND rhe = ").push_bind(rhe);
    }
    if let Some(flag) = params.is_scorhegami {
        qb.push(" AND is_scorhegami = ").push_bind(flag);
    }

    let count: i64 = qb.build_query_scalar().fetch_one(&state.pool).await?;
    Ok(Json(count))
}

/// Most recent game date on which nothing is still scheduled or in progress.
async fn get_latest_completed_date(
    State(state): State<ApiState>,
) -> Result<Json<NaiveDate>, AppError> {
    let date: Option<NaiveDate> = sqlx::query_scalar(
        r#"
        SELECT MAX(game_date) FROM game
        WHERE game_date IS NOT NULL
          AND game_date NOT IN (
              SELECT DISTINCT game_date FROM game
              WHERE game_date IS NOT NULL AND status IN ($1, $2)
          )
        "#,
    )
    .bind(GameStatus::SCHEDULED)
    .bind(GameStatus::IN_PROGRESS)
    .fetch_one(&state.pool)
    .await?;

    date.map(Json)
        .ok_or_else(|| AppError::NotFound("no completed game date".to_string()))
}

async fn get_game(
    State(state): State<ApiState>,
    Path(game_id): Path<i64>,
) -> Result<Json<GameResponse>, AppError> {
    let row: Option<GameWithTeamsRow> =
        sqlx::query_as(&format!("{GAME_WITH_TEAMS_SELECT} WHERE g.id = $1"))
            .bind(game_id)
            .fetch_optional(&state.pool)
            .await?;

    row.map(|r| Json(r.into()))
        .ok_or_else(|| AppError::NotFound(format!("Game with id {game_id} not found")))
}

async fn get_teams(
    State(state): State<ApiState>,
    Query(params): Query<TeamsQuery>,
) -> Result<Json<Vec<TeamResponse>>, AppError> {
    let (offset, count) = page(params.offset, params.count, MAX_TEAMS_PER_PAGE)?;

    let rows: Vec<TeamRow> = sqlx::query_as(
        "SELECT id, provider_id, name, short_name FROM team ORDER BY id ASC OFFSET $1 LIMIT $2",
    )
    .bind(offset)
    .bind(count)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|r| TeamResponse::from(Team::from(r)))
            .collect(),
    ))
}

async fn get_team(
    State(state): State<ApiState>,
    Path(team_id): Path<i64>,
) -> Result<Json<TeamResponse>, AppError> {
    let row: Option<TeamRow> =
        sqlx::query_as("SELECT id, provider_id, name, short_name FROM team WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&state.pool)
            .await?;

    row.map(|r| Json(TeamResponse::from(Team::from(r))))
        .ok_or_else(|| AppError::NotFound(format!("Team with id {team_id} not found")))
}
