use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::error::{AppError, Result};
use crate::store::models::{AnnouncementRow, CursorRow, FinishedGameRow, GameRow};
use crate::store::{Store, StoreTx};
use crate::types::{
    game_date_for, Announcement, Cursor, DeliveryOutcome, FinishedGame, Game, GameStateUpdate,
    GameStatus, NewGame, NewTeam,
};

/// Rows per multi-VALUES insert; keeps well under the bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

const GAME_COLUMNS: &str = "id, provider_id, away_id, home_id, start_time, game_date, end_time, \
                            status, box_score, rhe, is_scorhegami";

#[async_trait]
impl StoreTx for PgTx {
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool> {
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(acquired)
    }

    async fn get_or_create_cursor(
        &mut self,
        task_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Cursor> {
        sqlx::query(
            r#"
            INSERT INTO cursor (task_name, last_completed)
            VALUES ($1, $2)
            ON CONFLICT (task_name) DO NOTHING
            "#,
        )
        .bind(task_name)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        let row: CursorRow =
            sqlx::query_as("SELECT task_name, last_completed FROM cursor WHERE task_name = $1")
                .bind(task_name)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(row.into())
    }

    async fn set_cursor(&mut self, task_name: &str, last_completed: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE cursor SET last_completed = $2, updated_at = now() WHERE task_name = $1",
        )
        .bind(task_name)
        .bind(last_completed)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn team_id_by_provider_id(&mut self, provider_id: i64) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM team WHERE provider_id = $1")
            .bind(provider_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn insert_teams(&mut self, teams: &[NewTeam]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in teams.chunks(INSERT_CHUNK_SIZE) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO team (provider_id, name, short_name) ");
            qb.push_values(chunk, |mut b, team| {
                b.push_bind(team.provider_id)
                    .push_bind(&team.name)
                    .push_bind(&team.short_name);
            });
            qb.push(" ON CONFLICT DO NOTHING");
            inserted += qb.build().execute(&mut *self.tx).await?.rows_affected();
        }
        Ok(inserted)
    }

    async fn known_game_provider_ids(&mut self, provider_ids: &[i64]) -> Result<HashSet<i64>> {
        let known: Vec<i64> =
            sqlx::query_scalar("SELECT provider_id FROM game WHERE provider_id = ANY($1)")
                .bind(provider_ids)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(known.into_iter().collect())
    }

    async fn insert_games(&mut self, games: &[NewGame]) -> Result<Vec<i64>> {
        let mut inserted = Vec::with_capacity(games.len());
        for chunk in games.chunks(INSERT_CHUNK_SIZE) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO game (provider_id, away_id, home_id, start_time, game_date, status) ",
            );
            qb.push_values(chunk, |mut b, game| {
                b.push_bind(game.provider_id)
                    .push_bind(game.away_id)
                    .push_bind(game.home_id)
                    .push_bind(game.start_time)
                    .push_bind(game.start_time.map(game_date_for))
                    .push_bind(game.status.as_str().to_string());
            });
            qb.push(" ON CONFLICT DO NOTHING RETURNING provider_id");
            let ids = qb.build_query_scalar::<i64>().fetch_all(&mut *self.tx).await?;
            inserted.extend(ids);
        }
        Ok(inserted)
    }

    async fn games_pending_update(&mut self) -> Result<Vec<Game>> {
        let rows: Vec<GameRow> = sqlx::query_as(&format!(
            "SELECT {GAME_COLUMNS} FROM game WHERE status NOT IN ($1, $2) ORDER BY id"
        ))
        .bind(GameStatus::FINAL)
        .bind(GameStatus::POSTPONED)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Game::from).collect())
    }

    async fn update_game_state(&mut self, game_id: i64, update: &GameStateUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE game SET
                start_time = $2,
                game_date = $3,
                end_time = $4,
                status = $5,
                box_score = $6,
                rhe = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(game_id)
        .bind(update.start_time)
        .bind(update.start_time.map(game_date_for))
        .bind(update.end_time)
        .bind(update.status.as_str())
        .bind(update.box_score.as_deref())
        .bind(update.rhe.as_deref())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_game(&mut self, game_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM game WHERE id = $1")
            .bind(game_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn games_awaiting_detection(&mut self) -> Result<Vec<FinishedGame>> {
        let rows: Vec<FinishedGameRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.rhe,
                   COALESCE(a.short_name, a.name) AS away_short_name,
                   COALESCE(h.short_name, h.name) AS home_short_name
            FROM game g
            JOIN team a ON a.id = g.away_id
            JOIN team h ON h.id = g.home_id
            WHERE g.status = $1
              AND g.is_scorhegami IS NULL
              AND g.rhe IS NOT NULL
            ORDER BY g.end_time ASC, g.id ASC
            "#,
        )
        .bind(GameStatus::FINAL)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(FinishedGame::from).collect())
    }

    async fn count_games_with_rhe(&mut self, rhe: &[i32]) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game WHERE rhe = $1")
            .bind(rhe)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn set_scorhegami(&mut self, game_id: i64, is_scorhegami: bool) -> Result<()> {
        sqlx::query(
            "UPDATE game SET is_scorhegami = $2, updated_at = now() WHERE id = $1",
        )
        .bind(game_id)
        .bind(is_scorhegami)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn count_scorhegamis(&mut self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM game WHERE is_scorhegami IS TRUE")
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(count)
    }

    async fn last_rhe_occurrence(
        &mut self,
        rhe: &[i32],
        excluding_game_id: i64,
    ) -> Result<Option<NaiveDate>> {
        let date: Option<NaiveDate> =
            sqlx::query_scalar("SELECT MAX(game_date) FROM game WHERE rhe = $1 AND id <> $2")
                .bind(rhe)
                .bind(excluding_game_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(date)
    }

    async fn insert_announcement(&mut self, game_id: i64, content: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO announcement (game_id, content, status) VALUES ($1, $2, 'pending') RETURNING id",
        )
        .bind(game_id)
        .bind(content)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn count_delivered_since(&mut self, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM announcement WHERE status = 'success' AND posted_at > $1",
        )
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn oldest_pending_announcement(&mut self) -> Result<Option<Announcement>> {
        let row: Option<AnnouncementRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, content, status, external_id, failed_reason, posted_at, created_at
            FROM announcement
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Announcement::try_from).transpose()
    }

    async fn record_delivery(
        &mut self,
        announcement_id: i64,
        outcome: &DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> Result<()> {
        // Only pending rows transition; terminal announcements are immutable.
        let query = match outcome {
            DeliveryOutcome::Delivered { external_id } => sqlx::query(
                r#"
                UPDATE announcement
                SET status = 'success', external_id = $2, posted_at = $3, updated_at = now()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(announcement_id)
            .bind(external_id)
            .bind(at),
            DeliveryOutcome::Failed { reason } => sqlx::query(
                r#"
                UPDATE announcement
                SET status = 'failed', failed_reason = $2, updated_at = $3
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(announcement_id)
            .bind(reason)
            .bind(at),
            DeliveryOutcome::Skipped => sqlx::query(
                r#"
                UPDATE announcement
                SET status = 'skipped', posted_at = $2, updated_at = now()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(announcement_id)
            .bind(at),
        };

        let result = query.execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Invariant(format!(
                "announcement {announcement_id} is no longer pending"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
