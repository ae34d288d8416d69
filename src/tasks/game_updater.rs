use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::config::{UPDATER_CONCURRENCY, UPDATER_CYCLE_TIMEOUT};
use crate::context::AppContext;
use crate::error::{AppError, ProviderError, Result};
use crate::provider::{GameProvider, ProviderGame, TeamLine};
use crate::store::StoreTx;
use crate::tasks::{Cycle, TaskKind};
use crate::types::{GameStateUpdate, GameStatus};

/// Reconciles every unfinished game against the provider until it reaches a
/// terminal status.
pub struct GameUpdater {
    games: Arc<dyn GameProvider>,
    cycle_timeout: Duration,
}

impl GameUpdater {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            games: Arc::clone(&ctx.games),
            cycle_timeout: UPDATER_CYCLE_TIMEOUT,
        }
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    pub(crate) async fn run_at(&self, mut tx: Box<dyn StoreTx>, now: DateTime<Utc>) -> Result<()> {
        let pending: Vec<_> = tx
            .games_pending_update()
            .await?
            .into_iter()
            .filter_map(|g| g.provider_id.map(|pid| (g, pid)))
            .collect();

        if pending.is_empty() {
            return tx.rollback().await;
        }
        info!("Updating {} games", pending.len());

        // Order-preserving, at most UPDATER_CONCURRENCY requests in flight.
        let ids: Vec<i64> = pending.iter().map(|(_, pid)| *pid).collect();
        let fetches = stream::iter(ids.into_iter().map(|pid| self.games.get_game(pid)))
            .buffered(UPDATER_CONCURRENCY)
            .collect::<Vec<_>>();
        let results = tokio::time::timeout(self.cycle_timeout, fetches)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "fetching {} games took longer than {}s",
                    pending.len(),
                    self.cycle_timeout.as_secs_f32()
                ))
            })?;

        let mut updated = 0;
        for ((game, provider_id), result) in pending.iter().zip(results) {
            match result {
                Ok(fresh) => {
                    let line_score = box_score_and_rhe(&fresh);
                    // A final game is never selected again, so it must carry its RHE.
                    if fresh.status == GameStatus::Final && line_score.is_none() {
                        warn!(
                            game_id = game.id,
                            provider_id,
                            "Game id {} is final without a line score, retrying next cycle",
                            game.id
                        );
                        continue;
                    }
                    let (box_score, rhe) = line_score
                        .map(|(b, r)| (Some(b), Some(r)))
                        .unwrap_or((None, None));
                    let update = GameStateUpdate {
                        start_time: fresh.date.or(game.start_time),
                        end_time: (fresh.status == GameStatus::Final).then_some(now),
                        status: fresh.status,
                        box_score,
                        rhe,
                    };
                    tx.update_game_state(game.id, &update).await?;
                    updated += 1;
                }
                Err(ProviderError::NotFound) => {
                    warn!(game_id = game.id, provider_id, "Deleting game id {} due to not found", game.id);
                    tx.delete_game(game.id).await?;
                }
                Err(e) => {
                    error!(
                        game_id = game.id,
                        provider_id,
                        status_code = ?e.status_code(),
                        "Failed to get result of game id {}: {e}",
                        game.id
                    );
                }
            }
        }
        info!("Updated {updated} games");

        tx.commit().await
    }
}

#[async_trait]
impl Cycle for GameUpdater {
    fn kind(&self) -> TaskKind {
        TaskKind::GameUpdater
    }

    async fn run(&self, tx: Box<dyn StoreTx>) -> Result<()> {
        self.run_at(tx, Utc::now()).await
    }
}

/// Builds `away innings ++ away RHE ++ home innings ++ home RHE` and the six
/// RHE values. The shorter inning list is padded with zeros so both halves
/// have equal length. `None` until the provider reports any line score.
pub fn box_score_and_rhe(game: &ProviderGame) -> Option<(Vec<i32>, Vec<i32>)> {
    if game.away_team_data.is_none() && game.home_team_data.is_none() {
        return None;
    }
    let away = game.away_team_data.clone().unwrap_or_default();
    let home = game.home_team_data.clone().unwrap_or_default();

    let innings = away.inning_scores.len().max(home.inning_scores.len());
    let padded = |line: &TeamLine| {
        let mut scores = line.inning_scores.clone();
        scores.resize(innings, 0);
        scores
    };

    let away_rhe = [away.runs, away.hits, away.errors];
    let home_rhe = [home.runs, home.hits, home.errors];

    let mut box_score = padded(&away);
    box_score.extend_from_slice(&away_rhe);
    box_score.extend(padded(&home));
    box_score.extend_from_slice(&home_rhe);

    let rhe = away_rhe.iter().chain(home_rhe.iter()).copied().collect();
    Some((box_score, rhe))
}
