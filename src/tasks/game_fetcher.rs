use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::provider::{GameProvider, ProviderGame};
use crate::store::StoreTx;
use crate::tasks::{Cycle, TaskKind};
use crate::types::NewGame;

/// Pulls newly scheduled games from the provider for every date since the
/// last committed run.
pub struct GameFetcher {
    games: Arc<dyn GameProvider>,
}

impl GameFetcher {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            games: Arc::clone(&ctx.games),
        }
    }

    pub(crate) async fn run_at(&self, mut tx: Box<dyn StoreTx>, now: DateTime<Utc>) -> Result<()> {
        let task = TaskKind::GameFetcher.name();

        let cursor = tx.get_or_create_cursor(task, now).await?;
        let dates = dates_between(cursor.last_completed.date_naive(), now.date_naive());
        tx.set_cursor(task, now).await?;

        let (from, to) = (dates[0], dates[dates.len() - 1]);
        info!(%from, %to, "Fetching games for {} dates", dates.len());

        let games = match self.games.list_games(&dates).await {
            Ok(games) => games,
            Err(e) => {
                error!(
                    %from,
                    %to,
                    status_code = ?e.status_code(),
                    "Failed to fetch games: {e}"
                );
                tx.rollback().await?;
                return Err(e.into());
            }
        };
        info!("Fetched {} games", games.len());

        let resolved = resolve_teams(tx.as_mut(), &games).await?;
        let ids: Vec<i64> = resolved.iter().map(|g| g.provider_id).collect();
        let known = tx.known_game_provider_ids(&ids).await?;
        let new_games: Vec<NewGame> = resolved
            .into_iter()
            .filter(|g| !known.contains(&g.provider_id))
            .collect();

        let inserted: HashSet<i64> = tx.insert_games(&new_games).await?.into_iter().collect();
        // Anything new that did not land collided with a stored game on matchup and start.
        for game in new_games.iter().filter(|g| !inserted.contains(&g.provider_id)) {
            warn!(
                provider_id = game.provider_id,
                away_id = game.away_id,
                home_id = game.home_id,
                start_time = ?game.start_time,
                "Dropped game {}: same matchup and start time as a stored game",
                game.provider_id
            );
        }
        info!("Inserted {} new games", inserted.len());

        tx.commit().await
    }
}

#[async_trait]
impl Cycle for GameFetcher {
    fn kind(&self) -> TaskKind {
        TaskKind::GameFetcher
    }

    async fn run(&self, tx: Box<dyn StoreTx>) -> Result<()> {
        self.run_at(tx, Utc::now()).await
    }
}

/// Maps provider team ids to stored team ids. Teams come from team sync, so a
/// miss means the registry is out of date and the whole batch is rejected.
async fn resolve_teams(tx: &mut dyn StoreTx, games: &[ProviderGame]) -> Result<Vec<NewGame>> {
    let mut known: HashMap<i64, i64> = HashMap::new();
    let mut out = Vec::with_capacity(games.len());

    for game in games {
        let mut ids = [0i64; 2];
        for (slot, provider_team) in ids.iter_mut().zip([&game.away_team, &game.home_team]) {
            *slot = match known.get(&provider_team.id) {
                Some(id) => *id,
                None => {
                    let id = tx
                        .team_id_by_provider_id(provider_team.id)
                        .await?
                        .ok_or_else(|| {
                            AppError::Invariant(format!(
                                "game {} references unknown team {} ({})",
                                game.id, provider_team.id, provider_team.display_name
                            ))
                        })?;
                    known.insert(provider_team.id, id);
                    id
                }
            };
        }

        out.push(NewGame {
            provider_id: game.id,
            away_id: ids[0],
            home_id: ids[1],
            start_time: game.date,
            status: game.status.clone(),
        });
    }
    Ok(out)
}

/// Every calendar date from `start` to `end` inclusive, in either order.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let (start, end) = if start > end { (end, start) } else { (start, end) };
    start.iter_days().take_while(|d| *d <= end).collect()
}
