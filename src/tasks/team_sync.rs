use tracing::info;

use crate::config::TEAM_SYNC_LOCK_TIMEOUT;
use crate::context::AppContext;
use crate::error::Result;
use crate::lock::{self, LockMode};
use crate::types::NewTeam;

const TEAM_SYNC_LOCK: &str = "team_sync";

/// Registers every provider team not yet stored. Runs once at startup, before
/// the fetcher needs to resolve team ids.
pub async fn sync_teams(ctx: &AppContext) -> Result<u64> {
    let mut tx = ctx.store.begin().await?;
    // Wait mode never reports NotAcquired; it times out with an error instead.
    lock::try_acquire(tx.as_mut(), TEAM_SYNC_LOCK, LockMode::Wait(TEAM_SYNC_LOCK_TIMEOUT)).await?;

    let teams: Vec<NewTeam> = ctx
        .games
        .list_teams()
        .await?
        .into_iter()
        .map(|t| NewTeam {
            provider_id: t.id,
            name: t.display_name,
            short_name: t.abbreviation,
        })
        .collect();

    let inserted = tx.insert_teams(&teams).await?;
    tx.commit().await?;
    info!(fetched = teams.len(), inserted, "team registry synced");
    Ok(inserted)
}
