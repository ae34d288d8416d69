use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::config::MAX_ANNOUNCEMENTS_PER_DAY;
use crate::context::AppContext;
use crate::error::Result;
use crate::provider::Announcer;
use crate::store::StoreTx;
use crate::tasks::{Cycle, TaskKind};
use crate::types::DeliveryOutcome;

/// Delivers at most one pending announcement per cycle, oldest first, within
/// the provider's daily posting budget.
pub struct AnnouncementDispatcher {
    announcer: Arc<dyn Announcer>,
    disabled: bool,
}

impl AnnouncementDispatcher {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            announcer: Arc::clone(&ctx.announcer),
            disabled: ctx.config.disable_announcements,
        }
    }

    pub(crate) async fn run_at(&self, mut tx: Box<dyn StoreTx>, now: DateTime<Utc>) -> Result<()> {
        if !self.disabled {
            let delivered = tx.count_delivered_since(now - Duration::hours(24)).await?;
            if delivered >= MAX_ANNOUNCEMENTS_PER_DAY {
                debug!(delivered, "daily announcement budget spent");
                return tx.rollback().await;
            }
        }

        let Some(announcement) = tx.oldest_pending_announcement().await? else {
            return tx.rollback().await;
        };

        let outcome = if self.disabled {
            info!(game_id = announcement.game_id, "Announcements are disabled, skipping");
            DeliveryOutcome::Skipped
        } else {
            info!(game_id = announcement.game_id, "Posting announcement for game {}", announcement.game_id);
            match self.announcer.post(&announcement.content).await {
                Ok(external_id) => {
                    info!(
                        game_id = announcement.game_id,
                        external_id = %external_id,
                        "Successfully posted announcement for game {}",
                        announcement.game_id
                    );
                    DeliveryOutcome::Delivered { external_id }
                }
                Err(e) => {
                    error!(
                        game_id = announcement.game_id,
                        "Failed to post announcement for game {}, reason = {e}",
                        announcement.game_id
                    );
                    DeliveryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        tx.record_delivery(announcement.id, &outcome, now).await?;
        tx.commit().await
    }
}

#[async_trait]
impl Cycle for AnnouncementDispatcher {
    fn kind(&self) -> TaskKind {
        TaskKind::AnnouncementDispatcher
    }

    async fn run(&self, tx: Box<dyn StoreTx>) -> Result<()> {
        self.run_at(tx, Utc::now()).await
    }
}
