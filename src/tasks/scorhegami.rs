use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::store::{Store, StoreTx};
use crate::tasks::{Cycle, TaskKind};
use crate::types::FinishedGame;

/// Flags each newly final game as a scorhegami (or not) and drafts its
/// announcement.
pub struct ScorhegamiDetector {
    store: Arc<dyn Store>,
}

/// How a game's RHE compares to every other recorded game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// First of its kind; `ordinal` counts unique games including this one.
    Unique { ordinal: i64 },
    Repeat { times_before: i64, last_seen: Option<NaiveDate> },
}

impl ScorhegamiDetector {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
        }
    }
}

#[async_trait]
impl Cycle for ScorhegamiDetector {
    fn kind(&self) -> TaskKind {
        TaskKind::ScorhegamiDetector
    }

    /// `tx` only carries the advisory lock for the duration of the cycle;
    /// each game is evaluated and committed in a transaction of its own.
    async fn run(&self, mut tx: Box<dyn StoreTx>) -> Result<()> {
        let finished = tx.games_awaiting_detection().await?;
        if finished.is_empty() {
            return tx.rollback().await;
        }
        info!("Evaluating {} games that have just ended", finished.len());

        for game in &finished {
            let mut game_tx = self.store.begin().await?;
            let verdict = evaluate(game_tx.as_mut(), game).await?;
            game_tx.commit().await?;
            info!(game_id = game.id, rhe = ?game.rhe, ?verdict, "evaluated game {}", game.id);
        }

        tx.rollback().await
    }
}

async fn evaluate(tx: &mut dyn StoreTx, game: &FinishedGame) -> Result<Verdict> {
    if game.rhe.len() != 6 {
        return Err(AppError::Invariant(format!(
            "game {} has rhe of length {}",
            game.id,
            game.rhe.len()
        )));
    }

    // Includes the game itself.
    let count = tx.count_games_with_rhe(&game.rhe).await?;
    let unique = count == 1;
    tx.set_scorhegami(game.id, unique).await?;

    let verdict = if unique {
        Verdict::Unique {
            ordinal: tx.count_scorhegamis().await?,
        }
    } else {
        Verdict::Repeat {
            times_before: count - 1,
            last_seen: tx.last_rhe_occurrence(&game.rhe, game.id).await?,
        }
    };

    let content = draft_announcement(game, &verdict);
    tx.insert_announcement(game.id, &content).await?;
    Ok(verdict)
}

/// Renders the line-score post. Two-letter team codes get two trailing
/// spaces so the columns line up with three-letter ones.
pub fn draft_announcement(game: &FinishedGame, verdict: &Verdict) -> String {
    let pad = |code: &str| {
        if code.chars().count() == 2 {
            format!("{code}  ")
        } else {
            code.to_string()
        }
    };
    let r = &game.rhe;

    let mut out = String::from("FINAL\n");
    out.push_str("          R  H  E\n");
    let _ = writeln!(out, "{}  {:2} {:2} {:2}", pad(&game.away_short_name), r[0], r[1], r[2]);
    let _ = writeln!(out, "{}  {:2} {:2} {:2}", pad(&game.home_short_name), r[3], r[4], r[5]);

    match verdict {
        Verdict::Unique { ordinal } => {
            out.push_str("\nThat's ScoRHEgami!\n");
            let _ = write!(out, "It's the {} unique RHE score in history.", ordinal_string(*ordinal));
        }
        Verdict::Repeat {
            times_before,
            last_seen,
        } => {
            let unit = if *times_before == 1 { "time" } else { "times" };
            let _ = write!(
                out,
                "\nNot a ScoRHEgami. That score has happened {times_before} {unit} before"
            );
            match last_seen {
                Some(date) => {
                    let _ = write!(out, ", most recently on {}.", date.format("%B %-d, %Y"));
                }
                None => out.push('.'),
            }
        }
    }
    out
}

pub fn ordinal_string(n: i64) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{n}{suffix}")
}
