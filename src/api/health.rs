//! Shared health state for the /health endpoint.
//! Updated by every polling task after each iteration.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::tasks::TaskKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    /// Another instance held the task's advisory lock.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskHealth {
    pub last_outcome: CycleOutcome,
    pub last_cycle_at: DateTime<Utc>,
    pub consecutive_failures: u32,
}

/// Per-task cycle results. Written by tasks, read by the API.
#[derive(Debug, Default)]
pub struct HealthState {
    tasks: DashMap<TaskKind, TaskHealth>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: TaskKind, outcome: CycleOutcome, at: DateTime<Utc>) {
        let mut entry = self.tasks.entry(kind).or_insert(TaskHealth {
            last_outcome: outcome,
            last_cycle_at: at,
            consecutive_failures: 0,
        });
        entry.last_outcome = outcome;
        entry.last_cycle_at = at;
        entry.consecutive_failures = match outcome {
            CycleOutcome::Failed => entry.consecutive_failures + 1,
            CycleOutcome::Completed | CycleOutcome::Skipped => 0,
        };
    }

    pub fn get(&self, kind: TaskKind) -> Option<TaskHealth> {
        self.tasks.get(&kind).map(|e| e.value().clone())
    }

    pub fn snapshot(&self) -> Vec<(TaskKind, TaskHealth)> {
        let mut all: Vec<_> = self
            .tasks
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(kind, _)| *kind);
        all
    }
}
