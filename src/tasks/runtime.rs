use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::health::{CycleOutcome, HealthState};
use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::lock::{self, LockMode, LockOutcome};
use crate::store::Store;
use crate::tasks::{Component, Cycle, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The loop exited on its own while it was expected to keep running.
    Crashed,
}

/// Runs a [`Cycle`] forever at a fixed interval, one locked transaction per
/// iteration. Errors and panics inside a cycle are logged and the loop moves on.
pub struct PollingTask<C: Cycle> {
    kind: TaskKind,
    cycle: Arc<C>,
    store: Arc<dyn Store>,
    health: Arc<HealthState>,
    interval: Duration,
    state: TaskState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<C: Cycle> PollingTask<C> {
    pub fn new(ctx: &AppContext, cycle: C) -> Self {
        let kind = cycle.kind();
        Self {
            kind,
            cycle: Arc::new(cycle),
            store: Arc::clone(&ctx.store),
            health: Arc::clone(&ctx.health),
            interval: kind.interval(),
            state: TaskState::Stopped,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> TaskState {
        match (&self.state, &self.handle) {
            (TaskState::Running, Some(h)) if h.is_finished() => TaskState::Crashed,
            (state, _) => *state,
        }
    }
}

async fn run_loop<C: Cycle>(
    kind: TaskKind,
    cycle: Arc<C>,
    store: Arc<dyn Store>,
    health: Arc<HealthState>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let outcome = run_iteration(kind, store.as_ref(), cycle.as_ref()).await;
        health.record(kind, outcome, Utc::now());

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(task = %kind, "loop exited");
}

/// One guarded iteration: begin, lock (no wait), hand off to the cycle.
pub(crate) async fn run_iteration<C: Cycle>(
    kind: TaskKind,
    store: &dyn Store,
    cycle: &C,
) -> CycleOutcome {
    let guarded = AssertUnwindSafe(async {
        let mut tx = store.begin().await?;
        match lock::try_acquire(tx.as_mut(), kind.name(), LockMode::NoWait).await? {
            LockOutcome::NotAcquired => {
                tx.rollback().await?;
                return Ok(CycleOutcome::Skipped);
            }
            LockOutcome::Acquired => {}
        }
        cycle.run(tx).await?;
        Ok::<_, AppError>(CycleOutcome::Completed)
    })
    .catch_unwind()
    .await;

    match guarded {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(task = %kind, error = %e, "Failed to run {kind}");
            CycleOutcome::Failed
        }
        Err(panic) => {
            error!(task = %kind, panic = %panic_message(panic.as_ref()), "{kind} cycle panicked");
            CycleOutcome::Failed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl<C: Cycle> Component for PollingTask<C> {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(AppError::Config(format!("{} already started", self.kind)));
        }
        self.state = TaskState::Starting;
        self.cancel = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            self.kind,
            Arc::clone(&self.cycle),
            Arc::clone(&self.store),
            Arc::clone(&self.health),
            self.interval,
            self.cancel.clone(),
        ));
        self.handle = Some(handle);
        self.state = TaskState::Running;
        info!(task = %self.kind, interval_secs = self.interval.as_secs(), "Start {}", self.kind);
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            self.state = TaskState::Stopped;
            return;
        };
        self.state = TaskState::Stopping;
        self.cancel.cancel();

        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(task = %self.kind, error = %e, "exception from {}", self.kind),
        }
        self.state = TaskState::Stopped;
        info!(task = %self.kind, "Stopped {}", self.kind);
    }

    fn is_healthy(&self) -> bool {
        self.state() == TaskState::Running
    }
}
