//! Advisory lock gate: cross-instance mutual exclusion for task cycles.
//!
//! Keys are derived from a task identifier and taken with
//! `pg_try_advisory_xact_lock`, so they are released when the enclosing
//! transaction ends.

use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::config::{LOCK_RETRY_MAX_MS, LOCK_RETRY_MIN_MS};
use crate::error::{AppError, Result};
use crate::store::StoreTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// One attempt. Failure means another instance holds the lock.
    NoWait,
    /// Retry with jittered backoff until the timeout elapses.
    Wait(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    NotAcquired,
}

/// First 8 bytes of SHA-256(ident), little-endian, as a signed key.
pub fn lock_key(ident: &str) -> i64 {
    let digest = Sha256::digest(ident.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_le_bytes(bytes)
}

pub async fn try_acquire(
    tx: &mut dyn StoreTx,
    ident: &str,
    mode: LockMode,
) -> Result<LockOutcome> {
    let key = lock_key(ident);

    match mode {
        LockMode::NoWait => {
            if tx.try_advisory_xact_lock(key).await? {
                Ok(LockOutcome::Acquired)
            } else {
                debug!(lock = ident, "advisory lock held elsewhere");
                Ok(LockOutcome::NotAcquired)
            }
        }
        LockMode::Wait(timeout) => {
            let deadline = Instant::now() + timeout;
            loop {
                if tx.try_advisory_xact_lock(key).await? {
                    return Ok(LockOutcome::Acquired);
                }
                if Instant::now() >= deadline {
                    return Err(AppError::LockTimeout {
                        ident: ident.to_string(),
                        timeout_ms: timeout.as_millis(),
                    });
                }
                let backoff_ms = rand::thread_rng().gen_range(LOCK_RETRY_MIN_MS..=LOCK_RETRY_MAX_MS);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}
