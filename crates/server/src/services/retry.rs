//! Background redial worker.
//!
//! Redials live in the `call_retries` table, so a restart loses nothing: the
//! worker simply picks up whatever is due on its next tick.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::state::AppState;

/// Tasks claimed per tick.
const BATCH_SIZE: u32 = 50;

/// Spawn the redial loop, polling every `interval`.
pub fn spawn_retry_worker(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Redial worker started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    })
}

/// One polling pass.
pub async fn run_once(state: &AppState) {
    match state.workflow().run_due_retries(Utc::now(), BATCH_SIZE).await {
        Ok(0) => {}
        Ok(attempted) => debug!(attempted, "Redials attempted"),
        Err(e) => error!(error = %e, "Failed to claim due redials"),
    }
}
