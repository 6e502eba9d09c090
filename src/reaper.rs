//! Background sweep that returns expired pending holds to availability.
//!
//! Conflict checks already ignore expired holds, so the engine stays
//! correct even if the reaper never runs; the sweep exists to flip the
//! records to `cancelled` and emit `hold_expired` events promptly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::engine::Engine;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the reaper loop. Runs until the returned handle is aborted.
pub fn spawn(engine: Arc<Engine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let released = sweep_once(&engine).await;
            if released > 0 {
                tracing::debug!(released, "reaper released expired holds");
            }
        }
    })
}

/// One sweep pass. Returns how many holds were released.
pub async fn sweep_once(engine: &Engine) -> usize {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let mut released = 0;
    for (occurrence_id, _mentor) in engine.collect_expired_holds(now) {
        match engine.release_expired_hold(occurrence_id, now).await {
            Ok(true) => released += 1,
            // Confirmed (or removed) between collect and release.
            Ok(false) => {}
            Err(err) => tracing::warn!(%occurrence_id, %err, "reaper release failed"),
        }
    }
    let purged = engine.purge_stale_idempotency_keys(now);
    if purged > 0 {
        tracing::debug!(purged, "reaper dropped stale idempotency keys");
    }
    released
}
