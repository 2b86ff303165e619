//! Interval-driven background loops.
//!
//! The matching loop fires at a fixed period with no backpressure:
//! overlapping triggers are serialized by the distributed pool lock,
//! so a surplus invocation just reports a skipped cycle.

use std::sync::Arc;

use tracing::{error, info};

use crate::engine::{CycleOutcome, MatchingEngine};
use crate::expiry::ExpiryWorker;

/// Drive matching cycles forever at the configured interval.
pub async fn run_matching_loop(engine: Arc<MatchingEngine>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match engine.run_cycle().await {
            Ok(CycleOutcome::Skipped) => {
                info!("Matching cycle skipped; lock held by another process");
            }
            Ok(CycleOutcome::Completed(report)) => {
                info!(
                    cycle_id = %report.cycle_id,
                    matches = report.exact_matches + report.multi_matches + report.partial_matches,
                    "Scheduled matching cycle completed"
                );
            }
            Err(e) => {
                error!(error = %e, "Matching cycle failed");
            }
        }
    }
}

/// Drive expiry sweeps forever at the configured interval.
pub async fn run_expiry_loop(worker: Arc<ExpiryWorker>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match worker.sweep().await {
            Ok(sweep) if sweep.expired_count > 0 => {
                info!(expired = sweep.expired_count, "Expiry sweep completed");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Expiry sweep failed");
            }
        }
    }
}
