//! Periodic dispatch loop.
//!
//! Runs as a background Tokio task, ticking at a configurable interval. Each
//! tick drains the due-message snapshot through the [`Dispatcher`] and
//! otherwise performs no logic.
//!
//! Passes cannot overlap: the loop awaits `drain_due` to completion before
//! polling the next tick, so a slow pass delays the following one rather than
//! running alongside it. This is what keeps a single-process deployment at
//! at-most-one concurrent delivery attempt per message; running several
//! dispatch workers against the same database would need an atomic claim step
//! the store does not currently provide.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::Dispatcher;

/// Default seconds between drain passes.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Run the dispatch loop until shutdown is signalled.
///
/// Ticks every `interval_secs`. The first immediate tick is skipped so the
/// daemon does not drain before the rest of startup settles. Exits when the
/// shutdown watch flips to `true` or its sender side is dropped.
pub async fn run_scheduler(
    dispatcher: Dispatcher,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(interval_secs, "dispatch scheduler started");

    // interval(0) panics; config validation rejects zero, clamp anyway.
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match dispatcher.drain_due().await {
                    Ok(outcome) => {
                        if outcome.sent > 0 || outcome.failed > 0 || outcome.skipped > 0 {
                            info!(
                                sent = outcome.sent,
                                failed = outcome.failed,
                                skipped = outcome.skipped,
                                "drain pass dispatched due messages"
                            );
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "drain pass failed");
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("dispatch scheduler shutting down");
                    break;
                }
            }
        }
    }

    info!("dispatch scheduler stopped");
}
