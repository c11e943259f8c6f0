//! Background loop driving the simulated sensors.
//!
//! Every tick: random walk → automatic irrigation → history snapshot. The loop
//! owns no client state and keeps running regardless of what the listener does.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::state::SharedState;

/// Tick until `shutdown` flips (or its sender is dropped).
pub(crate) async fn run(shared: SharedState, tick: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the seeded history already covers "now".
    ticker.tick().await;

    info!(tick_ms = tick.as_millis() as u64, "simulation loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut st = shared.lock().await;
                let transitions = st.tick();
                if !transitions.is_empty() {
                    debug!(changed = transitions.len(), "tick changed pump state");
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("simulation loop stopped");
}

// ===========================================================================
// Tests
// ===========================================================================
