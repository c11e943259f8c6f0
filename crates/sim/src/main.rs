mod config;
mod events;
mod history;
mod policy;
mod protocol;
mod sensors;
mod server;
mod signal;
mod simulation;
mod state;
mod stats;

use std::env;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sensors::ZoneId;
use signal::{RandomSignal, SignalGenerator};
use state::SimState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let mut cfg = config::load(&config_path)?;
    cfg.apply_env_overrides()?;
    cfg.validate().context("invalid config after env overrides")?;

    // ── Simulation state ────────────────────────────────────────────
    let noise: Box<dyn SignalGenerator> = match cfg.simulation.rng_seed {
        Some(seed) => {
            info!(seed, "using seeded noise");
            Box::new(RandomSignal::seeded(seed))
        }
        None => Box::new(RandomSignal::new()),
    };
    let mut sim = SimState::new(
        cfg.thresholds,
        cfg.simulation.history_capacity,
        cfg.sample_interval(),
        noise,
    );
    sim.seed_history(cfg.simulation.seed_entries, OffsetDateTime::now_utc());
    info!(
        entries = sim.history.len(),
        capacity = sim.history.capacity(),
        "history seeded"
    );
    log_summary(&sim, "initial state");
    let shared = sim.into_shared();

    // ── Listener ────────────────────────────────────────────────────
    let addr = cfg.listen_addr();
    let listener = server::bind(&addr).await?;
    info!(
        %addr,
        format = ?cfg.simulation.wire_format,
        moisture_min = cfg.thresholds.moisture_min,
        moisture_max = cfg.thresholds.moisture_max,
        "irrigation simulator listening"
    );
    shared
        .lock()
        .await
        .events
        .record_system(format!("listening on {addr}"));

    // ── Tasks ───────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sim_task = tokio::spawn(simulation::run(
        shared.clone(),
        cfg.tick(),
        shutdown_rx.clone(),
    ));
    let server_task = tokio::spawn(server::serve(
        listener,
        shared.clone(),
        cfg.wire_settings(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    // Receivers may already be gone if both tasks ended on their own.
    let _ = shutdown_tx.send(true);

    for (name, task) in [("simulation", sim_task), ("server", server_task)] {
        if let Err(e) = task.await {
            warn!(task = name, "task ended abnormally: {e}");
        }
    }

    let st = shared.lock().await;
    log_summary(&st, "final state");
    info!(
        uptime_s = st.started_at.elapsed().as_secs(),
        samples = st.history.len(),
        events = st.events.len(),
        "irrigation simulator stopped"
    );
    Ok(())
}

/// Current readings plus whole-history averages and pump duty cycles.
fn log_summary(st: &SimState, label: &str) {
    for zone in ZoneId::all() {
        let z = st.sensors.zone(zone);
        info!(
            %zone,
            moisture = z.moisture,
            temperature = z.temperature,
            pump = z.pump_active,
            "{label}"
        );
    }
    info!(
        plant_temperature = st.sensors.plant_temperature,
        relative_humidity = st.sensors.relative_humidity,
        "{label}"
    );

    match stats::compute(&st.history) {
        Ok(s) => {
            for (zone, z) in ZoneId::all().zip(s.zones.iter()) {
                info!(
                    %zone,
                    samples = s.samples,
                    moisture_avg = sensors::round1(z.moisture.mean),
                    temperature_avg = sensors::round1(z.temperature.mean),
                    pump_duty_pct = sensors::round1(z.pump_duty_pct),
                    "history summary"
                );
            }
        }
        Err(e) => info!("history summary unavailable: {e}"),
    }
}
