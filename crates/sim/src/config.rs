//! TOML config file loading and validation.
//!
//! Every field has a default, so a missing or empty file yields a runnable
//! simulator listening on `127.0.0.1:9999`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::history::DEFAULT_CAPACITY;
use crate::policy::Thresholds;
use crate::protocol::{WireFormat, WireSettings};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) server: ServerSection,
    pub(crate) simulation: SimulationSection,
    pub(crate) thresholds: Thresholds,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct ServerSection {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct SimulationSection {
    /// Wall-clock time between two simulation ticks.
    pub(crate) tick_ms: u64,
    /// Logical time one tick represents in the history.
    pub(crate) sample_minutes: u32,
    pub(crate) history_capacity: usize,
    /// Synthetic entries generated at startup.
    pub(crate) seed_entries: usize,
    /// Entries returned by `HISTORIAL_RECIENTE`.
    pub(crate) recent_entries: usize,
    pub(crate) wire_format: WireFormat,
    /// Fixes the noise sequence for reproducible runs.
    pub(crate) rng_seed: Option<u64>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tick_ms: 3000,
            sample_minutes: 10,
            history_capacity: DEFAULT_CAPACITY,
            seed_entries: DEFAULT_CAPACITY,
            recent_entries: 24,
            wire_format: WireFormat::Extended,
            rng_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived settings
// ---------------------------------------------------------------------------

impl Config {
    pub(crate) fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn tick(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_ms)
    }

    pub(crate) fn sample_interval(&self) -> time::Duration {
        time::Duration::minutes(i64::from(self.simulation.sample_minutes))
    }

    pub(crate) fn wire_settings(&self) -> WireSettings {
        WireSettings {
            format: self.simulation.wire_format,
            recent_entries: self.simulation.recent_entries,
        }
    }

    /// `SIM_HOST` / `SIM_PORT` take precedence over the file.
    pub(crate) fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var("SIM_HOST").ok(),
            std::env::var("SIM_PORT").ok(),
        )
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("SIM_PORT is not a valid port: {port:?}"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub(crate) fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_server(&mut errors);
        self.validate_simulation(&mut errors);
        self.validate_thresholds(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_server(&self, errors: &mut Vec<String>) {
        if self.server.host.trim().is_empty() {
            errors.push("server.host is empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
    }

    fn validate_simulation(&self, errors: &mut Vec<String>) {
        let s = &self.simulation;

        if s.tick_ms == 0 {
            errors.push("simulation.tick_ms must be positive".to_string());
        }
        if s.sample_minutes == 0 {
            errors.push("simulation.sample_minutes must be positive".to_string());
        }
        if s.history_capacity == 0 {
            errors.push("simulation.history_capacity must be positive".to_string());
        }
        if s.recent_entries == 0 {
            errors.push("simulation.recent_entries must be positive".to_string());
        }
        if s.seed_entries > s.history_capacity {
            errors.push(format!(
                "simulation.seed_entries ({}) exceeds history_capacity ({})",
                s.seed_entries, s.history_capacity
            ));
        }
    }

    fn validate_thresholds(&self, errors: &mut Vec<String>) {
        let t = &self.thresholds;
        if let Err(e) = Thresholds::new(t.moisture_min, t.moisture_max) {
            errors.push(e.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file means
/// "all defaults".
pub(crate) fn load(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {path}"))?;
        info!(path, "config loaded");
        config
    } else {
        info!(path, "config file not found, using defaults");
        Config::default()
    };

    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
