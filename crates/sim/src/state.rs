use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{info, trace};

use crate::events::{EventLog, PumpSource};
use crate::history::HistoryBuffer;
use crate::policy::{self, PumpTransition, Thresholds};
use crate::sensors::{SensorState, ZoneId};
use crate::signal::SignalGenerator;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

/// One mutex around everything; every critical section is a handful of
/// field updates or a string format.
pub(crate) type SharedState = Arc<Mutex<SimState>>;

// ---------------------------------------------------------------------------
// Core type
// ---------------------------------------------------------------------------

pub(crate) struct SimState {
    pub(crate) started_at: Instant,
    pub(crate) sensors: SensorState,
    pub(crate) history: HistoryBuffer,
    pub(crate) thresholds: Thresholds,
    pub(crate) events: EventLog,
    /// Logical time between two history samples.
    sample_interval: time::Duration,
    noise: Box<dyn SignalGenerator>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SimState {
    pub(crate) fn new(
        thresholds: Thresholds,
        history_capacity: usize,
        sample_interval: time::Duration,
        noise: Box<dyn SignalGenerator>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            sensors: SensorState::default(),
            history: HistoryBuffer::new(history_capacity),
            thresholds,
            events: EventLog::new(),
            sample_interval,
            noise,
        }
    }

    pub(crate) fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Synthesize `count` past samples ending at `now` and continue from the
    /// newest one.
    pub(crate) fn seed_history(&mut self, count: usize, now: OffsetDateTime) {
        self.history.seed(
            count,
            self.sample_interval,
            now,
            &self.thresholds,
            self.noise.as_mut(),
        );
        if let Some(latest) = self.history.latest() {
            self.sensors = latest.sensors;
        }
        self.events
            .record_system(format!("history seeded with {} entries", self.history.len()));
    }

    /// One simulation step: random walk, automatic irrigation, snapshot.
    pub(crate) fn tick(&mut self) -> Vec<PumpTransition> {
        self.sensors.perturb(self.noise.as_mut());
        debug_assert!(self.sensors.in_bounds(), "{:?}", self.sensors);

        let transitions = self.run_policy();

        let recorded_at = self
            .history
            .latest()
            .map(|e| e.recorded_at + self.sample_interval)
            .unwrap_or_else(OffsetDateTime::now_utc);
        let seq = self.history.record(self.sensors, recorded_at);
        trace!(seq, sensors = ?self.sensors, "sample recorded");

        transitions
    }

    /// Evaluate the hysteresis policy once and log what it changed.
    pub(crate) fn run_policy(&mut self) -> Vec<PumpTransition> {
        let transitions = policy::evaluate(&mut self.sensors, &self.thresholds);
        for t in &transitions {
            self.events
                .record_pump(t.zone, t.on, PumpSource::Auto, t.moisture);
        }
        transitions
    }

    /// Operator override. Bypasses the policy; the next tick may undo it.
    pub(crate) fn set_pump(&mut self, zone: ZoneId, on: bool) {
        let changed = self.sensors.set_pump(zone, on);
        info!(%zone, on, changed, "manual pump command");
        let moisture = self.sensors.zone(zone).moisture;
        self.events
            .record_pump(zone, on, PumpSource::Manual, moisture);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
