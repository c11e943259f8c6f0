//! Rolling history of sensor snapshots.
//!
//! The buffer holds at most `capacity` entries (144 by default: 24 hours at
//! one sample every 10 minutes). Appending to a full buffer evicts the oldest
//! entry, so iteration order is always chronological.

use std::collections::vec_deque::{self, VecDeque};
use std::f64::consts::PI;

use time::OffsetDateTime;

use crate::policy::Thresholds;
use crate::sensors::{
    round1, Bounds, SensorState, ZoneState, AMBIENT_BOUNDS, HUMIDITY_BOUNDS, PLANT_BOUNDS,
    ZONE_COUNT,
};
use crate::signal::SignalGenerator;

pub(crate) const DEFAULT_CAPACITY: usize = 144;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistoryEntry {
    pub(crate) seq: u64,
    pub(crate) recorded_at: OffsetDateTime,
    pub(crate) sensors: SensorState,
}

pub(crate) struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    next_seq: u64,
}

impl HistoryBuffer {
    /// A zero capacity is bumped to one so `append` always retains the newest entry.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest to newest.
    pub(crate) fn iter(&self) -> vec_deque::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub(crate) fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// The last `min(count, len)` entries, oldest first.
    pub(crate) fn recent(&self, count: usize) -> vec_deque::Iter<'_, HistoryEntry> {
        let start = self.entries.len().saturating_sub(count);
        self.entries.range(start..)
    }

    pub(crate) fn append(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.entries.push_back(entry);
    }

    /// Snapshot `sensors` under the next sequence number.
    pub(crate) fn record(&mut self, sensors: SensorState, recorded_at: OffsetDateTime) -> u64 {
        let seq = self.next_seq;
        self.append(HistoryEntry {
            seq,
            recorded_at,
            sensors,
        });
        seq
    }

    /// Fill the buffer with `count` synthetic samples ending at `now`, one
    /// `interval` apart, so a fresh process already has a day of data.
    pub(crate) fn seed(
        &mut self,
        count: usize,
        interval: time::Duration,
        now: OffsetDateTime,
        thresholds: &Thresholds,
        noise: &mut dyn SignalGenerator,
    ) {
        for i in 0..count {
            let back = (count - 1 - i) as i32;
            let at = now - interval * back;
            let sensors = day_night_sample(hour_of_day(at), thresholds, noise);
            self.record(sensors, at);
        }
    }
}

// ---------------------------------------------------------------------------
// Day/night model for seeded history
// ---------------------------------------------------------------------------

/// Hour at which the day factor crosses zero going up. Peak heat lands six
/// hours later, mid-afternoon.
const DAWN_HOUR: f64 = 8.0;

/// Seeded soil moisture stays off the extremes.
const SEED_MOISTURE_BOUNDS: Bounds = Bounds::new(10.0, 90.0);

struct ZoneProfile {
    moisture_base: f64,
    moisture_swing: f64,
    temperature_base: f64,
    temperature_swing: f64,
}

const ZONE_PROFILES: [ZoneProfile; ZONE_COUNT] = [
    ZoneProfile {
        moisture_base: 50.0,
        moisture_swing: 15.0,
        temperature_base: 22.0,
        temperature_swing: 8.0,
    },
    ZoneProfile {
        moisture_base: 45.0,
        moisture_swing: 12.0,
        temperature_base: 24.0,
        temperature_swing: 6.0,
    },
];

fn hour_of_day(at: OffsetDateTime) -> f64 {
    f64::from(at.hour()) + f64::from(at.minute()) / 60.0
}

/// `+1` in the afternoon, `-1` before dawn.
fn day_factor(hour: f64) -> f64 {
    (2.0 * PI * (hour - DAWN_HOUR) / 24.0).sin()
}

/// Temperatures rise with the sun while soil moisture and air humidity fall.
fn day_night_sample(
    hour: f64,
    thresholds: &Thresholds,
    noise: &mut dyn SignalGenerator,
) -> SensorState {
    let f = day_factor(hour);

    let zones: [ZoneState; ZONE_COUNT] = std::array::from_fn(|i| {
        let p = &ZONE_PROFILES[i];
        let temperature =
            AMBIENT_BOUNDS.clamp(p.temperature_base + f * p.temperature_swing + noise.uniform(2.0));
        let moisture =
            SEED_MOISTURE_BOUNDS.clamp(p.moisture_base - f * p.moisture_swing + noise.uniform(5.0));
        ZoneState {
            moisture: round1(moisture),
            temperature: round1(temperature),
            pump_active: moisture < thresholds.moisture_min,
        }
    });

    let mean_ambient = zones.iter().map(|z| z.temperature).sum::<f64>() / ZONE_COUNT as f64;
    let plant = PLANT_BOUNDS.clamp(mean_ambient - 1.5 + noise.uniform(1.0));
    let humidity = HUMIDITY_BOUNDS.clamp(70.0 - f * 25.0 + noise.uniform(8.0));

    SensorState {
        zones,
        plant_temperature: round1(plant),
        relative_humidity: round1(humidity),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
