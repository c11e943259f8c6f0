//! Aggregate statistics over the whole history buffer.

use crate::history::HistoryBuffer;
use crate::sensors::ZONE_COUNT;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum StatsError {
    #[error("history is empty")]
    EmptyHistory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Summary {
    pub(crate) mean: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ZoneStats {
    pub(crate) moisture: Summary,
    pub(crate) temperature: Summary,
    /// Share of samples with the pump running, percent.
    pub(crate) pump_duty_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stats {
    pub(crate) samples: usize,
    pub(crate) zones: [ZoneStats; ZONE_COUNT],
}

struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, v: f64) {
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }

    fn finish(&self, n: usize) -> Summary {
        Summary {
            mean: self.sum / n as f64,
            min: self.min,
            max: self.max,
        }
    }
}

pub(crate) fn compute(history: &HistoryBuffer) -> Result<Stats, StatsError> {
    let n = history.len();
    if n == 0 {
        return Err(StatsError::EmptyHistory);
    }

    let zones = std::array::from_fn(|i| {
        let mut moisture = Accumulator::new();
        let mut temperature = Accumulator::new();
        let mut active = 0_usize;

        for entry in history.iter() {
            let z = &entry.sensors.zones[i];
            moisture.push(z.moisture);
            temperature.push(z.temperature);
            if z.pump_active {
                active += 1;
            }
        }

        ZoneStats {
            moisture: moisture.finish(n),
            temperature: temperature.finish(n),
            pump_duty_pct: active as f64 * 100.0 / n as f64,
        }
    });

    Ok(Stats { samples: n, zones })
}

// ===========================================================================
// Tests
// ===========================================================================
