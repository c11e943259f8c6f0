//! Automatic irrigation: a two-threshold (hysteresis) controller per zone.
//!
//! ```text
//!  pump OFF ──[moisture < moisture_min]──▶ pump ON
//!     ▲                                      │
//!     └────────[moisture > moisture_max]─────┘
//! ```
//!
//! Between the two thresholds nothing changes, so a zone hovering near one
//! setpoint cannot chatter.

use serde::Deserialize;
use tracing::info;

use crate::sensors::{SensorState, ZoneId, MOISTURE_BOUNDS};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct Thresholds {
    /// Turn the pump on below this moisture (percent).
    pub(crate) moisture_min: f64,
    /// Turn the pump off above this moisture (percent).
    pub(crate) moisture_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            moisture_min: 30.0,
            moisture_max: 70.0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum ThresholdsError {
    #[error("thresholds.{name} {value} out of range [0, 100]")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("thresholds.moisture_max ({max}) must be greater than moisture_min ({min})")]
    Unordered { min: f64, max: f64 },
}

impl Thresholds {
    /// Both setpoints must be valid moisture percentages with `min < max`.
    pub(crate) fn new(moisture_min: f64, moisture_max: f64) -> Result<Self, ThresholdsError> {
        for (name, value) in [("moisture_min", moisture_min), ("moisture_max", moisture_max)] {
            if !MOISTURE_BOUNDS.contains(value) {
                return Err(ThresholdsError::OutOfRange { name, value });
            }
        }
        if moisture_min >= moisture_max {
            return Err(ThresholdsError::Unordered {
                min: moisture_min,
                max: moisture_max,
            });
        }
        Ok(Self {
            moisture_min,
            moisture_max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PumpTransition {
    pub(crate) zone: ZoneId,
    pub(crate) on: bool,
    pub(crate) moisture: f64,
}

/// Apply the hysteresis rule to every zone and return the pumps it flipped.
pub(crate) fn evaluate(state: &mut SensorState, thresholds: &Thresholds) -> Vec<PumpTransition> {
    let mut transitions = Vec::new();

    for zone in ZoneId::all() {
        let z = state.zone_mut(zone);
        let turn_on = !z.pump_active && z.moisture < thresholds.moisture_min;
        let turn_off = z.pump_active && z.moisture > thresholds.moisture_max;
        if !(turn_on || turn_off) {
            continue;
        }

        z.pump_active = turn_on;
        info!(
            %zone,
            moisture = z.moisture,
            min = thresholds.moisture_min,
            max = thresholds.moisture_max,
            "auto irrigation: pump {}",
            if turn_on { "ON" } else { "OFF" }
        );
        transitions.push(PumpTransition {
            zone,
            on: turn_on,
            moisture: z.moisture,
        });
    }

    transitions
}

// ===========================================================================
// Tests
// ===========================================================================
