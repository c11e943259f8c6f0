//! Current sensor readings and pump flags of the simulated controller.

use std::fmt;

use crate::signal::SignalGenerator;

/// Number of independently irrigated zones.
pub(crate) const ZONE_COUNT: usize = 2;

// ---------------------------------------------------------------------------
// Valid ranges
// ---------------------------------------------------------------------------

/// Closed range a reading is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bounds {
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl Bounds {
    pub(crate) const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub(crate) fn clamp(self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    pub(crate) fn contains(self, v: f64) -> bool {
        (self.min..=self.max).contains(&v)
    }
}

pub(crate) const MOISTURE_BOUNDS: Bounds = Bounds::new(0.0, 100.0);
pub(crate) const AMBIENT_BOUNDS: Bounds = Bounds::new(15.0, 40.0);
pub(crate) const PLANT_BOUNDS: Bounds = Bounds::new(12.0, 35.0);
pub(crate) const HUMIDITY_BOUNDS: Bounds = Bounds::new(30.0, 95.0);

// Per-tick random walk step sizes.
const MOISTURE_STEP: f64 = 1.0;
const AMBIENT_STEP: f64 = 0.3;
const PLANT_STEP: f64 = 0.2;
const HUMIDITY_STEP: f64 = 2.0;

/// Round to one decimal place, the precision every reading is reported at.
pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Zone identity
// ---------------------------------------------------------------------------

/// A 1-based zone number, guaranteed to be in `1..=ZONE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ZoneId(u8);

impl ZoneId {
    pub(crate) fn new(number: u8) -> Option<Self> {
        (1..=ZONE_COUNT as u8).contains(&number).then_some(Self(number))
    }

    pub(crate) fn all() -> impl Iterator<Item = ZoneId> {
        (1..=ZONE_COUNT as u8).map(ZoneId)
    }

    pub(crate) fn number(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ZoneState {
    /// Soil moisture, percent.
    pub(crate) moisture: f64,
    /// Ambient temperature, °C.
    pub(crate) temperature: f64,
    pub(crate) pump_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SensorState {
    pub(crate) zones: [ZoneState; ZONE_COUNT],
    /// Leaf temperature, °C. Only reported in the extended wire format.
    pub(crate) plant_temperature: f64,
    /// Air relative humidity, percent. Only reported in the extended wire format.
    pub(crate) relative_humidity: f64,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            zones: [
                ZoneState {
                    moisture: 45.2,
                    temperature: 24.5,
                    pump_active: false,
                },
                ZoneState {
                    moisture: 38.7,
                    temperature: 26.1,
                    pump_active: false,
                },
            ],
            plant_temperature: 23.8,
            relative_humidity: 65.2,
        }
    }
}

impl SensorState {
    pub(crate) fn zone(&self, zone: ZoneId) -> &ZoneState {
        &self.zones[zone.index()]
    }

    pub(crate) fn zone_mut(&mut self, zone: ZoneId) -> &mut ZoneState {
        &mut self.zones[zone.index()]
    }

    /// Set a pump flag. Returns `true` if the flag actually changed.
    pub(crate) fn set_pump(&mut self, zone: ZoneId, on: bool) -> bool {
        let z = self.zone_mut(zone);
        let changed = z.pump_active != on;
        z.pump_active = on;
        changed
    }

    /// Apply one random-walk step to every continuous reading, then clamp
    /// and round. Pump flags are left untouched.
    pub(crate) fn perturb(&mut self, noise: &mut dyn SignalGenerator) {
        for z in &mut self.zones {
            z.moisture = step(z.moisture, noise.uniform(MOISTURE_STEP), MOISTURE_BOUNDS);
            z.temperature = step(z.temperature, noise.uniform(AMBIENT_STEP), AMBIENT_BOUNDS);
        }
        self.plant_temperature = step(
            self.plant_temperature,
            noise.uniform(PLANT_STEP),
            PLANT_BOUNDS,
        );
        self.relative_humidity = step(
            self.relative_humidity,
            noise.uniform(HUMIDITY_STEP),
            HUMIDITY_BOUNDS,
        );
    }

    /// True when every bounded reading is inside its valid range.
    pub(crate) fn in_bounds(&self) -> bool {
        self.zones
            .iter()
            .all(|z| MOISTURE_BOUNDS.contains(z.moisture) && AMBIENT_BOUNDS.contains(z.temperature))
            && PLANT_BOUNDS.contains(self.plant_temperature)
            && HUMIDITY_BOUNDS.contains(self.relative_humidity)
    }
}

fn step(value: f64, delta: f64, bounds: Bounds) -> f64 {
    // Bounds are whole numbers, so rounding after the clamp cannot leave them.
    round1(bounds.clamp(value + delta))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{FixedSignal, RandomSignal};
    use proptest::prelude::*;

    // -- ZoneId -------------------------------------------------------------

    #[test]
    fn zone_id_accepts_configured_zones() {
        assert_eq!(ZoneId::new(1).map(ZoneId::index), Some(0));
        assert_eq!(ZoneId::new(2).map(ZoneId::index), Some(1));
    }

    #[test]
    fn zone_id_rejects_out_of_range() {
        assert_eq!(ZoneId::new(0), None);
        assert_eq!(ZoneId::new(3), None);
    }

    #[test]
    fn zone_id_all_is_ordered() {
        let numbers: Vec<u8> = ZoneId::all().map(ZoneId::number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn zone_id_display() {
        assert_eq!(ZoneId::new(2).unwrap().to_string(), "zone2");
    }

    // -- perturb ------------------------------------------------------------

    #[test]
    fn default_state_is_in_bounds() {
        assert!(SensorState::default().in_bounds());
    }

    #[test]
    fn perturb_applies_step_and_rounds() {
        let mut s = SensorState::default();
        s.perturb(&mut FixedSignal(0.5));
        // moisture and humidity steps take the whole offset
        assert_eq!(s.zones[0].moisture, 45.7);
        assert_eq!(s.relative_humidity, 65.7);
        // ambient and plant steps clip it
        assert_eq!(s.zones[0].temperature, 24.8);
        assert_eq!(s.plant_temperature, 24.0);
    }

    #[test]
    fn perturb_clamps_at_upper_bound() {
        let mut s = SensorState::default();
        s.zones[0].moisture = 99.8;
        s.zones[1].temperature = 39.9;
        s.relative_humidity = 94.5;
        s.perturb(&mut FixedSignal(10.0));
        assert_eq!(s.zones[0].moisture, 100.0);
        assert_eq!(s.zones[1].temperature, 40.0);
        assert_eq!(s.relative_humidity, 95.0);
    }

    #[test]
    fn perturb_clamps_at_lower_bound() {
        let mut s = SensorState::default();
        s.zones[1].moisture = 0.4;
        s.zones[0].temperature = 15.1;
        s.plant_temperature = 12.1;
        s.perturb(&mut FixedSignal(-10.0));
        assert_eq!(s.zones[1].moisture, 0.0);
        assert_eq!(s.zones[0].temperature, 15.0);
        assert_eq!(s.plant_temperature, 12.0);
    }

    #[test]
    fn perturb_leaves_pumps_alone() {
        let mut s = SensorState::default();
        s.zones[1].pump_active = true;
        s.perturb(&mut RandomSignal::seeded(1));
        assert!(!s.zones[0].pump_active);
        assert!(s.zones[1].pump_active);
    }

    #[test]
    fn set_pump_reports_change() {
        let mut s = SensorState::default();
        let z1 = ZoneId::new(1).unwrap();
        assert!(s.set_pump(z1, true));
        assert!(!s.set_pump(z1, true));
        assert!(s.zone(z1).pump_active);
        assert!(s.set_pump(z1, false));
    }

    proptest! {
        #[test]
        fn perturb_never_leaves_bounds(seed in any::<u64>(), ticks in 1usize..400) {
            let mut s = SensorState::default();
            let mut noise = RandomSignal::seeded(seed);
            for _ in 0..ticks {
                s.perturb(&mut noise);
                prop_assert!(s.in_bounds(), "out of bounds: {:?}", s);
            }
        }

        #[test]
        fn perturb_with_extreme_offsets_stays_in_bounds(offsets in prop::collection::vec(-50.0f64..50.0, 1..200)) {
            let mut s = SensorState::default();
            for off in offsets {
                s.perturb(&mut FixedSignal(off));
                prop_assert!(s.in_bounds(), "out of bounds: {:?}", s);
            }
        }
    }
}
