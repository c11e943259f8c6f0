//! Noise sources for the simulated sensors.
//!
//! Everything that needs randomness (the per-tick random walk and the jitter
//! on seeded history) draws from a [`SignalGenerator`], so tests can swap in a
//! deterministic [`FixedSignal`] and assert exact values.

/// Source of bounded noise.
pub(crate) trait SignalGenerator: Send {
    /// Sample a value in `[-spread, spread]`.
    fn uniform(&mut self, spread: f64) -> f64;
}

// ---------------------------------------------------------------------------
// Random walk noise (production)
// ---------------------------------------------------------------------------

pub(crate) struct RandomSignal {
    rng: fastrand::Rng,
}

impl RandomSignal {
    pub(crate) fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Reproducible noise, selected with `simulation.rng_seed`.
    pub(crate) fn seeded(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl SignalGenerator for RandomSignal {
    fn uniform(&mut self, spread: f64) -> f64 {
        if spread <= 0.0 {
            return 0.0;
        }
        (self.rng.f64() * 2.0 - 1.0) * spread
    }
}

// ---------------------------------------------------------------------------
// Deterministic noise
// ---------------------------------------------------------------------------

/// Always returns the same offset, clipped to the requested spread.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedSignal(pub(crate) f64);

#[cfg(test)]
impl SignalGenerator for FixedSignal {
    fn uniform(&mut self, spread: f64) -> f64 {
        let spread = spread.abs();
        self.0.clamp(-spread, spread)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
