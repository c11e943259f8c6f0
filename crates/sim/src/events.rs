//! Bounded in-memory log of notable simulator events, served by `EVENTOS`.

use std::collections::VecDeque;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::sensors::ZoneId;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Pump,
    Client,
    System,
}

impl EventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pump => "pump",
            Self::Client => "client",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SystemEvent {
    pub(crate) ts: OffsetDateTime,
    pub(crate) kind: EventKind,
    pub(crate) detail: String,
}

impl SystemEvent {
    pub(crate) fn timestamp(&self) -> String {
        self.ts
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.ts.unix_timestamp().to_string())
    }
}

/// Who flipped a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpSource {
    Auto,
    Manual,
}

#[derive(Debug, Default)]
pub(crate) struct EventLog {
    events: VecDeque<SystemEvent>,
}

impl EventLog {
    pub(crate) fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub(crate) fn record_pump(&mut self, zone: ZoneId, on: bool, source: PumpSource, moisture: f64) {
        let how = match source {
            PumpSource::Auto => "auto",
            PumpSource::Manual => "manual",
        };
        let state_str = if on { "ON" } else { "OFF" };
        self.push(
            EventKind::Pump,
            format!("{zone} pump {state_str} ({how}, moisture {moisture:.1}%)"),
        );
    }

    pub(crate) fn record_client(&mut self, detail: String) {
        self.push(EventKind::Client, detail);
    }

    pub(crate) fn record_system(&mut self, detail: String) {
        self.push(EventKind::System, detail);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// The last `count` events, oldest first.
    pub(crate) fn recent(&self, count: usize) -> impl Iterator<Item = &SystemEvent> {
        self.events.range(self.events.len().saturating_sub(count)..)
    }

    fn push(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
