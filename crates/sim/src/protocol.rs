//! Line-oriented text protocol spoken by the simulated controller.
//!
//! Every request is one line holding a single command token (case-insensitive;
//! anything after the first whitespace, such as a pump intensity, is ignored).
//! Every response is one line, except the history and event dumps, which are
//! blocks framed by `*_INICIO` / `*_FIN` marker lines.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::events::SystemEvent;
use crate::history::HistoryEntry;
use crate::sensors::{SensorState, ZoneId, ZONE_COUNT};
use crate::state::SimState;
use crate::stats::{self, Stats, StatsError};

// ---------------------------------------------------------------------------
// Fixed response tokens
// ---------------------------------------------------------------------------

pub(crate) const STATUS_PREFIX: &str = "DATOS:";
pub(crate) const HISTORY_ROW_PREFIX: &str = "HR:";
pub(crate) const STATS_PREFIX: &str = "STATS:";
pub(crate) const EVENT_ROW_PREFIX: &str = "EV:";
pub(crate) const HISTORY_BEGIN: &str = "HISTORIAL_RECIENTE_INICIO";
pub(crate) const HISTORY_END: &str = "HISTORIAL_RECIENTE_FIN";
pub(crate) const EVENTS_BEGIN: &str = "EVENTOS_INICIO";
pub(crate) const EVENTS_END: &str = "EVENTOS_FIN";
pub(crate) const NO_DATA: &str = "SIN_DATOS";
pub(crate) const NO_HISTORY: &str = "SIN_HISTORIAL";
pub(crate) const AUTO_ACK: &str = "MODO_AUTO_ACTIVADO";
pub(crate) const PONG: &str = "PONG";
pub(crate) const UNKNOWN_COMMAND: &str = "COMANDO_DESCONOCIDO";

/// Number of events returned by `EVENTOS`.
const EVENTS_DUMP_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Status,
    RecentHistory,
    FullHistory,
    Stats,
    Pump { zone: ZoneId, on: bool },
    Auto,
    Events,
    Ping,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let token = line
            .split_whitespace()
            .next()
            .ok_or(CommandError::Empty)?
            .to_ascii_uppercase();

        let cmd = match token.as_str() {
            "STATUS" => Self::Status,
            "HISTORIAL_RECIENTE" => Self::RecentHistory,
            "HISTORIAL" => Self::FullHistory,
            "ESTADISTICAS" => Self::Stats,
            "AUTO" => Self::Auto,
            "EVENTOS" => Self::Events,
            "PING" => Self::Ping,
            other => parse_pump(other).ok_or_else(|| CommandError::Unknown(token.clone()))?,
        };
        Ok(cmd)
    }
}

/// `BOMBA<n>_ON` / `BOMBA<n>_OFF`.
fn parse_pump(token: &str) -> Option<Command> {
    let rest = token.strip_prefix("BOMBA")?;
    let (number, action) = rest.split_once('_')?;
    let zone = ZoneId::new(number.parse().ok()?)?;
    let on = match action {
        "ON" => true,
        "OFF" => false,
        _ => return None,
    };
    Some(Command::Pump { zone, on })
}

pub(crate) fn pump_ack(zone: ZoneId, on: bool) -> String {
    let verb = if on { "ACTIVADA" } else { "DESACTIVADA" };
    format!("BOMBA{}_{verb}", zone.number())
}

// ---------------------------------------------------------------------------
// Wire format selection
// ---------------------------------------------------------------------------

/// Field layout of status and history rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum WireFormat {
    /// Moisture, temperature and pump per zone plus plant temperature and
    /// relative humidity (8 fields).
    #[default]
    Extended,
    /// Zone fields only (6 fields), for older consumers.
    Legacy,
}

/// Protocol settings fixed at startup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WireSettings {
    pub(crate) format: WireFormat,
    /// Entries returned by `HISTORIAL_RECIENTE`.
    pub(crate) recent_entries: usize,
}

/// One status or history row, in the shape it goes out on the wire.
enum Frame<'a> {
    Base(&'a SensorState),
    Extended(&'a SensorState),
}

impl<'a> Frame<'a> {
    fn new(sensors: &'a SensorState, format: WireFormat) -> Self {
        match format {
            WireFormat::Extended => Self::Extended(sensors),
            WireFormat::Legacy => Self::Base(sensors),
        }
    }

    fn write_fields(&self, out: &mut String) {
        let s = match self {
            Self::Base(s) | Self::Extended(s) => s,
        };
        let mut fields: Vec<String> = Vec::with_capacity(3 * ZONE_COUNT + 2);
        fields.extend(s.zones.iter().map(|z| format!("{:.1}", z.moisture)));
        fields.extend(s.zones.iter().map(|z| format!("{:.1}", z.temperature)));
        fields.extend(s.zones.iter().map(|z| u8::from(z.pump_active).to_string()));
        if let Self::Extended(s) = self {
            fields.push(format!("{:.1}", s.plant_temperature));
            fields.push(format!("{:.1}", s.relative_humidity));
        }
        out.push_str(&fields.join(","));
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// `DATOS:m1,m2,t1,t2,p1,p2[,plant,rh]`
pub(crate) fn encode_status(sensors: &SensorState, format: WireFormat) -> String {
    let mut out = String::from(STATUS_PREFIX);
    Frame::new(sensors, format).write_fields(&mut out);
    out
}

/// History block; row indices restart at 0 for every dump.
pub(crate) fn encode_history<'a>(
    entries: impl ExactSizeIterator<Item = &'a HistoryEntry>,
    format: WireFormat,
) -> String {
    if entries.len() == 0 {
        return NO_HISTORY.to_string();
    }

    let mut out = String::from(HISTORY_BEGIN);
    for (i, entry) in entries.enumerate() {
        let _ = write!(out, "\n{HISTORY_ROW_PREFIX}{i},");
        Frame::new(&entry.sensors, format).write_fields(&mut out);
    }
    out.push('\n');
    out.push_str(HISTORY_END);
    out
}

/// 14 positional fields: averages, then min/max pairs, then duty cycles.
pub(crate) fn encode_stats(result: &Result<Stats, StatsError>) -> String {
    let stats = match result {
        Ok(s) => s,
        Err(StatsError::EmptyHistory) => return NO_DATA.to_string(),
    };

    let mut fields: Vec<f64> = Vec::with_capacity(7 * ZONE_COUNT);
    fields.extend(stats.zones.iter().map(|z| z.moisture.mean));
    fields.extend(stats.zones.iter().map(|z| z.temperature.mean));
    for z in &stats.zones {
        fields.extend([z.moisture.min, z.moisture.max]);
    }
    for z in &stats.zones {
        fields.extend([z.temperature.min, z.temperature.max]);
    }
    fields.extend(stats.zones.iter().map(|z| z.pump_duty_pct));

    let body: Vec<String> = fields.iter().map(|v| format!("{v:.1}")).collect();
    format!("{STATS_PREFIX}{}", body.join(","))
}

pub(crate) fn encode_events<'a>(events: impl Iterator<Item = &'a SystemEvent>) -> String {
    let mut out = String::from(EVENTS_BEGIN);
    for ev in events {
        let _ = write!(
            out,
            "\n{EVENT_ROW_PREFIX}{},{},{}",
            ev.timestamp(),
            ev.kind.as_str(),
            ev.detail
        );
    }
    out.push('\n');
    out.push_str(EVENTS_END);
    out
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Execute `command` against the shared state and build its response.
pub(crate) fn respond(state: &mut SimState, command: Command, settings: &WireSettings) -> String {
    debug!(?command, "dispatching");
    match command {
        Command::Status => encode_status(&state.sensors, settings.format),
        Command::RecentHistory => encode_history(
            state.history.recent(settings.recent_entries),
            settings.format,
        ),
        Command::FullHistory => encode_history(state.history.iter(), settings.format),
        Command::Stats => encode_stats(&stats::compute(&state.history)),
        Command::Pump { zone, on } => {
            state.set_pump(zone, on);
            pump_ack(zone, on)
        }
        Command::Auto => {
            state.run_policy();
            AUTO_ACK.to_string()
        }
        Command::Events => encode_events(state.events.recent(EVENTS_DUMP_LEN)),
        Command::Ping => PONG.to_string(),
    }
}

/// Parse and execute one request line. Unrecognised input yields the
/// unknown-command token; it never fails.
pub(crate) fn handle_line(state: &mut SimState, line: &str, settings: &WireSettings) -> String {
    match line.parse::<Command>() {
        Ok(command) => respond(state, command, settings),
        Err(e) => {
            debug!(line, "rejected: {e}");
            UNKNOWN_COMMAND.to_string()
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
