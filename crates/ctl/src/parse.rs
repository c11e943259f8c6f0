//! Typed decoding of the simulator's text responses.
//!
//! Status and history rows come in two widths: the legacy six-field form and
//! the extended eight-field form with plant temperature and relative humidity.
//! Both decode into the same records; the extra readings are `None` when the
//! server did not send them.

use serde::Serialize;
use tracing::debug;

pub(crate) const STATUS_PREFIX: &str = "DATOS:";
pub(crate) const STATS_PREFIX: &str = "STATS:";
const HISTORY_ROW_PREFIXES: [&str; 2] = ["HR:", "H:"];
const EVENT_ROW_PREFIX: &str = "EV:";

const HISTORY_BEGIN: &str = "HISTORIAL_RECIENTE_INICIO";
const EVENTS_BEGIN: &str = "EVENTOS_INICIO";

/// Moisture, temperature and pump flag per zone.
const BASE_FIELDS: usize = 6;
const STATS_FIELDS: usize = 14;

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum ParseError {
    #[error("missing {0:?} prefix")]
    MissingPrefix(&'static str),
    #[error("expected at least {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("field {index} is not a number: {value:?}")]
    BadNumber { index: usize, value: String },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ZoneReading {
    pub(crate) moisture: f64,
    pub(crate) temperature: f64,
    pub(crate) pump_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct StatusReading {
    pub(crate) zones: [ZoneReading; 2],
    pub(crate) plant_temperature: Option<f64>,
    pub(crate) relative_humidity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct HistoryRow {
    pub(crate) index: u32,
    #[serde(flatten)]
    pub(crate) reading: StatusReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ZoneStatsReport {
    pub(crate) moisture_avg: f64,
    pub(crate) moisture_min: f64,
    pub(crate) moisture_max: f64,
    pub(crate) temperature_avg: f64,
    pub(crate) temperature_min: f64,
    pub(crate) temperature_max: f64,
    pub(crate) pump_duty_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct StatsReport {
    pub(crate) zones: [ZoneStatsReport; 2],
}

/// Everything a single command can answer with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub(crate) enum Response {
    Status(StatusReading),
    History(Vec<HistoryRow>),
    Stats(StatsReport),
    Events(Vec<String>),
    /// Acknowledgements and sentinels, passed through verbatim.
    Reply(String),
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

struct Fields<'a> {
    raw: Vec<&'a str>,
    /// Position of `raw[0]` in the original line, for error messages.
    offset: usize,
}

impl<'a> Fields<'a> {
    fn split(body: &'a str, min: usize) -> Result<Self, ParseError> {
        let raw: Vec<&str> = body.trim().split(',').map(str::trim).collect();
        if raw.len() < min {
            return Err(ParseError::FieldCount {
                expected: min,
                got: raw.len(),
            });
        }
        Ok(Self { raw, offset: 0 })
    }

    fn len(&self) -> usize {
        self.raw.len()
    }

    fn number(&self, i: usize) -> Result<f64, ParseError> {
        self.raw[i]
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.bad(i))
    }

    fn flag(&self, i: usize) -> Result<bool, ParseError> {
        self.raw[i]
            .parse::<u8>()
            .map(|v| v != 0)
            .map_err(|_| self.bad(i))
    }

    fn optional(&self, i: usize) -> Result<Option<f64>, ParseError> {
        if i < self.len() {
            self.number(i).map(Some)
        } else {
            Ok(None)
        }
    }

    fn bad(&self, i: usize) -> ParseError {
        ParseError::BadNumber {
            index: self.offset + i,
            value: self.raw[i].to_string(),
        }
    }

    /// Drop the first field (a row index) and keep error positions honest.
    fn skip_first(mut self) -> Self {
        self.raw.remove(0);
        self.offset += 1;
        self
    }
}

fn reading_from(f: &Fields<'_>) -> Result<StatusReading, ParseError> {
    if f.len() < BASE_FIELDS {
        return Err(ParseError::FieldCount {
            expected: BASE_FIELDS + f.offset,
            got: f.len() + f.offset,
        });
    }
    let zone = |z: usize| -> Result<ZoneReading, ParseError> {
        Ok(ZoneReading {
            moisture: f.number(z)?,
            temperature: f.number(2 + z)?,
            pump_active: f.flag(4 + z)?,
        })
    };
    Ok(StatusReading {
        zones: [zone(0)?, zone(1)?],
        plant_temperature: f.optional(6)?,
        relative_humidity: f.optional(7)?,
    })
}

// ---------------------------------------------------------------------------
// Line parsers
// ---------------------------------------------------------------------------

/// `DATOS:m1,m2,t1,t2,p1,p2[,plant,rh]`
pub(crate) fn parse_status(line: &str) -> Result<StatusReading, ParseError> {
    let body = line
        .trim()
        .strip_prefix(STATUS_PREFIX)
        .ok_or(ParseError::MissingPrefix(STATUS_PREFIX))?;
    reading_from(&Fields::split(body, BASE_FIELDS)?)
}

/// `HR:i,m1,m2,t1,t2,p1,p2[,plant,rh]`
pub(crate) fn parse_history_row(line: &str) -> Result<HistoryRow, ParseError> {
    let line = line.trim();
    let body = HISTORY_ROW_PREFIXES
        .iter()
        .find_map(|p| line.strip_prefix(p))
        .ok_or(ParseError::MissingPrefix(HISTORY_ROW_PREFIXES[0]))?;

    let fields = Fields::split(body, BASE_FIELDS + 1)?;
    let index = fields.raw[0]
        .parse::<u32>()
        .map_err(|_| fields.bad(0))?;
    let reading = reading_from(&fields.skip_first())?;
    Ok(HistoryRow { index, reading })
}

/// Every well-formed row of a history block. Framing lines and malformed rows
/// are skipped.
pub(crate) fn parse_history<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<HistoryRow> {
    lines
        .into_iter()
        .filter(|l| HISTORY_ROW_PREFIXES.iter().any(|p| l.trim().starts_with(p)))
        .filter_map(|l| match parse_history_row(l) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(line = l, "skipping history row: {e}");
                None
            }
        })
        .collect()
}

/// `STATS:` followed by the 14 positional aggregates.
pub(crate) fn parse_stats(line: &str) -> Result<StatsReport, ParseError> {
    let body = line
        .trim()
        .strip_prefix(STATS_PREFIX)
        .ok_or(ParseError::MissingPrefix(STATS_PREFIX))?;
    let f = Fields::split(body, STATS_FIELDS)?;

    let zone = |z: usize| -> Result<ZoneStatsReport, ParseError> {
        Ok(ZoneStatsReport {
            moisture_avg: f.number(z)?,
            temperature_avg: f.number(2 + z)?,
            moisture_min: f.number(4 + 2 * z)?,
            moisture_max: f.number(5 + 2 * z)?,
            temperature_min: f.number(8 + 2 * z)?,
            temperature_max: f.number(9 + 2 * z)?,
            pump_duty_pct: f.number(12 + z)?,
        })
    };
    Ok(StatsReport {
        zones: [zone(0)?, zone(1)?],
    })
}

/// Classify a full response (first line plus any block body).
pub(crate) fn parse_response(lines: &[String]) -> Result<Response, ParseError> {
    let Some(first) = lines.first().map(|l| l.trim()) else {
        return Ok(Response::Reply(String::new()));
    };

    if first.starts_with(STATUS_PREFIX) {
        parse_status(first).map(Response::Status)
    } else if first.starts_with(STATS_PREFIX) {
        parse_stats(first).map(Response::Stats)
    } else if first == HISTORY_BEGIN {
        Ok(Response::History(parse_history(
            lines.iter().map(String::as_str),
        )))
    } else if first == EVENTS_BEGIN {
        Ok(Response::Events(
            lines
                .iter()
                .filter_map(|l| l.trim().strip_prefix(EVENT_ROW_PREFIX))
                .map(str::to_string)
                .collect(),
        ))
    } else {
        Ok(Response::Reply(first.to_string()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
