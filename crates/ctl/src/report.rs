//! Human-readable rendering of decoded responses.

use std::fmt::Write;

use crate::parse::{HistoryRow, Response, StatsReport, StatusReading};

const DRY_BELOW: f64 = 30.0;
const WET_ABOVE: f64 = 70.0;

/// Rows considered when computing the moisture trend of a history dump.
const TREND_WINDOW: usize = 12;

/// Changes smaller than this are reported as stable.
const TREND_DEADBAND: f64 = 0.5;

/// Ambient temperature above which extra watering is suggested, °C.
const HOT_ABOVE: f64 = 35.0;

/// A moisture drop steeper than this over the last few rows is flagged.
const FAST_DROP: f64 = -2.0;
const FAST_DROP_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoistureClass {
    Dry,
    Optimal,
    Wet,
}

impl MoistureClass {
    pub(crate) fn of(moisture: f64) -> Self {
        if moisture < DRY_BELOW {
            Self::Dry
        } else if moisture <= WET_ABOVE {
            Self::Optimal
        } else {
            Self::Wet
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Dry => "seca",
            Self::Optimal => "óptima",
            Self::Wet => "húmeda",
        }
    }
}

/// Last minus first over the trailing `window` values.
pub(crate) fn trend(values: &[f64], window: usize) -> Option<f64> {
    let tail = &values[values.len().saturating_sub(window)..];
    match (tail.first(), tail.last()) {
        (Some(first), Some(last)) if tail.len() >= 2 => Some(last - first),
        _ => None,
    }
}

fn trend_label(delta: Option<f64>) -> String {
    match delta {
        Some(d) if d >= TREND_DEADBAND => format!("subiendo (+{d:.1})"),
        Some(d) if d <= -TREND_DEADBAND => format!("bajando ({d:.1})"),
        Some(_) => "estable".to_string(),
        None => "sin datos suficientes".to_string(),
    }
}

/// Advice for the current readings: irrigate dry zones, stop wet ones, and
/// water more in the heat.
pub(crate) fn status_advice(s: &StatusReading) -> Vec<String> {
    let mut advice = Vec::new();
    for (i, z) in s.zones.iter().enumerate() {
        match MoistureClass::of(z.moisture) {
            MoistureClass::Dry => advice.push(format!("zona {}: humedad baja, se recomienda riego", i + 1)),
            MoistureClass::Wet => advice.push(format!("zona {}: humedad alta, detener riego", i + 1)),
            MoistureClass::Optimal => {}
        }
    }
    if s.zones.iter().any(|z| z.temperature > HOT_ABOVE) {
        advice.push("temperatura alta, considerar riego adicional".to_string());
    }
    advice
}

/// Zones whose moisture fell faster than `FAST_DROP` over the last rows.
pub(crate) fn history_advice(rows: &[HistoryRow]) -> Vec<String> {
    if rows.len() <= FAST_DROP_WINDOW {
        return Vec::new();
    }
    (0..2)
        .filter_map(|zone| {
            let values: Vec<f64> = rows.iter().map(|r| r.reading.zones[zone].moisture).collect();
            match trend(&values, FAST_DROP_WINDOW) {
                Some(d) if d < FAST_DROP => {
                    Some(format!("zona {}: humedad descendiendo rápidamente", zone + 1))
                }
                _ => None,
            }
        })
        .collect()
}

fn push_advice(out: &mut String, advice: &[String]) {
    if advice.is_empty() {
        return;
    }
    let _ = writeln!(out, "recomendaciones:");
    for line in advice {
        let _ = writeln!(out, "  - {line}");
    }
}

fn on_off(active: bool) -> &'static str {
    if active {
        "ON"
    } else {
        "OFF"
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

pub(crate) fn render(response: &Response) -> String {
    match response {
        Response::Status(s) => render_status(s),
        Response::History(rows) => render_history(rows),
        Response::Stats(s) => render_stats(s),
        Response::Events(rows) => rows.join("\n"),
        Response::Reply(text) => text.clone(),
    }
}

pub(crate) fn render_status(s: &StatusReading) -> String {
    let mut out = String::new();
    for (i, z) in s.zones.iter().enumerate() {
        let _ = writeln!(
            out,
            "zona {}: humedad {:.1}% ({}), temperatura {:.1}°C, bomba {}",
            i + 1,
            z.moisture,
            MoistureClass::of(z.moisture).label(),
            z.temperature,
            on_off(z.pump_active)
        );
    }
    if let Some(t) = s.plant_temperature {
        let _ = writeln!(out, "temperatura planta: {t:.1}°C");
    }
    if let Some(rh) = s.relative_humidity {
        let _ = writeln!(out, "humedad relativa: {rh:.1}%");
    }
    push_advice(&mut out, &status_advice(s));
    out.trim_end().to_string()
}

pub(crate) fn render_history(rows: &[HistoryRow]) -> String {
    if rows.is_empty() {
        return "historial vacío".to_string();
    }

    let mut out = String::new();
    for row in rows {
        let [z1, z2] = &row.reading.zones;
        let _ = writeln!(
            out,
            "#{:<3} h1 {:>5.1}%  h2 {:>5.1}%  t1 {:>4.1}  t2 {:>4.1}  b1 {:<3} b2 {}",
            row.index,
            z1.moisture,
            z2.moisture,
            z1.temperature,
            z2.temperature,
            on_off(z1.pump_active),
            on_off(z2.pump_active)
        );
    }
    for zone in 0..2 {
        let values: Vec<f64> = rows
            .iter()
            .map(|r| r.reading.zones[zone].moisture)
            .collect();
        let _ = writeln!(
            out,
            "tendencia zona {}: {}",
            zone + 1,
            trend_label(trend(&values, TREND_WINDOW))
        );
    }
    push_advice(&mut out, &history_advice(rows));
    out.trim_end().to_string()
}

pub(crate) fn render_stats(s: &StatsReport) -> String {
    let mut out = String::new();
    for (i, z) in s.zones.iter().enumerate() {
        let _ = writeln!(
            out,
            "zona {}: humedad media {:.1}% [{:.1}-{:.1}], temperatura media {:.1}°C [{:.1}-{:.1}], bomba {:.1}% del tiempo",
            i + 1,
            z.moisture_avg,
            z.moisture_min,
            z.moisture_max,
            z.temperature_avg,
            z.temperature_min,
            z.temperature_max,
            z.pump_duty_pct
        );
    }
    out.trim_end().to_string()
}

// ===========================================================================
// Tests
// ===========================================================================
