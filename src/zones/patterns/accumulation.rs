// src/zones/patterns/accumulation.rs
// Sideways consolidation ("accumulation") boxes and their breakout validation.

use super::{DetectionInput, Detector, DetectorResult, Diagnostics};
use crate::errors::{ConfigError, DetectionError};
use crate::session::{is_weekend_halt, session_for, Session};
use crate::types::{Candle, DetectorKind, Zone, ZoneKind, ZoneStatus};
use crate::zones::indicators::{adx, choppiness, mean_body, mean_close, ols_slope, MIN_ADX_PERIOD};
use crate::zones::window_scanner::{Window, WindowScanner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Choppiness at or above this is a fully formed range.
pub const CHOP_FOUND: f64 = 0.44;
/// Choppiness at or above this (and below `CHOP_FOUND`) is a forming range.
pub const CHOP_POTENTIAL: f64 = 0.36;
/// Windows under this ADX rank ahead of every other passing window.
pub const LOW_ADX_TIER: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulationParams {
    pub lookback: usize,
    pub min_candles: usize,
    pub adx_threshold: f64,
    pub adx_period: usize,
    /// Per-instrument flatness scale; the slope bar is
    /// `threshold_pct * slope_scale / window_size`.
    pub threshold_pct: f64,
    pub slope_scale: f64,
    pub asian_range_pct: Option<f64>,
    pub london_range_pct: Option<f64>,
    pub new_york_range_pct: Option<f64>,
    /// Used when the window's session has no limit of its own.
    pub max_range_pct: Option<f64>,
}

impl Default for AccumulationParams {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_candles: 20,
            adx_threshold: 25.0,
            adx_period: 14,
            threshold_pct: 0.003,
            slope_scale: 0.15,
            asian_range_pct: None,
            london_range_pct: None,
            new_york_range_pct: None,
            max_range_pct: None,
        }
    }
}

impl AccumulationParams {
    pub fn range_limit(&self, session: Session) -> Option<f64> {
        let own = match session {
            Session::Asian => self.asian_range_pct,
            Session::London => self.london_range_pct,
            Session::NewYork => self.new_york_range_pct,
        };
        own.or(self.max_range_pct)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_candles < 3 {
            return Err(ConfigError::Invalid(format!(
                "accumulation min_candles must be at least 3, got {}",
                self.min_candles
            )));
        }
        if self.min_candles > self.lookback {
            return Err(ConfigError::Invalid(format!(
                "accumulation min_candles ({}) > lookback ({})",
                self.min_candles, self.lookback
            )));
        }
        if self.adx_period < MIN_ADX_PERIOD {
            return Err(ConfigError::Invalid(format!(
                "accumulation adx_period must be at least {}, got {}",
                MIN_ADX_PERIOD, self.adx_period
            )));
        }
        check_range("adx_threshold", self.adx_threshold, 0.0, 100.0)?;
        check_positive("threshold_pct", self.threshold_pct)?;
        check_positive("slope_scale", self.slope_scale)?;
        for (field, value) in [
            ("asian_range_pct", self.asian_range_pct),
            ("london_range_pct", self.london_range_pct),
            ("new_york_range_pct", self.new_york_range_pct),
            ("max_range_pct", self.max_range_pct),
        ] {
            if let Some(v) = value {
                check_range(field, v, 0.0, 1.0)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
        });
    }
    Ok(())
}

// ==================== DIAGNOSTICS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChopTier {
    Found,
    Potential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    OutOfSession,
    Range,
    Slope,
    Adx,
    Choppiness,
}

/// Every predicate outcome for one scanned window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowEvaluation {
    pub start_index: usize,
    pub end_index: usize,
    pub size: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub session: Option<Session>,
    pub top: f64,
    pub bottom: f64,
    pub range_pct: f64,
    pub range_limit: Option<f64>,
    pub range_ok: bool,
    pub slope: f64,
    pub slope_limit: f64,
    pub slope_ok: bool,
    pub adx: Option<f64>,
    pub adx_ok: bool,
    pub choppiness: Option<f64>,
    pub tier: Option<ChopTier>,
    pub mean_body: f64,
    pub rejection: Option<Rejection>,
}

impl WindowEvaluation {
    pub fn passes(&self) -> bool {
        self.rejection.is_none()
    }

    fn low_adx(&self) -> bool {
        matches!(self.adx, Some(v) if v < LOW_ADX_TIER)
    }

    fn zone(&self, status: ZoneStatus, is_primary: bool) -> Zone {
        Zone {
            detector: DetectorKind::Accumulation,
            kind: ZoneKind::Range,
            start: self.start,
            end: self.end,
            top: self.top,
            bottom: self.bottom,
            status,
            is_primary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakoutCheck {
    pub candle: Candle,
    pub body: f64,
    pub mean_window_body: f64,
    pub direction: Option<BreakoutDirection>,
    pub impulsive: bool,
    pub accepted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccumulationReport {
    pub weekend: bool,
    pub windows: Vec<WindowEvaluation>,
    pub primary: Option<usize>,
    pub secondary: Option<usize>,
    pub breakout: Option<BreakoutCheck>,
}

// ==================== PREDICATES ====================

/// Body-based box `(bottom, top)` over the candles.
pub fn body_box(candles: &[Candle]) -> (f64, f64) {
    let top = candles
        .iter()
        .map(Candle::body_high)
        .fold(f64::NEG_INFINITY, f64::max);
    let bottom = candles
        .iter()
        .map(Candle::body_low)
        .fold(f64::INFINITY, f64::min);
    (bottom, top)
}

/// Box height relative to the mean close of the window.
pub fn range_pct(candles: &[Candle]) -> f64 {
    let price = mean_close(candles);
    if candles.is_empty() || price <= 0.0 {
        return f64::INFINITY;
    }
    let (bottom, top) = body_box(candles);
    (top - bottom) / price
}

/// Absolute OLS slope of closes, as a fraction of the mean close.
pub fn normalized_slope(candles: &[Candle]) -> f64 {
    let price = mean_close(candles);
    if price <= 0.0 {
        return f64::INFINITY;
    }
    (ols_slope(candles) / price).abs()
}

fn chop_tier(chop: Option<f64>) -> Option<ChopTier> {
    match chop {
        Some(c) if c >= CHOP_FOUND => Some(ChopTier::Found),
        Some(c) if c >= CHOP_POTENTIAL => Some(ChopTier::Potential),
        Some(_) => None,
        // No moves at all: cannot reverse, so never better than forming.
        None => Some(ChopTier::Potential),
    }
}

/// Best candidate first: found tier before potential, ADX < 10 before the
/// rest, then flattest slope, then the longer window.
pub fn compare_candidates(a: &WindowEvaluation, b: &WindowEvaluation) -> Ordering {
    let tier_rank = |w: &WindowEvaluation| match w.tier {
        Some(ChopTier::Found) => 0,
        Some(ChopTier::Potential) => 1,
        None => 2,
    };
    tier_rank(a)
        .cmp(&tier_rank(b))
        .then_with(|| b.low_adx().cmp(&a.low_adx()))
        .then_with(|| a.slope.total_cmp(&b.slope))
        .then_with(|| b.size.cmp(&a.size))
}

// ==================== DETECTOR ====================

#[derive(Debug, Clone, Default)]
pub struct AccumulationDetector {
    pub params: AccumulationParams,
}

impl AccumulationDetector {
    pub fn new(params: AccumulationParams) -> Self {
        Self { params }
    }

    fn evaluate_window(&self, candles: &[Candle], window: Window) -> WindowEvaluation {
        let p = &self.params;
        let slice = window.slice(candles);
        let size = window.size();
        let last = &slice[slice.len() - 1];
        let session = session_for(last.timestamp);

        let (bottom, top) = body_box(slice);
        let range = range_pct(slice);
        let range_limit = session.and_then(|s| p.range_limit(s));
        let range_ok = match (session, range_limit) {
            (None, _) => false,
            (Some(_), Some(limit)) => range <= limit,
            (Some(_), None) => true,
        };

        let slope = normalized_slope(slice);
        let slope_limit = p.threshold_pct * p.slope_scale / size as f64;
        let slope_ok = slope <= slope_limit;

        let adx_value = adx(slice, p.adx_period);
        let adx_ok = adx_value.map_or(true, |v| v < p.adx_threshold);

        let chop = choppiness(slice);
        let tier = chop_tier(chop);

        let rejection = if session.is_none() {
            Some(Rejection::OutOfSession)
        } else if !range_ok {
            Some(Rejection::Range)
        } else if !slope_ok {
            Some(Rejection::Slope)
        } else if !adx_ok {
            Some(Rejection::Adx)
        } else if tier.is_none() {
            Some(Rejection::Choppiness)
        } else {
            None
        };

        WindowEvaluation {
            start_index: window.start_index,
            end_index: window.end_index,
            size,
            start: slice[0].timestamp,
            end: last.timestamp,
            session,
            top,
            bottom,
            range_pct: range,
            range_limit,
            range_ok,
            slope,
            slope_limit,
            slope_ok,
            adx: adx_value,
            adx_ok,
            choppiness: chop,
            tier,
            mean_body: mean_body(slice),
            rejection,
        }
    }

    fn check_breakout(candle: &Candle, window: &WindowEvaluation) -> BreakoutCheck {
        let direction = if candle.close > window.top {
            Some(BreakoutDirection::Up)
        } else if candle.close < window.bottom {
            Some(BreakoutDirection::Down)
        } else {
            None
        };
        let body = candle.body();
        let impulsive = body > window.mean_body;
        BreakoutCheck {
            candle: *candle,
            body,
            mean_window_body: window.mean_body,
            direction,
            impulsive,
            accepted: direction.is_some() && impulsive,
        }
    }
}

impl Detector for AccumulationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Accumulation
    }

    /// Smallest window plus the breakout candle.
    fn min_candles(&self) -> usize {
        self.params.min_candles + 1
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        self.params.validate()
    }

    fn evaluate(&self, input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError> {
        if is_weekend_halt(input.now) {
            debug!("[Accumulation] {} weekend halt, detection suspended", input.instrument);
            return Ok(DetectorResult {
                detector: DetectorKind::Accumulation,
                status: ZoneStatus::Weekend,
                zones: Vec::new(),
                diagnostics: Diagnostics::Accumulation(AccumulationReport {
                    weekend: true,
                    ..Default::default()
                }),
            });
        }

        let closed = input.series.closed();
        if closed.len() < self.min_candles() {
            return Err(DetectionError::InsufficientData {
                need: self.min_candles(),
                got: closed.len(),
            });
        }

        // Newest closed candle is the breakout candidate; windows end just before it.
        let breakout_candle = &closed[closed.len() - 1];
        let history = &closed[..closed.len() - 1];

        let scanner = WindowScanner::new(self.params.min_candles, self.params.lookback);
        let windows: Vec<WindowEvaluation> = scanner
            .scan(history.len())
            .map(|w| self.evaluate_window(history, w))
            .collect();

        let mut ranked: Vec<usize> = (0..windows.len()).filter(|&i| windows[i].passes()).collect();
        ranked.sort_by(|&a, &b| compare_candidates(&windows[a], &windows[b]));

        let mut report = AccumulationReport {
            primary: ranked.first().copied(),
            secondary: ranked.get(1).copied(),
            ..Default::default()
        };

        let Some(primary_idx) = report.primary else {
            debug!(
                "[Accumulation] {} no passing window among {} scanned",
                input.instrument,
                windows.len()
            );
            report.windows = windows;
            return Ok(DetectorResult {
                detector: DetectorKind::Accumulation,
                status: ZoneStatus::Looking,
                zones: Vec::new(),
                diagnostics: Diagnostics::Accumulation(report),
            });
        };

        let primary = &windows[primary_idx];
        let status = match primary.tier {
            Some(ChopTier::Found) => {
                let check = Self::check_breakout(breakout_candle, primary);
                let status = if check.accepted {
                    ZoneStatus::Confirmed
                } else {
                    ZoneStatus::Active
                };
                if check.direction.is_some() && !check.impulsive {
                    debug!(
                        "[Accumulation] {} breakout rejected: body {:.6} <= window mean {:.6}",
                        input.instrument, check.body, check.mean_window_body
                    );
                }
                report.breakout = Some(check);
                status
            }
            _ => ZoneStatus::Potential,
        };

        let mut zones = vec![primary.zone(status, true)];
        if let Some(secondary_idx) = report.secondary {
            let secondary = &windows[secondary_idx];
            let secondary_status = match secondary.tier {
                Some(ChopTier::Found) => ZoneStatus::Active,
                _ => ZoneStatus::Potential,
            };
            zones.push(secondary.zone(secondary_status, false));
        }

        debug!(
            "[Accumulation] {} status {} box [{:.5}, {:.5}] size {} adx {:?} slope {:.8}",
            input.instrument,
            status,
            primary.bottom,
            primary.top,
            primary.size,
            primary.adx,
            primary.slope
        );

        report.windows = windows;
        Ok(DetectorResult {
            detector: DetectorKind::Accumulation,
            status,
            zones,
            diagnostics: Diagnostics::Accumulation(report),
        })
    }
}
