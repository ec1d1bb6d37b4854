// src/zones/patterns/supply_demand.rs
// Indecision + impulse candle pairs, filtered by daily/weekly bias.

use super::accumulation::{check_positive, check_range};
use super::{DetectionInput, Detector, DetectorResult, Diagnostics};
use crate::errors::{ConfigError, DetectionError};
use crate::session::{session_for, Session};
use crate::types::{BiasCandles, Candle, DetectorKind, Zone, ZoneKind, ZoneStatus};
use crate::zones::indicators::mean_body;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest zone age accepted from config, in days.
pub const MAX_AGE_DAYS_LIMIT: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplyDemandParams {
    /// Impulse body must exceed this multiple of the trailing mean body.
    pub impulse_multiplier: f64,
    /// Minimum wick fraction of an indecision candle.
    pub wick_ratio: f64,
    /// Maximum wick fraction of an impulse candle.
    pub impulse_max_wick: f64,
    /// Candles preceding the impulse used for the mean body.
    pub reference_window: usize,
    pub max_zones: usize,
    pub max_age_days: i64,
    pub valid_sessions: Vec<Session>,
}

impl Default for SupplyDemandParams {
    fn default() -> Self {
        Self {
            impulse_multiplier: 1.8,
            wick_ratio: 0.6,
            impulse_max_wick: 0.30,
            reference_window: 20,
            max_zones: 5,
            max_age_days: 3,
            valid_sessions: vec![Session::London, Session::NewYork],
        }
    }
}

impl SupplyDemandParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("impulse_multiplier", self.impulse_multiplier)?;
        check_range("wick_ratio", self.wick_ratio, 0.0, 1.0)?;
        check_range("impulse_max_wick", self.impulse_max_wick, 0.0, 1.0)?;
        if self.reference_window == 0 {
            return Err(ConfigError::Invalid(
                "supply_demand reference_window must be at least 1".to_string(),
            ));
        }
        if self.max_zones == 0 {
            return Err(ConfigError::Invalid(
                "supply_demand max_zones must be at least 1".to_string(),
            ));
        }
        if self.max_age_days <= 0 || self.max_age_days > MAX_AGE_DAYS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "supply_demand max_age_days must be in 1..={}, got {}",
                MAX_AGE_DAYS_LIMIT, self.max_age_days
            )));
        }
        if self.valid_sessions.is_empty() {
            return Err(ConfigError::Invalid(
                "supply_demand valid_sessions must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    fn of(candle: &Candle) -> Self {
        if candle.close > candle.open {
            Direction::Bullish
        } else {
            Direction::Bearish
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Misaligned,
    Unavailable,
}

impl Bias {
    pub fn from_candles(bias: Option<&BiasCandles>) -> Self {
        let Some(bias) = bias else {
            return Bias::Unavailable;
        };
        match (Direction::of(&bias.daily), Direction::of(&bias.weekly)) {
            (Direction::Bullish, Direction::Bullish) => Bias::Bullish,
            (Direction::Bearish, Direction::Bearish) => Bias::Bearish,
            _ => Bias::Misaligned,
        }
    }

    fn wanted(&self) -> Option<ZoneKind> {
        match self {
            Bias::Bullish => Some(ZoneKind::Demand),
            Bias::Bearish => Some(ZoneKind::Supply),
            Bias::Misaligned | Bias::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplyDemandReport {
    pub bias: Bias,
    pub daily: Option<Direction>,
    pub weekly: Option<Direction>,
    pub pairs_scanned: usize,
    pub patterns_found: usize,
    pub rejected_direction: usize,
    pub rejected_session: usize,
    pub rejected_touched: usize,
}

impl SupplyDemandReport {
    fn new(bias: Bias, candles: Option<&BiasCandles>) -> Self {
        Self {
            bias,
            daily: candles.map(|b| Direction::of(&b.daily)),
            weekly: candles.map(|b| Direction::of(&b.weekly)),
            pairs_scanned: 0,
            patterns_found: 0,
            rejected_direction: 0,
            rejected_session: 0,
            rejected_touched: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SupplyDemandDetector {
    pub params: SupplyDemandParams,
}

impl SupplyDemandDetector {
    pub fn new(params: SupplyDemandParams) -> Self {
        Self { params }
    }

    pub fn is_indecision(&self, candle: &Candle) -> bool {
        candle
            .wick_ratio()
            .map_or(false, |ratio| ratio >= self.params.wick_ratio)
    }

    pub fn is_impulse(&self, candle: &Candle, reference_body: f64) -> bool {
        let wicks_ok = candle
            .wick_ratio()
            .map_or(false, |ratio| ratio <= self.params.impulse_max_wick);
        wicks_ok && candle.body() > self.params.impulse_multiplier * reference_body
    }
}

impl Detector for SupplyDemandDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SupplyDemand
    }

    /// A full reference window plus one indecision/impulse pair.
    fn min_candles(&self) -> usize {
        self.params.reference_window + 2
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        self.params.validate()
    }

    fn evaluate(&self, input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError> {
        let p = &self.params;
        let bias = Bias::from_candles(input.bias);
        let mut report = SupplyDemandReport::new(bias, input.bias);

        let Some(wanted) = bias.wanted() else {
            debug!("[SupplyDemand] {} bias {:?}, no zones", input.instrument, bias);
            return Ok(DetectorResult {
                detector: DetectorKind::SupplyDemand,
                status: ZoneStatus::Looking,
                zones: Vec::new(),
                diagnostics: Diagnostics::SupplyDemand(report),
            });
        };

        let closed = input.series.closed();
        if closed.len() < self.min_candles() {
            return Err(DetectionError::InsufficientData {
                need: self.min_candles(),
                got: closed.len(),
            });
        }
        let all = input.series.candles();
        let cutoff = input.now - Duration::days(p.max_age_days);
        let mut zones: Vec<Zone> = Vec::new();

        // Newest pair first; indecision at i, impulse at i + 1.
        for i in (0..closed.len() - 1).rev() {
            let indecision = &closed[i];
            let impulse = &closed[i + 1];

            if indecision.timestamp < cutoff || i + 1 < p.reference_window {
                break;
            }
            report.pairs_scanned += 1;

            if !self.is_indecision(indecision) {
                continue;
            }
            let reference_body = mean_body(&closed[i + 1 - p.reference_window..i + 1]);
            if !self.is_impulse(impulse, reference_body) {
                continue;
            }
            report.patterns_found += 1;

            let kind = if impulse.is_bullish() {
                ZoneKind::Demand
            } else {
                ZoneKind::Supply
            };
            if kind != wanted {
                report.rejected_direction += 1;
                continue;
            }

            let in_session = session_for(indecision.timestamp)
                .map_or(false, |s| p.valid_sessions.contains(&s));
            if !in_session {
                report.rejected_session += 1;
                continue;
            }

            let (bottom, top) = (indecision.low, indecision.high);
            if all[i + 2..].iter().any(|c| c.overlaps(bottom, top)) {
                report.rejected_touched += 1;
                continue;
            }

            zones.push(Zone {
                detector: DetectorKind::SupplyDemand,
                kind,
                start: indecision.timestamp,
                end: impulse.timestamp,
                top,
                bottom,
                status: ZoneStatus::Confirmed,
                is_primary: zones.is_empty(),
            });
            if zones.len() >= p.max_zones {
                break;
            }
        }

        debug!(
            "[SupplyDemand] {} bias {:?}: {} zones from {} pairs",
            input.instrument,
            bias,
            zones.len(),
            report.pairs_scanned
        );

        let status = if zones.is_empty() {
            ZoneStatus::Looking
        } else {
            ZoneStatus::Confirmed
        };
        Ok(DetectorResult {
            detector: DetectorKind::SupplyDemand,
            status,
            zones,
            diagnostics: Diagnostics::SupplyDemand(report),
        })
    }
}
