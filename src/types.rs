// src/types.rs
// Shared candle and zone model used by every detector and the lifecycle manager.

use crate::errors::{ConfigError, DataError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ==================== CANDLES ====================

/// One OHLCV bar. `timestamp` is the bar's open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    #[inline]
    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    #[inline]
    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body as a fraction of the full range. `None` for a zero-range bar.
    pub fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Combined wick length as a fraction of the full range.
    pub fn wick_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| (range - self.body()) / range)
    }

    pub fn overlaps(&self, bottom: f64, top: f64) -> bool {
        self.low <= top && self.high >= bottom
    }

    fn check(&self, index: usize) -> Result<(), DataError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(DataError::Malformed {
                index,
                reason: "non-finite price",
            });
        }
        if self.high < self.low {
            return Err(DataError::Malformed {
                index,
                reason: "high < low",
            });
        }
        if self.high < self.body_high() || self.low > self.body_low() {
            return Err(DataError::Malformed {
                index,
                reason: "open/close outside high/low",
            });
        }
        Ok(())
    }
}

// ==================== TIMEFRAMES ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "2m")]
    M2,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
}

impl Timeframe {
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M2 => 2,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn is_intraday(&self) -> bool {
        self.minutes() < Timeframe::D1.minutes()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M2 => "2m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1wk",
        }
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "2m" => Ok(Timeframe::M2),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            "1wk" | "1w" => Ok(Timeframe::W1),
            other => Err(ConfigError::UnknownTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far back a provider should reach when building a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookbackPeriod {
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "5d")]
    Day5,
    #[serde(rename = "30d")]
    Day30,
    #[serde(rename = "3mo")]
    Month3,
    #[serde(rename = "6mo")]
    Month6,
    #[serde(rename = "1y")]
    Year1,
}

impl LookbackPeriod {
    pub fn days(&self) -> i64 {
        match self {
            LookbackPeriod::Day1 => 1,
            LookbackPeriod::Day5 => 5,
            LookbackPeriod::Day30 => 30,
            LookbackPeriod::Month3 => 90,
            LookbackPeriod::Month6 => 180,
            LookbackPeriod::Year1 => 365,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.days())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LookbackPeriod::Day1 => "1d",
            LookbackPeriod::Day5 => "5d",
            LookbackPeriod::Day30 => "30d",
            LookbackPeriod::Month3 => "3mo",
            LookbackPeriod::Month6 => "6mo",
            LookbackPeriod::Year1 => "1y",
        }
    }
}

impl FromStr for LookbackPeriod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" => Ok(LookbackPeriod::Day1),
            "5d" => Ok(LookbackPeriod::Day5),
            "30d" | "1mo" => Ok(LookbackPeriod::Day30),
            "3mo" => Ok(LookbackPeriod::Month3),
            "6mo" => Ok(LookbackPeriod::Month6),
            "1y" => Ok(LookbackPeriod::Year1),
            other => Err(ConfigError::UnknownPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for LookbackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== SERIES ====================

/// Time-ordered candles of a single timeframe. The final candle may still be
/// forming; detectors read `closed()` unless they explicitly need it.
#[derive(Debug, Clone, Serialize)]
pub struct CandleSeries {
    timeframe: Timeframe,
    candles: Vec<Candle>,
    last_is_forming: bool,
}

impl CandleSeries {
    /// Validates OHLC shape, strict time ordering and, for intraday
    /// timeframes, that consecutive candles sit a whole number of bars apart.
    /// Daily and weekly spacing follows exchange calendars and is not checked.
    pub fn new(
        timeframe: Timeframe,
        candles: Vec<Candle>,
        last_is_forming: bool,
    ) -> Result<Self, DataError> {
        if candles.is_empty() {
            return Err(DataError::Empty(timeframe.to_string()));
        }
        for (index, candle) in candles.iter().enumerate() {
            candle.check(index)?;
            if index == 0 {
                continue;
            }
            let gap = candle.timestamp - candles[index - 1].timestamp;
            if gap <= Duration::zero() {
                return Err(DataError::Unordered { index });
            }
            let bar = timeframe.duration().num_seconds();
            if timeframe.is_intraday() && gap.num_seconds() % bar != 0 {
                return Err(DataError::Malformed {
                    index,
                    reason: "candle spacing is not a multiple of the timeframe",
                });
            }
        }
        Ok(Self {
            timeframe,
            candles,
            last_is_forming,
        })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last_is_forming(&self) -> bool {
        self.last_is_forming
    }

    /// Fully closed candles, oldest first.
    pub fn closed(&self) -> &[Candle] {
        if self.last_is_forming {
            &self.candles[..self.candles.len() - 1]
        } else {
            &self.candles
        }
    }

    /// Drops candles opened before `cutoff`, keeping at least the last one.
    pub fn since(&self, cutoff: DateTime<Utc>) -> CandleSeries {
        let first = self
            .candles
            .iter()
            .position(|c| c.timestamp >= cutoff)
            .unwrap_or(self.candles.len().saturating_sub(1));
        CandleSeries {
            timeframe: self.timeframe,
            candles: self.candles[first..].to_vec(),
            last_is_forming: self.last_is_forming,
        }
    }
}

/// Previous completed daily and weekly candles used for directional bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasCandles {
    pub daily: Candle,
    pub weekly: Candle,
}

// ==================== ZONES ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Accumulation,
    SupplyDemand,
    Fvg,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Accumulation => "accumulation",
            DetectorKind::SupplyDemand => "supply_demand",
            DetectorKind::Fvg => "fvg",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Range,
    Demand,
    Supply,
    BullishGap,
    BearishGap,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Range => "range",
            ZoneKind::Demand => "demand",
            ZoneKind::Supply => "supply",
            ZoneKind::BullishGap => "bullish_gap",
            ZoneKind::BearishGap => "bearish_gap",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Looking < Potential < Active < Confirmed`. `Weekend` overrides display
/// and sits outside that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Looking,
    Potential,
    Active,
    Confirmed,
    Weekend,
}

impl ZoneStatus {
    fn rank(self) -> u8 {
        match self {
            ZoneStatus::Looking | ZoneStatus::Weekend => 0,
            ZoneStatus::Potential => 1,
            ZoneStatus::Active => 2,
            ZoneStatus::Confirmed => 3,
        }
    }

    /// Forward-only merge of a freshly reported status into a tracked one.
    pub fn advance(self, reported: ZoneStatus) -> ZoneStatus {
        match (self, reported) {
            (current, ZoneStatus::Weekend) => current,
            (ZoneStatus::Weekend, next) => next,
            (current, next) if next.rank() > current.rank() => next,
            (current, _) => current,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Looking => "looking",
            ZoneStatus::Potential => "potential",
            ZoneStatus::Active => "active",
            ZoneStatus::Confirmed => "confirmed",
            ZoneStatus::Weekend => "weekend",
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub detector: DetectorKind,
    pub kind: ZoneKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub top: f64,
    pub bottom: f64,
    pub status: ZoneStatus,
    pub is_primary: bool,
}

impl Zone {
    pub fn key(&self) -> ZoneKey {
        ZoneKey {
            detector: self.detector,
            kind: self.kind,
            start: self.start,
        }
    }
}

/// Deduplication identity of a zone across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneKey {
    pub detector: DetectorKind,
    pub kind: ZoneKind,
    pub start: DateTime<Utc>,
}

impl ZoneKey {
    /// Stable 16-hex-char id for correlating alerts outside the process.
    pub fn fingerprint(&self, instrument: &str) -> String {
        let id_input = format!(
            "{}_{}_{}_{}",
            instrument.to_lowercase(),
            self.detector.as_str(),
            self.kind.as_str(),
            self.start.timestamp()
        );
        let mut hasher = Sha256::new();
        hasher.update(id_input.as_bytes());
        let hex_id = format!("{:x}", hasher.finalize());
        hex_id[..16].to_string()
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.detector,
            self.kind,
            self.start.format("%Y-%m-%d %H:%M")
        )
    }
}
