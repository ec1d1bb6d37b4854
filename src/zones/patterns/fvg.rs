// src/zones/patterns/fvg.rs
// Three-candle price imbalances ("fair value gaps").

use super::accumulation::{check_positive, check_range};
use super::{DetectionInput, Detector, DetectorResult, Diagnostics};
use crate::errors::{ConfigError, DetectionError};
use crate::types::{Candle, DetectorKind, Zone, ZoneKind, ZoneStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgParams {
    /// Closed candles scanned, newest first.
    pub lookback: usize,
    /// Gap height as a fraction of the impulse candle's mid price.
    pub min_gap_pct: f64,
    /// Impulse candle body must be at least this fraction of its range.
    pub impulse_body_pct: f64,
}

impl Default for FvgParams {
    fn default() -> Self {
        Self {
            lookback: 80,
            min_gap_pct: 0.0001,
            impulse_body_pct: 0.60,
        }
    }
}

impl FvgParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback < 3 {
            return Err(ConfigError::Invalid(format!(
                "fvg lookback must be at least 3, got {}",
                self.lookback
            )));
        }
        check_positive("min_gap_pct", self.min_gap_pct)?;
        check_range("impulse_body_pct", self.impulse_body_pct, 0.0, 1.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FvgSummary {
    pub triples_scanned: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub rejected_gap: usize,
    pub rejected_direction: usize,
    pub rejected_body: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FvgDetector {
    pub params: FvgParams,
}

impl FvgDetector {
    pub fn new(params: FvgParams) -> Self {
        Self { params }
    }

    /// Checks the triple centred on `impulse`. Returns the gap kind and its
    /// `(bottom, top)` bounds when every filter passes.
    fn check_triple(
        &self,
        before: &Candle,
        impulse: &Candle,
        after: &Candle,
        summary: &mut FvgSummary,
    ) -> Option<(ZoneKind, f64, f64)> {
        let (kind, bottom, top) = if after.low > before.high {
            (ZoneKind::BullishGap, before.high, after.low)
        } else if after.high < before.low {
            (ZoneKind::BearishGap, after.high, before.low)
        } else {
            return None;
        };

        let direction_ok = match kind {
            ZoneKind::BullishGap => impulse.is_bullish(),
            _ => impulse.is_bearish(),
        };
        if !direction_ok {
            summary.rejected_direction += 1;
            return None;
        }

        // Zero-range impulse cannot be a real move.
        let body_ok = impulse
            .body_ratio()
            .map_or(false, |ratio| ratio >= self.params.impulse_body_pct);
        if !body_ok {
            summary.rejected_body += 1;
            return None;
        }

        let mid = (impulse.high + impulse.low) / 2.0;
        if mid <= 0.0 || (top - bottom) / mid < self.params.min_gap_pct {
            summary.rejected_gap += 1;
            return None;
        }

        Some((kind, bottom, top))
    }
}

impl Detector for FvgDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Fvg
    }

    fn min_candles(&self) -> usize {
        3
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        self.params.validate()
    }

    fn evaluate(&self, input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError> {
        let closed = input.series.closed();
        if closed.len() < self.min_candles() {
            return Err(DetectionError::InsufficientData {
                need: self.min_candles(),
                got: closed.len(),
            });
        }

        let first = closed.len().saturating_sub(self.params.lookback);
        let mut summary = FvgSummary::default();
        let mut zones = Vec::new();

        for n in (first + 1..closed.len() - 1).rev() {
            summary.triples_scanned += 1;
            let Some((kind, bottom, top)) =
                self.check_triple(&closed[n - 1], &closed[n], &closed[n + 1], &mut summary)
            else {
                continue;
            };
            match kind {
                ZoneKind::BullishGap => summary.bullish += 1,
                _ => summary.bearish += 1,
            }
            zones.push(Zone {
                detector: DetectorKind::Fvg,
                kind,
                start: closed[n - 1].timestamp,
                end: closed[n + 1].timestamp,
                top,
                bottom,
                status: ZoneStatus::Confirmed,
                is_primary: true,
            });
        }

        debug!(
            "[FVG] {} scanned {} triples: {} bullish, {} bearish",
            input.instrument, summary.triples_scanned, summary.bullish, summary.bearish
        );

        let status = if zones.is_empty() {
            ZoneStatus::Looking
        } else {
            ZoneStatus::Confirmed
        };
        Ok(DetectorResult {
            detector: DetectorKind::Fvg,
            status,
            zones,
            diagnostics: Diagnostics::Fvg(summary),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandleSeries, Timeframe};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap() + Duration::minutes(5 * i)
    }

    fn run(candles: Vec<Candle>, params: FvgParams) -> DetectorResult {
        let series = CandleSeries::new(Timeframe::M5, candles, false).unwrap();
        let detector = FvgDetector::new(params);
        let input = DetectionInput {
            instrument: "XAUUSD",
            series: &series,
            bias: None,
            now: at(10),
        };
        detector.evaluate(&input).unwrap()
    }

    fn gap_params() -> FvgParams {
        FvgParams {
            min_gap_pct: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn test_bearish_gap_bounds() {
        let candles = vec![
            Candle::new(at(0), 105.5, 106.0, 105.0, 105.2),
            Candle::new(at(1), 104.9, 105.0, 100.0, 100.4),
            Candle::new(at(2), 100.4, 100.5, 99.0, 99.5),
        ];
        let result = run(candles, gap_params());
        assert_eq!(result.zones.len(), 1);
        let zone = &result.zones[0];
        assert_eq!(zone.kind, ZoneKind::BearishGap);
        assert_eq!(zone.bottom, 100.5);
        assert_eq!(zone.top, 105.0);
        assert_eq!(zone.start, at(0));
        assert_eq!(zone.end, at(2));
    }

    #[test]
    fn test_direction_mismatch_rejected() {
        // Gap up but the middle candle closes down.
        let candles = vec![
            Candle::new(at(0), 99.5, 100.0, 99.0, 99.8),
            Candle::new(at(1), 104.5, 105.0, 100.0, 100.5),
            Candle::new(at(2), 105.5, 106.0, 105.0, 105.8),
        ];
        let result = run(candles, gap_params());
        assert!(result.zones.is_empty());
        let Diagnostics::Fvg(summary) = &result.diagnostics else {
            panic!("expected fvg diagnostics");
        };
        assert_eq!(summary.rejected_direction, 1);
    }

    #[test]
    fn test_doji_impulse_rejected() {
        let candles = vec![
            Candle::new(at(0), 99.5, 100.0, 99.0, 99.8),
            Candle::new(at(1), 102.0, 106.0, 99.0, 102.5),
            Candle::new(at(2), 105.5, 106.0, 105.0, 105.8),
        ];
        let result = run(candles, gap_params());
        assert!(result.zones.is_empty());
    }

    #[test]
    fn test_zones_are_newest_first() {
        let candles = vec![
            Candle::new(at(0), 99.5, 100.0, 99.0, 99.8),
            Candle::new(at(1), 100.5, 105.0, 100.0, 104.5),
            Candle::new(at(2), 105.5, 106.0, 105.0, 105.8),
            Candle::new(at(3), 106.0, 111.0, 105.8, 110.8),
            Candle::new(at(4), 111.0, 112.0, 110.5, 111.5),
        ];
        let result = run(candles, FvgParams::default());
        assert_eq!(result.zones.len(), 2);
        assert!(result.zones[0].start > result.zones[1].start);
    }
}
