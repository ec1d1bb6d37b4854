// src/zones/zone_detection.rs
// One evaluation cycle: validate the series, run each detector in isolation,
// fold the outcomes into the instrument's lifecycle state.

use crate::errors::{ConfigError, DataError, DetectionError};
use crate::types::{BiasCandles, CandleSeries, DetectorKind};
use crate::zone_lifecycle::{AlertEvent, EngineState, ZoneLifecycleManager, ZoneSnapshot};
use crate::zones::patterns::{
    DetectionInput, Detector, DetectorConfig, DetectorRegistry, DetectorResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

// ==================== ZONE DETECTION REQUEST ====================

#[derive(Debug, Clone, Copy)]
pub struct ZoneDetectionRequest<'a> {
    pub instrument: &'a str,
    pub series: &'a CandleSeries,
    pub bias: Option<&'a BiasCandles>,
    pub now: DateTime<Utc>,
}

/// A detector's result for one cycle. `error` is set when the detector failed
/// and `result` is then a bare `looking`.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorOutcome {
    pub result: DetectorResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectorOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything produced by one completed cycle, kept for the debug surface.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub instrument: String,
    pub cycle: u64,
    pub evaluated_at: DateTime<Utc>,
    pub series_len: usize,
    pub closed_len: usize,
    pub weekend: bool,
    pub outcomes: Vec<DetectorOutcome>,
    pub tracked: Vec<ZoneSnapshot>,
    pub alerts: Vec<AlertEvent>,
}

// ==================== CORE ZONE DETECTION ENGINE ====================

pub struct ZoneDetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
    lifecycle: ZoneLifecycleManager,
}

impl ZoneDetectionEngine {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            detectors,
            lifecycle: ZoneLifecycleManager::new(),
        }
    }

    pub fn from_configs(
        registry: &DetectorRegistry,
        configs: &[DetectorConfig],
    ) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::Invalid(
                "an instrument needs at least one detector".to_string(),
            ));
        }
        Ok(Self::new(registry.build_all(configs)?))
    }

    pub fn detector_kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Closed candles needed by the most demanding detector.
    pub fn required_candles(&self) -> usize {
        self.detectors
            .iter()
            .map(|d| d.min_candles())
            .max()
            .unwrap_or(0)
    }

    pub fn needs_bias(&self) -> bool {
        self.detectors
            .iter()
            .any(|d| d.kind() == DetectorKind::SupplyDemand)
    }

    /// Runs every detector against the series. A short series aborts the
    /// whole cycle; a failing or panicking detector only affects itself.
    pub fn detect(&self, request: &ZoneDetectionRequest<'_>) -> Result<Vec<DetectorOutcome>, DataError> {
        let closed = request.series.closed().len();
        let need = self.required_candles();
        debug!(
            "[ZoneEngine] Detecting zones for {} with {} candles ({} closed)",
            request.instrument,
            request.series.len(),
            closed
        );
        if closed < need {
            return Err(DataError::Insufficient { need, got: closed });
        }

        let input = DetectionInput {
            instrument: request.instrument,
            series: request.series,
            bias: request.bias,
            now: request.now,
        };

        let outcomes = self
            .detectors
            .iter()
            .map(|detector| {
                let kind = detector.kind();
                let evaluated = catch_unwind(AssertUnwindSafe(|| detector.evaluate(&input)))
                    .unwrap_or_else(|_| Err(DetectionError::Panicked(kind.as_str())));
                match evaluated {
                    Ok(result) => DetectorOutcome {
                        result,
                        error: None,
                    },
                    Err(e) => {
                        error!("[ZoneEngine] {} detector {} failed: {}", request.instrument, kind, e);
                        DetectorOutcome {
                            result: DetectorResult::looking(kind),
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }

    /// Detects and then updates `state`. On error `state` is left as it was.
    pub fn run_cycle(
        &self,
        state: &mut EngineState,
        request: &ZoneDetectionRequest<'_>,
    ) -> Result<CycleReport, DataError> {
        let outcomes = self.detect(request)?;
        let alerts = self
            .lifecycle
            .apply(state, request.instrument, &outcomes, request.now);

        debug!(
            "[ZoneEngine] {} cycle {} complete: {} tracked, {} alerts",
            request.instrument,
            state.cycle,
            state.entries.len(),
            alerts.len()
        );

        Ok(CycleReport {
            instrument: request.instrument.to_string(),
            cycle: state.cycle,
            evaluated_at: request.now,
            series_len: request.series.len(),
            closed_len: request.series.closed().len(),
            weekend: state.weekend,
            outcomes,
            tracked: state.snapshot(request.instrument),
            alerts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candle, Timeframe, Zone, ZoneKind, ZoneStatus};
    use crate::zones::patterns::Diagnostics;
    use chrono::{Duration, TimeZone};

    struct Panicking;

    impl Detector for Panicking {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Accumulation
        }
        fn min_candles(&self) -> usize {
            1
        }
        fn evaluate(&self, _input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError> {
            panic!("detector blew up");
        }
    }

    struct OneZone;

    impl Detector for OneZone {
        fn kind(&self) -> DetectorKind {
            DetectorKind::Fvg
        }
        fn min_candles(&self) -> usize {
            2
        }
        fn evaluate(&self, input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError> {
            let first = input.series.candles()[0];
            Ok(DetectorResult {
                detector: DetectorKind::Fvg,
                status: ZoneStatus::Confirmed,
                zones: vec![Zone {
                    detector: DetectorKind::Fvg,
                    kind: ZoneKind::BullishGap,
                    start: first.timestamp,
                    end: first.timestamp,
                    top: first.high,
                    bottom: first.low,
                    status: ZoneStatus::Confirmed,
                    is_primary: true,
                }],
                diagnostics: Diagnostics::None,
            })
        }
    }

    fn series(len: i64) -> CandleSeries {
        let base = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        let candles = (0..len)
            .map(|i| Candle::new(base + Duration::minutes(i), 1.0, 1.1, 0.9, 1.05))
            .collect();
        CandleSeries::new(Timeframe::M1, candles, false).unwrap()
    }

    #[test]
    fn test_panicking_detector_is_isolated() {
        let engine = ZoneDetectionEngine::new(vec![Box::new(Panicking), Box::new(OneZone)]);
        let mut state = EngineState::new();
        let s = series(5);
        let request = ZoneDetectionRequest {
            instrument: "US30",
            series: &s,
            bias: None,
            now: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        };
        let report = engine.run_cycle(&mut state, &request).unwrap();
        assert!(!report.outcomes[0].succeeded());
        assert_eq!(report.outcomes[0].result.status, ZoneStatus::Looking);
        assert!(report.outcomes[1].succeeded());
        assert_eq!(report.alerts.len(), 1);
    }

    #[test]
    fn test_short_series_aborts_without_touching_state() {
        let engine = ZoneDetectionEngine::new(vec![Box::new(OneZone)]);
        let mut state = EngineState::new();
        let s = series(1);
        let request = ZoneDetectionRequest {
            instrument: "US30",
            series: &s,
            bias: None,
            now: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        };
        let err = engine.run_cycle(&mut state, &request).unwrap_err();
        assert!(matches!(err, DataError::Insufficient { need: 2, got: 1 }));
        assert_eq!(state.cycle, 0);
        assert!(state.entries.is_empty());
    }

    #[test]
    fn test_empty_detector_list_is_config_error() {
        let registry = DetectorRegistry::with_builtins();
        assert!(ZoneDetectionEngine::from_configs(&registry, &[]).is_err());
    }
}
