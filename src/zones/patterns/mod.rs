// src/zones/patterns/mod.rs
use crate::errors::{ConfigError, DetectionError};
use crate::types::{BiasCandles, CandleSeries, DetectorKind, Zone, ZoneStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Declare submodules
pub mod accumulation;
pub mod fvg;
pub mod supply_demand;

// Export detectors
pub use accumulation::{AccumulationDetector, AccumulationParams, AccumulationReport};
pub use fvg::{FvgDetector, FvgParams, FvgSummary};
pub use supply_demand::{Bias, SupplyDemandDetector, SupplyDemandParams, SupplyDemandReport};

/// Everything a detector may read for one cycle. `bias` is `None` when the
/// provider could not supply the higher-timeframe candles.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub instrument: &'a str,
    pub series: &'a CandleSeries,
    pub bias: Option<&'a BiasCandles>,
    pub now: DateTime<Utc>,
}

/// Detector-specific introspection retained for the debug surface only.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostics {
    None,
    Accumulation(AccumulationReport),
    SupplyDemand(SupplyDemandReport),
    Fvg(FvgSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectorResult {
    pub detector: DetectorKind,
    pub status: ZoneStatus,
    pub zones: Vec<Zone>,
    pub diagnostics: Diagnostics,
}

impl DetectorResult {
    /// Result reported for a detector that failed this cycle.
    pub fn looking(detector: DetectorKind) -> Self {
        Self {
            detector,
            status: ZoneStatus::Looking,
            zones: Vec::new(),
            diagnostics: Diagnostics::None,
        }
    }
}

// Trait for zone detectors
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Closed candles required before `evaluate` can do anything useful.
    fn min_candles(&self) -> usize;

    fn evaluate(&self, input: &DetectionInput<'_>) -> Result<DetectorResult, DetectionError>;

    fn validate_config(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Per-instrument detector entry as it appears in the instruments file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    Accumulation(AccumulationParams),
    SupplyDemand(SupplyDemandParams),
    Fvg(FvgParams),
}

impl DetectorConfig {
    pub fn kind(&self) -> DetectorKind {
        match self {
            DetectorConfig::Accumulation(_) => DetectorKind::Accumulation,
            DetectorConfig::SupplyDemand(_) => DetectorKind::SupplyDemand,
            DetectorConfig::Fvg(_) => DetectorKind::Fvg,
        }
    }
}

pub type DetectorFactory = fn(&DetectorConfig) -> Result<Box<dyn Detector>, ConfigError>;

/// Maps a detector kind to the function that builds it from config.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    factories: HashMap<DetectorKind, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DetectorKind::Accumulation, build_accumulation);
        registry.register(DetectorKind::SupplyDemand, build_supply_demand);
        registry.register(DetectorKind::Fvg, build_fvg);
        registry
    }

    pub fn register(&mut self, kind: DetectorKind, factory: DetectorFactory) {
        self.factories.insert(kind, factory);
    }

    /// Builds and validates one detector.
    pub fn build(&self, config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigError> {
        let factory = self
            .factories
            .get(&config.kind())
            .ok_or_else(|| ConfigError::UnknownDetector(config.kind().to_string()))?;
        let detector = factory(config)?;
        detector.validate_config()?;
        Ok(detector)
    }

    pub fn build_all(
        &self,
        configs: &[DetectorConfig],
    ) -> Result<Vec<Box<dyn Detector>>, ConfigError> {
        configs.iter().map(|c| self.build(c)).collect()
    }
}

fn mismatch(expected: DetectorKind, config: &DetectorConfig) -> ConfigError {
    ConfigError::Invalid(format!(
        "{} factory received {} parameters",
        expected,
        config.kind()
    ))
}

fn build_accumulation(config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigError> {
    match config {
        DetectorConfig::Accumulation(p) => Ok(Box::new(AccumulationDetector::new(p.clone()))),
        other => Err(mismatch(DetectorKind::Accumulation, other)),
    }
}

fn build_supply_demand(config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigError> {
    match config {
        DetectorConfig::SupplyDemand(p) => Ok(Box::new(SupplyDemandDetector::new(p.clone()))),
        other => Err(mismatch(DetectorKind::SupplyDemand, other)),
    }
}

fn build_fvg(config: &DetectorConfig) -> Result<Box<dyn Detector>, ConfigError> {
    match config {
        DetectorConfig::Fvg(p) => Ok(Box::new(FvgDetector::new(p.clone()))),
        other => Err(mismatch(DetectorKind::Fvg, other)),
    }
}
