// src/zones/mod.rs
pub mod indicators;
pub mod patterns;
pub mod window_scanner;
pub mod zone_detection;

pub use zone_detection::{CycleReport, DetectorOutcome, ZoneDetectionEngine, ZoneDetectionRequest};
