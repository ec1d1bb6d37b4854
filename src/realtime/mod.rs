// src/realtime/mod.rs
pub mod zone_monitor;

pub use zone_monitor::{MonitorSettings, ZoneMonitor};
