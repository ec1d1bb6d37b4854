// src/lib.rs
pub mod config;
pub mod data;
pub mod errors;
pub mod notifications;
pub mod realtime;
pub mod session;
pub mod types;
pub mod zone_lifecycle;
pub mod zones;
