// src/data/mod.rs
pub mod csv_replay;
pub mod provider;

pub use csv_replay::CsvReplayProvider;
pub use provider::{DataProvider, StaticProvider};
