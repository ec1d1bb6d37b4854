// src/errors.rs
use thiserror::Error;

/// Problems with the candle data handed to a cycle. Any of these aborts the
/// cycle for that instrument and leaves its lifecycle state untouched.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("Empty candle series for {0}")]
    Empty(String),

    #[error("Insufficient data: need {need} closed candles, got {got}")]
    Insufficient { need: usize, got: usize },

    #[error("Candle timestamps not strictly increasing at index {index}")]
    Unordered { index: usize },

    #[error("Invalid candle at index {index}: {reason}")]
    Malformed { index: usize, reason: &'static str },

    #[error("Provider failed for {ticker}: {message}")]
    Provider { ticker: String, message: String },

    #[error("Provider timed out for {ticker} after {secs}s")]
    Timeout { ticker: String, secs: u64 },
}

/// Invalid configuration. Raised once at startup, never per cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Unknown timeframe '{0}'")]
    UnknownTimeframe(String),

    #[error("Unknown lookback period '{0}'")]
    UnknownPeriod(String),

    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    #[error("No detector registered for '{0}'")]
    UnknownDetector(String),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure inside a single detector. Caught per detector; siblings keep running.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("Insufficient data: need {need} closed candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Detector {0} panicked")]
    Panicked(&'static str),
}

/// Delivery failure reported by an alert sink. Logged, never retried here.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink {sink} failed: {message}")]
    Delivery { sink: &'static str, message: String },

    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Unknown instrument '{0}'")]
    UnknownInstrument(String),
}
