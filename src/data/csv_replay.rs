// src/data/csv_replay.rs
// Replays candles from CSV exports laid out as `<dir>/<ticker>_<interval>.csv`.

use super::provider::DataProvider;
use crate::errors::DataError;
use crate::types::{BiasCandles, Candle, CandleSeries, LookbackPeriod, Timeframe};
use chrono::{DateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// RFC 3339 or unix seconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Parses candle CSV text. Unreadable rows are skipped with a warning.
pub fn parse_candles(text: &str, source: &str) -> Result<Vec<Candle>, DataError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut candles = Vec::new();
    for (line, result) in rdr.deserialize::<CandleRow>().enumerate() {
        match result {
            Ok(row) => match parse_timestamp(&row.timestamp) {
                Some(timestamp) => candles.push(
                    Candle::new(timestamp, row.open, row.high, row.low, row.close)
                        .with_volume(row.volume.unwrap_or(0.0)),
                ),
                None => warn!("[REPLAY] {} row {}: bad timestamp '{}'", source, line + 1, row.timestamp),
            },
            Err(e) => warn!("[REPLAY] {} row {}: {}", source, line + 1, e),
        }
    }
    Ok(candles)
}

#[derive(Debug, Clone)]
pub struct CsvReplayProvider {
    data_dir: PathBuf,
}

impl CsvReplayProvider {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, ticker: &str, interval: Timeframe) -> PathBuf {
        let clean: String = ticker
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.data_dir
            .join(format!("{}_{}.csv", clean, interval.as_str()))
    }

    async fn load(&self, ticker: &str, interval: Timeframe) -> Result<Vec<Candle>, DataError> {
        let path = self.path_for(ticker, interval);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DataError::Provider {
                ticker: ticker.to_string(),
                message: format!("{}: {}", path.display(), e),
            })?;
        let candles = parse_candles(&text, &path.display().to_string())?;
        debug!("[REPLAY] Loaded {} candles from {}", candles.len(), path.display());
        Ok(candles)
    }

    /// Second-to-last row: the last fully completed bar.
    async fn previous_completed(&self, ticker: &str, interval: Timeframe) -> Result<Candle, DataError> {
        let candles = self.load(ticker, interval).await?;
        if candles.len() < 2 {
            return Err(DataError::Provider {
                ticker: ticker.to_string(),
                message: format!("need two {} candles for bias, got {}", interval, candles.len()),
            });
        }
        Ok(candles[candles.len() - 2])
    }
}

impl DataProvider for CsvReplayProvider {
    fn name(&self) -> &'static str {
        "csv_replay"
    }

    fn get_series<'a>(
        &'a self,
        ticker: &'a str,
        interval: Timeframe,
        period: LookbackPeriod,
    ) -> BoxFuture<'a, Result<CandleSeries, DataError>> {
        Box::pin(async move {
            let candles = self.load(ticker, interval).await?;
            let Some(last) = candles.last().map(|c| c.timestamp) else {
                return Err(DataError::Empty(ticker.to_string()));
            };
            let forming = last + interval.duration() > Utc::now();
            let series = CandleSeries::new(interval, candles, forming)?;
            Ok(series.since(last - period.duration()))
        })
    }

    fn get_bias_series<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<BiasCandles, DataError>> {
        Box::pin(async move {
            let daily = self.previous_completed(ticker, Timeframe::D1).await?;
            let weekly = self.previous_completed(ticker, Timeframe::W1).await?;
            Ok(BiasCandles { daily, weekly })
        })
    }
}
