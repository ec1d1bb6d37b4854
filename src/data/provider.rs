// src/data/provider.rs
use crate::errors::DataError;
use crate::types::{BiasCandles, CandleSeries, LookbackPeriod, Timeframe};
use dashmap::DashMap;
use futures::future::BoxFuture;

/// Source of candle data. Implementations return clean, strictly ordered
/// series; any failure aborts the calling cycle.
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn get_series<'a>(
        &'a self,
        ticker: &'a str,
        interval: Timeframe,
        period: LookbackPeriod,
    ) -> BoxFuture<'a, Result<CandleSeries, DataError>>;

    /// Previous completed daily and weekly candles.
    fn get_bias_series<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<BiasCandles, DataError>>;
}

/// In-memory provider. Series can be swapped between cycles.
#[derive(Debug, Default)]
pub struct StaticProvider {
    series: DashMap<String, CandleSeries>,
    bias: DashMap<String, BiasCandles>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_series(&self, ticker: &str, series: CandleSeries) {
        self.series.insert(ticker.to_string(), series);
    }

    pub fn set_bias(&self, ticker: &str, bias: BiasCandles) {
        self.bias.insert(ticker.to_string(), bias);
    }

    pub fn clear_series(&self, ticker: &str) {
        self.series.remove(ticker);
    }
}

impl DataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn get_series<'a>(
        &'a self,
        ticker: &'a str,
        _interval: Timeframe,
        _period: LookbackPeriod,
    ) -> BoxFuture<'a, Result<CandleSeries, DataError>> {
        Box::pin(async move {
            self.series
                .get(ticker)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| DataError::Provider {
                    ticker: ticker.to_string(),
                    message: "no series loaded".to_string(),
                })
        })
    }

    fn get_bias_series<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<BiasCandles, DataError>> {
        Box::pin(async move {
            self.bias
                .get(ticker)
                .map(|entry| *entry.value())
                .ok_or_else(|| DataError::Provider {
                    ticker: ticker.to_string(),
                    message: "no bias candles loaded".to_string(),
                })
        })
    }
}
