// tests/common/mod.rs
//
// Candle fixtures shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use zone_watcher::types::{BiasCandles, Candle, CandleSeries, Timeframe};
use zone_watcher::zones::patterns::AccumulationParams;

/// Tuesday 2024-03-05 at `hour`:00 UTC.
pub fn tuesday(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap()
}

pub fn london_params() -> AccumulationParams {
    AccumulationParams {
        lookback: 40,
        min_candles: 20,
        london_range_pct: Some(0.002),
        new_york_range_pct: Some(0.003),
        ..Default::default()
    }
}

fn bar(ts: DateTime<Utc>, open: f64, close: f64, wick: f64) -> Candle {
    Candle::new(ts, open, open.max(close) + wick, open.min(close) - wick, close)
}

/// 40 one-minute candles alternating between 100.00 and 100.02 closes from
/// `start`, then a final candle with the given open/close.
pub fn choppy_then(start: DateTime<Utc>, last: (f64, f64)) -> CandleSeries {
    let mut candles = Vec::with_capacity(41);
    let mut prev = 100.0;
    for i in 0..40 {
        let close = if i % 2 == 0 { 100.02 } else { 100.0 };
        candles.push(bar(start + Duration::minutes(i), prev, close, 0.005));
        prev = close;
    }
    candles.push(bar(start + Duration::minutes(40), last.0, last.1, 0.005));
    CandleSeries::new(Timeframe::M1, candles, false).unwrap()
}

/// One point higher every minute.
pub fn trending(start: DateTime<Utc>, len: usize) -> CandleSeries {
    let candles = (0..len)
        .map(|i| {
            let open = 100.0 + i as f64;
            bar(start + Duration::minutes(i as i64), open, open + 0.9, 0.05)
        })
        .collect();
    CandleSeries::new(Timeframe::M1, candles, false).unwrap()
}

/// Constant price, every candle a doji with small wicks.
pub fn flat(start: DateTime<Utc>, len: usize, price: f64) -> CandleSeries {
    let candles = (0..len)
        .map(|i| bar(start + Duration::minutes(i as i64), price, price, 0.01))
        .collect();
    CandleSeries::new(Timeframe::M1, candles, false).unwrap()
}

/// 20 flat candles then a bullish three-candle gap with bounds [100, 105] and
/// one more candle.
pub fn gap_series(start: DateTime<Utc>) -> CandleSeries {
    let at = |i: i64| start + Duration::minutes(5 * i);
    let mut candles: Vec<Candle> = (0..20).map(|i| bar(at(i), 99.9, 99.9, 0.01)).collect();
    candles.push(Candle::new(at(20), 99.9, 100.0, 99.8, 99.95));
    candles.push(Candle::new(at(21), 100.5, 105.0, 100.0, 104.5));
    candles.push(Candle::new(at(22), 105.5, 106.0, 105.0, 105.8));
    candles.push(Candle::new(at(23), 105.8, 106.2, 105.6, 106.0));
    CandleSeries::new(Timeframe::M5, candles, false).unwrap()
}

/// 15-minute candles from `start`: 20 quiet bars, an indecision bar at index
/// 20, a bullish impulse at 21, then three bars holding above the zone.
pub fn demand_series(start: DateTime<Utc>) -> CandleSeries {
    let at = |i: i64| start + Duration::minutes(15 * i);
    let mut candles: Vec<Candle> = (0..20)
        .map(|i| Candle::new(at(i), 1.1000, 1.1006, 1.0999, 1.1005))
        .collect();
    candles.push(Candle::new(at(20), 1.1000, 1.1010, 1.0990, 1.1001));
    candles.push(Candle::new(at(21), 1.1001, 1.1042, 1.1000, 1.1040));
    for i in 22..25 {
        candles.push(Candle::new(at(i), 1.1045, 1.1052, 1.1044, 1.1050));
    }
    CandleSeries::new(Timeframe::M15, candles, false).unwrap()
}

pub fn bias(daily_bullish: bool, weekly_bullish: bool) -> BiasCandles {
    let candle = |bullish: bool| {
        if bullish {
            Candle::new(tuesday(0), 1.09, 1.11, 1.08, 1.10)
        } else {
            Candle::new(tuesday(0), 1.10, 1.11, 1.08, 1.09)
        }
    };
    BiasCandles {
        daily: candle(daily_bullish),
        weekly: candle(weekly_bullish),
    }
}
