// src/zones/indicators.rs
// Window statistics shared by the detectors: OLS slope, choppiness and Wilder ADX.

use crate::types::Candle;

/// Shortest period the ADX will shrink to on short windows.
pub const MIN_ADX_PERIOD: usize = 5;

pub fn mean_close(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64
}

pub fn mean_body(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    candles.iter().map(Candle::body).sum::<f64>() / candles.len() as f64
}

/// Ordinary-least-squares slope of closes against bar index.
pub fn ols_slope(candles: &[Candle]) -> f64 {
    let n = candles.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean_close(candles);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, candle) in candles.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (candle.close - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Fraction of adjacent close-to-close moves whose sign differs from the
/// previous move. `None` when there are fewer than two moves or every move is
/// flat.
pub fn choppiness(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 3 {
        return None;
    }
    let moves: Vec<i8> = candles
        .windows(2)
        .map(|pair| sign(pair[1].close - pair[0].close))
        .collect();
    if moves.iter().all(|&m| m == 0) {
        return None;
    }
    let changes = moves.windows(2).filter(|pair| pair[0] != pair[1]).count();
    Some(changes as f64 / (moves.len() - 1) as f64)
}

/// Period actually used for a window of `len` candles: reduced by 2 (not below
/// `MIN_ADX_PERIOD`) until `len >= 2 * period + 1`.
pub fn effective_adx_period(len: usize, period: usize) -> Option<usize> {
    let mut p = period;
    while p > MIN_ADX_PERIOD && len < p * 2 + 1 {
        p = (p.saturating_sub(2)).max(MIN_ADX_PERIOD);
    }
    (p > 0 && len >= p * 2 + 1).then_some(p)
}

/// Wilder ADX at the last candle of the slice. `None` when the slice is too
/// short even after period reduction.
pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    let n = candles.len();
    let period = effective_adx_period(n, period)?;

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];

    for i in 1..n {
        let (cur, prev) = (&candles[i], &candles[i - 1]);
        let hl = cur.high - cur.low;
        let hc = (cur.high - prev.close).abs();
        let lc = (cur.low - prev.close).abs();
        tr[i] = hl.max(hc).max(lc);

        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let smooth_tr = wilder_sum(&tr, period);
    let smooth_plus = wilder_sum(&plus_dm, period);
    let smooth_minus = wilder_sum(&minus_dm, period);

    let mut dx = vec![0.0; n];
    for i in period..n {
        if smooth_tr[i] <= 0.0 {
            continue;
        }
        let plus_di = 100.0 * smooth_plus[i] / smooth_tr[i];
        let minus_di = 100.0 * smooth_minus[i] / smooth_tr[i];
        let di_sum = plus_di + minus_di;
        if di_sum > 0.0 {
            dx[i] = 100.0 * (plus_di - minus_di).abs() / di_sum;
        }
    }

    // Seed with the mean DX over [period, 2*period], then Wilder-average.
    let start = 2 * period;
    let seed = dx[period..=start].iter().sum::<f64>() / (period + 1) as f64;
    let adx = dx[start + 1..]
        .iter()
        .fold(seed, |acc, &d| (acc * (period - 1) as f64 + d) / period as f64);
    Some(adx)
}

/// Running Wilder sum seeded with the first `period` values after index 0.
fn wilder_sum(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; n];
    if n <= period {
        return out;
    }
    out[period] = values[1..=period].iter().sum();
    for i in period + 1..n {
        out[i] = out[i - 1] - out[i - 1] / period as f64 + values[i];
    }
    out
}
