// src/zones/window_scanner.rs
// Sliding windows anchored at the newest candle of a slice, largest first.

use serde::Serialize;

/// Inclusive index range `[start_index, end_index]` over a candle slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start_index: usize,
    pub end_index: usize,
}

impl Window {
    pub fn size(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.start_index..=self.end_index]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowScanner {
    pub min_candles: usize,
    pub lookback: usize,
}

impl WindowScanner {
    pub fn new(min_candles: usize, lookback: usize) -> Self {
        Self {
            min_candles,
            lookback,
        }
    }

    /// Windows ending at `len - 1`, sizes from `min(lookback, len)` down to
    /// `min_candles`. Empty when `len < min_candles`.
    pub fn scan(&self, len: usize) -> Windows {
        let largest = self.lookback.min(len);
        Windows {
            len,
            next_size: largest,
            min_size: self.min_candles.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Windows {
    len: usize,
    next_size: usize,
    min_size: usize,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next_size < self.min_size || self.next_size == 0 || self.next_size > self.len {
            return None;
        }
        let size = self.next_size;
        self.next_size -= 1;
        Some(Window {
            start_index: self.len - size,
            end_index: self.len - 1,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next_size >= self.min_size && self.next_size <= self.len {
            self.next_size - self.min_size + 1
        } else {
            0
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}
