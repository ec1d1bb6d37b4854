// src/session.rs
// UTC trading sessions and the weekend halt window.

use crate::errors::ConfigError;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asian,
    London,
    NewYork,
}

impl Session {
    pub const ALL: [Session; 3] = [Session::Asian, Session::London, Session::NewYork];

    /// Half-open UTC hour band `[start, end)`.
    pub fn hours(&self) -> (u32, u32) {
        match self {
            Session::Asian => (1, 7),
            Session::London => (8, 12),
            Session::NewYork => (13, 19),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Asian => "asian",
            Session::London => "london",
            Session::NewYork => "new_york",
        }
    }
}

impl FromStr for Session {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asian" | "asia" => Ok(Session::Asian),
            "london" => Ok(Session::London),
            "new_york" | "newyork" | "ny" => Ok(Session::NewYork),
            other => Err(ConfigError::UnknownSession(other.to_string())),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session whose hour band contains `ts`, or `None` in the gaps.
pub fn session_for(ts: DateTime<Utc>) -> Option<Session> {
    let hour = ts.hour();
    Session::ALL.into_iter().find(|session| {
        let (start, end) = session.hours();
        hour >= start && hour < end
    })
}

/// Friday 23:00 UTC (inclusive) through Sunday 22:00 UTC (exclusive).
pub fn is_weekend_halt(ts: DateTime<Utc>) -> bool {
    match ts.weekday() {
        Weekday::Fri => ts.hour() >= 23,
        Weekday::Sat => true,
        Weekday::Sun => ts.hour() < 22,
        _ => false,
    }
}
