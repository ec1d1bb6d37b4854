// src/config.rs
// Instrument definitions (JSON file) and service settings (environment).

use crate::errors::ConfigError;
use crate::types::{LookbackPeriod, Timeframe};
use crate::zones::patterns::{DetectorConfig, DetectorRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Symbol passed to the data provider.
    pub ticker: String,
    #[serde(default = "default_interval")]
    pub interval: Timeframe,
    #[serde(default = "default_period")]
    pub period: LookbackPeriod,
    /// Run in this order every cycle.
    pub detectors: Vec<DetectorConfig>,
}

fn default_interval() -> Timeframe {
    Timeframe::M1
}

fn default_period() -> LookbackPeriod {
    LookbackPeriod::Day1
}

impl InstrumentConfig {
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentsFile {
    pub instruments: Vec<InstrumentConfig>,
}

impl InstrumentsFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: InstrumentsFile = serde_json::from_str(&data)?;
        info!(
            "📋 [CONFIG] Loaded {} instruments from {}",
            file.instruments.len(),
            path.display()
        );
        Ok(file)
    }

    /// Startup validation. Builds every detector once so bad parameters fail here
    /// rather than inside a cycle.
    pub fn validate(&self, registry: &DetectorRegistry) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("no instruments configured".to_string()));
        }
        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                return Err(ConfigError::Invalid("instrument id must not be empty".to_string()));
            }
            if !seen.insert(instrument.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instrument id '{}'",
                    instrument.id
                )));
            }
            if instrument.ticker.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' has no ticker",
                    instrument.id
                )));
            }
            if instrument.detectors.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' has no detectors",
                    instrument.id
                )));
            }
            for detector in &instrument.detectors {
                registry.build(detector).map_err(|e| {
                    ConfigError::Invalid(format!("instrument '{}': {}", instrument.id, e))
                })?;
            }
        }
        Ok(())
    }

    /// Keeps only the requested ids; an empty filter keeps everything.
    pub fn select(self, requested: &[String]) -> Result<Vec<InstrumentConfig>, ConfigError> {
        if requested.is_empty() {
            return Ok(self.instruments);
        }
        let available: Vec<String> = self.instruments.iter().map(|i| i.id.clone()).collect();
        for id in requested {
            if !available.iter().any(|a| a.eq_ignore_ascii_case(id)) {
                return Err(ConfigError::Invalid(format!(
                    "no instrument '{}'. Available: {}",
                    id,
                    available.join(", ")
                )));
            }
        }
        Ok(self
            .instruments
            .into_iter()
            .filter(|i| requested.iter().any(|r| r.eq_ignore_ascii_case(&i.id)))
            .collect())
    }
}

/// Process-level settings read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config_file: PathBuf,
    pub eval_interval: Duration,
    pub provider_timeout: Duration,
    pub replay_data_dir: PathBuf,
    pub alert_journal_dir: PathBuf,
    pub alert_journal_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("instruments.json"),
            eval_interval: Duration::from_secs(60),
            provider_timeout: Duration::from_secs(30),
            replay_data_dir: PathBuf::from("data"),
            alert_journal_dir: PathBuf::from("logs"),
            alert_journal_enabled: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let config_file =
            std::env::var("ZONE_CONFIG_FILE").unwrap_or_else(|_| "instruments.json".to_string());

        let eval_interval_secs: u64 = std::env::var("EVAL_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        let provider_timeout_secs: u64 = std::env::var("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let replay_data_dir =
            std::env::var("REPLAY_DATA_DIR").unwrap_or_else(|_| "data".to_string());

        let alert_journal_dir =
            std::env::var("ALERT_JOURNAL_DIR").unwrap_or_else(|_| "logs".to_string());

        let alert_journal_enabled = std::env::var("ALERT_JOURNAL_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let config = Self {
            config_file: PathBuf::from(config_file),
            eval_interval: Duration::from_secs(eval_interval_secs.max(1)),
            provider_timeout: Duration::from_secs(provider_timeout_secs.max(1)),
            replay_data_dir: PathBuf::from(replay_data_dir),
            alert_journal_dir: PathBuf::from(alert_journal_dir),
            alert_journal_enabled,
        };

        info!("⚙️  Service configuration:");
        info!("   Instruments file: {}", config.config_file.display());
        info!("   Evaluation interval: {}s", config.eval_interval.as_secs());
        info!("   Provider timeout: {}s", config.provider_timeout.as_secs());
        info!("   Replay data dir: {}", config.replay_data_dir.display());
        info!(
            "   Alert journal: {} ({})",
            config.alert_journal_dir.display(),
            if config.alert_journal_enabled { "enabled" } else { "disabled" }
        );

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectorKind;

    const SAMPLE: &str = r#"{
        "instruments": [
            {
                "id": "US30",
                "ticker": "YM=F",
                "detectors": [{"kind": "accumulation", "london_range_pct": 0.002}]
            },
            {
                "id": "EURUSD",
                "ticker": "EURUSD=X",
                "interval": "15m",
                "period": "5d",
                "detectors": [{"kind": "supply_demand"}, {"kind": "fvg"}]
            }
        ]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let file: InstrumentsFile = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(file.instruments[0].interval, Timeframe::M1);
        assert_eq!(file.instruments[0].period, LookbackPeriod::Day1);
        assert_eq!(file.instruments[1].interval, Timeframe::M15);
        assert_eq!(file.instruments[1].detectors[1].kind(), DetectorKind::Fvg);
        assert!(file.validate(&DetectorRegistry::with_builtins()).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut file: InstrumentsFile = serde_json::from_str(SAMPLE).unwrap();
        file.instruments[1].id = "US30".to_string();
        assert!(file.validate(&DetectorRegistry::with_builtins()).is_err());
    }

    #[test]
    fn test_invalid_detector_params_rejected() {
        let json = r#"{"instruments": [{"id": "X", "ticker": "X",
            "detectors": [{"kind": "accumulation", "min_candles": 120, "lookback": 100}]}]}"#;
        let file: InstrumentsFile = serde_json::from_str(json).unwrap();
        assert!(file.validate(&DetectorRegistry::with_builtins()).is_err());
    }

    #[test]
    fn test_unknown_detector_kind_fails_to_parse() {
        let json = r#"{"instruments": [{"id": "X", "ticker": "X", "detectors": [{"kind": "wedge"}]}]}"#;
        assert!(serde_json::from_str::<InstrumentsFile>(json).is_err());
    }

    #[test]
    fn test_select_filters_and_rejects_unknown() {
        let file: InstrumentsFile = serde_json::from_str(SAMPLE).unwrap();
        let picked = file.clone().select(&["eurusd".to_string()]).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "EURUSD");
        assert!(file.select(&["GBPJPY".to_string()]).is_err());
    }
}
