// src/realtime/zone_monitor.rs
// Per-instrument scheduling: fetch -> detect -> lifecycle under one lock per
// instrument, alerts dispatched after the lock is released.

use crate::config::{InstrumentConfig, ServiceConfig};
use crate::data::DataProvider;
use crate::errors::{ConfigError, DataError, EngineError};
use crate::notifications::AlertDispatcher;
use crate::types::BiasCandles;
use crate::zone_lifecycle::{EngineState, ZoneSnapshot};
use crate::zones::patterns::DetectorRegistry;
use crate::zones::{CycleReport, ZoneDetectionEngine, ZoneDetectionRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub eval_interval: Duration,
    pub provider_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            eval_interval: Duration::from_secs(60),
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ServiceConfig> for MonitorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            eval_interval: config.eval_interval,
            provider_timeout: config.provider_timeout,
        }
    }
}

struct InstrumentWorker {
    config: InstrumentConfig,
    engine: ZoneDetectionEngine,
    state: Mutex<EngineState>,
}

#[derive(Clone)]
pub struct ZoneMonitor {
    workers: Arc<Vec<Arc<InstrumentWorker>>>,
    provider: Arc<dyn DataProvider>,
    dispatcher: AlertDispatcher,
    settings: MonitorSettings,
    reports: Arc<DashMap<String, CycleReport>>,
}

impl ZoneMonitor {
    pub fn new(
        instruments: Vec<InstrumentConfig>,
        registry: &DetectorRegistry,
        provider: Arc<dyn DataProvider>,
        dispatcher: AlertDispatcher,
        settings: MonitorSettings,
    ) -> Result<Self, ConfigError> {
        let mut workers = Vec::with_capacity(instruments.len());
        for config in instruments {
            let engine = ZoneDetectionEngine::from_configs(registry, &config.detectors)?;
            info!(
                "🎯 [MONITOR] {} ({} {} / {}) detectors: {:?}",
                config.id,
                config.ticker,
                config.interval,
                config.period,
                engine.detector_kinds()
            );
            workers.push(Arc::new(InstrumentWorker {
                config,
                engine,
                state: Mutex::new(EngineState::new()),
            }));
        }
        Ok(Self {
            workers: Arc::new(workers),
            provider,
            dispatcher,
            settings,
            reports: Arc::new(DashMap::new()),
        })
    }

    pub fn instrument_ids(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.config.id.clone()).collect()
    }

    fn worker(&self, id: &str) -> Option<&Arc<InstrumentWorker>> {
        self.workers.iter().find(|w| w.config.id == id)
    }

    /// Most recent completed cycle for the instrument.
    pub fn latest_report(&self, id: &str) -> Option<CycleReport> {
        self.reports.get(id).map(|r| r.value().clone())
    }

    pub async fn tracked_zones(&self, id: &str) -> Option<Vec<ZoneSnapshot>> {
        let worker = self.worker(id)?;
        let state = worker.state.lock().await;
        Some(state.snapshot(&worker.config.id))
    }

    /// One full cycle for one instrument, alerts included.
    pub async fn evaluate_instrument(&self, id: &str, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let worker = self
            .worker(id)
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))?;
        Ok(self.evaluate_worker(worker, now).await?)
    }

    /// One cycle for every instrument, in parallel.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Vec<(String, Result<CycleReport, DataError>)> {
        let cycles = self.workers.iter().map(|worker| async move {
            (worker.config.id.clone(), self.evaluate_worker(worker, now).await)
        });
        join_all(cycles).await
    }

    async fn evaluate_worker(&self, worker: &InstrumentWorker, now: DateTime<Utc>) -> Result<CycleReport, DataError> {
        let report = {
            let mut state = worker.state.lock().await;
            let series = self.fetch_series(&worker.config).await?;
            let bias = if worker.engine.needs_bias() {
                self.fetch_bias(&worker.config).await
            } else {
                None
            };
            let request = ZoneDetectionRequest {
                instrument: &worker.config.id,
                series: &series,
                bias: bias.as_ref(),
                now,
            };
            worker.engine.run_cycle(&mut state, &request)?
        };

        self.reports.insert(worker.config.id.clone(), report.clone());
        if !report.alerts.is_empty() {
            self.dispatcher.dispatch(&report.alerts).await;
        }
        Ok(report)
    }

    async fn fetch_series(&self, config: &InstrumentConfig) -> Result<crate::types::CandleSeries, DataError> {
        let limit = self.settings.provider_timeout;
        timeout(
            limit,
            self.provider
                .get_series(&config.ticker, config.interval, config.period),
        )
        .await
        .map_err(|_| DataError::Timeout {
            ticker: config.ticker.clone(),
            secs: limit.as_secs(),
        })?
    }

    /// Bias problems are not fatal; the detector reports an indeterminate bias.
    async fn fetch_bias(&self, config: &InstrumentConfig) -> Option<BiasCandles> {
        match timeout(
            self.settings.provider_timeout,
            self.provider.get_bias_series(&config.ticker),
        )
        .await
        {
            Ok(Ok(bias)) => Some(bias),
            Ok(Err(e)) => {
                warn!("⚠️ [MONITOR] {} bias unavailable: {}", config.id, e);
                None
            }
            Err(_) => {
                warn!("⚠️ [MONITOR] {} bias fetch timed out", config.id);
                None
            }
        }
    }

    /// Starts one ticking task per instrument. Tasks stop when `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.workers
            .iter()
            .map(|worker| {
                let monitor = self.clone();
                let worker = Arc::clone(worker);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let id = worker.config.id.clone();
                    let mut ticker = tokio::time::interval(monitor.settings.eval_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    info!("🚀 [MONITOR] {} started, every {}s", id, monitor.settings.eval_interval.as_secs());
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                match monitor.evaluate_worker(&worker, Utc::now()).await {
                                    Ok(report) => debug!(
                                        "[MONITOR] {} cycle {}: {} tracked, {} alerts",
                                        id, report.cycle, report.tracked.len(), report.alerts.len()
                                    ),
                                    Err(e) => warn!("⚠️ [MONITOR] {} cycle aborted: {}", id, e),
                                }
                            }
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    info!("🛑 [MONITOR] {} stopping", id);
                                    break;
                                }
                            }
                        }
                    }
                })
            })
            .collect()
    }
}
