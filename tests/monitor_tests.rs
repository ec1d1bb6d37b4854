// tests/monitor_tests.rs
//
// Scheduler-level behaviour of the zone monitor against an in-memory provider.

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use zone_watcher::config::InstrumentConfig;
use zone_watcher::data::{DataProvider, StaticProvider};
use zone_watcher::errors::{DataError, EngineError, SinkError};
use zone_watcher::notifications::{AlertDispatcher, AlertSink, ChannelAlertSink};
use zone_watcher::realtime::{MonitorSettings, ZoneMonitor};
use zone_watcher::types::{BiasCandles, CandleSeries, LookbackPeriod, Timeframe, ZoneStatus};
use zone_watcher::zone_lifecycle::AlertEvent;
use zone_watcher::zones::patterns::{DetectorConfig, DetectorRegistry, SupplyDemandParams};

fn us30() -> InstrumentConfig {
    InstrumentConfig {
        id: "US30".to_string(),
        label: "US30 (Dow Jones Futures)".to_string(),
        ticker: "YM=F".to_string(),
        interval: Timeframe::M1,
        period: LookbackPeriod::Day1,
        detectors: vec![DetectorConfig::Accumulation(london_params())],
    }
}

fn eurusd() -> InstrumentConfig {
    InstrumentConfig {
        id: "EURUSD".to_string(),
        label: String::new(),
        ticker: "EURUSD=X".to_string(),
        interval: Timeframe::M15,
        period: LookbackPeriod::Day5,
        detectors: vec![DetectorConfig::SupplyDemand(SupplyDemandParams::default())],
    }
}

fn monitor_with(
    instruments: Vec<InstrumentConfig>,
    provider: Arc<dyn DataProvider>,
    settings: MonitorSettings,
) -> (ZoneMonitor, tokio::sync::mpsc::Receiver<AlertEvent>) {
    let (sink, rx) = ChannelAlertSink::channel(16);
    let dispatcher = AlertDispatcher::new().with_sink(Arc::new(sink));
    let registry = DetectorRegistry::with_builtins();
    let monitor = ZoneMonitor::new(instruments, &registry, provider, dispatcher, settings).unwrap();
    (monitor, rx)
}

#[tokio::test]
async fn test_confirmed_breakout_reaches_sink() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.5)));
    let (monitor, mut rx) = monitor_with(vec![us30()], provider, MonitorSettings::default());

    let now = tuesday(9) + ChronoDuration::minutes(42);
    let report = monitor.evaluate_instrument("US30", now).await.unwrap();
    assert_eq!(report.alerts.len(), 1);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.instrument, "US30");
    assert_eq!(event.zone_id, report.alerts[0].zone_id);

    // Same data next cycle: no repeat.
    let again = monitor
        .evaluate_instrument("US30", now + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert!(again.alerts.is_empty());
    assert!(rx.try_recv().is_err());

    let latest = monitor.latest_report("US30").unwrap();
    assert_eq!(latest.cycle, 2);
}

#[tokio::test]
async fn test_provider_failure_leaves_state_untouched() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.01)));
    let (monitor, _rx) = monitor_with(vec![us30()], provider.clone(), MonitorSettings::default());

    let now = tuesday(9) + ChronoDuration::minutes(41);
    monitor.evaluate_instrument("US30", now).await.unwrap();
    let before = monitor.tracked_zones("US30").await.unwrap();
    assert!(!before.is_empty());
    assert!(before.iter().all(|z| z.status == ZoneStatus::Active));

    provider.clear_series("YM=F");
    let err = monitor
        .evaluate_instrument("US30", now + ChronoDuration::minutes(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Data(DataError::Provider { .. })));

    let after = monitor.tracked_zones("US30").await.unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before[0].key, after[0].key);
    assert_eq!(before[0].last_seen, after[0].last_seen);
    assert_eq!(monitor.latest_report("US30").unwrap().cycle, 1);
}

#[tokio::test]
async fn test_short_series_aborts_cycle() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", flat(tuesday(9), 10, 100.0));
    let (monitor, _rx) = monitor_with(vec![us30()], provider, MonitorSettings::default());

    let err = monitor
        .evaluate_instrument("US30", tuesday(10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Data(DataError::Insufficient { need: 21, got: 10 })
    ));
    assert!(monitor.latest_report("US30").is_none());
}

struct SlowProvider;

impl DataProvider for SlowProvider {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn get_series<'a>(
        &'a self,
        ticker: &'a str,
        _interval: Timeframe,
        _period: LookbackPeriod,
    ) -> BoxFuture<'a, Result<CandleSeries, DataError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DataError::Empty(ticker.to_string()))
        })
    }

    fn get_bias_series<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<BiasCandles, DataError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DataError::Empty(ticker.to_string()))
        })
    }
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let settings = MonitorSettings {
        eval_interval: Duration::from_secs(60),
        provider_timeout: Duration::from_millis(50),
    };
    let (monitor, _rx) = monitor_with(vec![us30()], Arc::new(SlowProvider), settings);

    let err = monitor
        .evaluate_instrument("US30", tuesday(10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Data(DataError::Timeout { .. })));
}

#[tokio::test]
async fn test_missing_bias_is_not_fatal() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("EURUSD=X", demand_series(tuesday(8)));
    let (monitor, _rx) = monitor_with(vec![eurusd()], provider.clone(), MonitorSettings::default());

    let report = monitor
        .evaluate_instrument("EURUSD", tuesday(15))
        .await
        .unwrap();
    assert!(report.outcomes[0].succeeded());
    assert!(report.alerts.is_empty());

    provider.set_bias("EURUSD=X", bias(true, true));
    let report = monitor
        .evaluate_instrument("EURUSD", tuesday(15))
        .await
        .unwrap();
    assert_eq!(report.alerts.len(), 1);
}

#[tokio::test]
async fn test_run_once_isolates_instruments() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.5)));
    let (monitor, _rx) = monitor_with(vec![us30(), eurusd()], provider, MonitorSettings::default());

    let results = monitor
        .run_once(tuesday(9) + ChronoDuration::minutes(42))
        .await;
    assert_eq!(results.len(), 2);
    for (id, result) in results {
        match id.as_str() {
            "US30" => assert_eq!(result.unwrap().alerts.len(), 1),
            "EURUSD" => assert!(matches!(result, Err(DataError::Provider { .. }))),
            other => panic!("unexpected instrument {}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_instrument_is_rejected() {
    let (monitor, _rx) = monitor_with(
        vec![us30()],
        Arc::new(StaticProvider::new()),
        MonitorSettings::default(),
    );
    let err = monitor
        .evaluate_instrument("GER40", tuesday(10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownInstrument(id) if id == "GER40"));
    assert!(monitor.tracked_zones("GER40").await.is_none());
}

#[tokio::test]
async fn test_spawned_tasks_stop_on_shutdown() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.5)));
    let settings = MonitorSettings {
        eval_interval: Duration::from_secs(3600),
        provider_timeout: Duration::from_secs(1),
    };
    let (monitor, _rx) = monitor_with(vec![us30()], provider, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = monitor.spawn(shutdown_rx);
    assert_eq!(handles.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor task did not stop")
            .unwrap();
    }
    // The first tick fires immediately.
    assert!(monitor.latest_report("US30").is_some());
}

struct RejectingSink;

impl AlertSink for RejectingSink {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn deliver<'a>(&'a self, _event: &'a AlertEvent) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async {
            Err(SinkError::Delivery {
                sink: "rejecting",
                message: "endpoint unavailable".to_string(),
            })
        })
    }
}

#[tokio::test]
async fn test_sink_failure_keeps_alert_record() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.5)));
    let dispatcher = AlertDispatcher::new().with_sink(Arc::new(RejectingSink));
    let registry = DetectorRegistry::with_builtins();
    let monitor = ZoneMonitor::new(
        vec![us30()],
        &registry,
        provider,
        dispatcher,
        MonitorSettings::default(),
    )
    .unwrap();

    let now = tuesday(9) + ChronoDuration::minutes(42);
    let first = monitor.evaluate_instrument("US30", now).await.unwrap();
    assert_eq!(first.alerts.len(), 1);

    let second = monitor
        .evaluate_instrument("US30", now + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert!(second.alerts.is_empty());

    let tracked = monitor.tracked_zones("US30").await.unwrap();
    let primary = tracked.iter().find(|z| z.zone.is_primary).unwrap();
    assert_eq!(primary.status, ZoneStatus::Confirmed);
    assert_eq!(primary.alerted_at, Some(now));
}

#[tokio::test]
async fn test_latest_report_serializes_to_json() {
    let provider = Arc::new(StaticProvider::new());
    provider.set_series("YM=F", choppy_then(tuesday(9), (100.0, 100.5)));
    let (monitor, _rx) = monitor_with(vec![us30()], provider, MonitorSettings::default());

    monitor
        .evaluate_instrument("US30", tuesday(9) + ChronoDuration::minutes(42))
        .await
        .unwrap();
    let report = monitor.latest_report("US30").unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    assert_eq!(json["instrument"], "US30");
    assert_eq!(json["outcomes"][0]["result"]["status"], "confirmed");
    assert_eq!(json["outcomes"][0]["result"]["diagnostics"]["type"], "accumulation");
    assert_eq!(json["alerts"].as_array().unwrap().len(), 1);
}
