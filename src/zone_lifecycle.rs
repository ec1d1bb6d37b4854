// src/zone_lifecycle.rs
// Per-instrument zone tracking across cycles and at-most-once alert records.

use crate::session::is_weekend_halt;
use crate::types::{DetectorKind, Zone, ZoneKey, ZoneStatus};
use crate::zones::zone_detection::DetectorOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub status: ZoneStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedZone {
    /// Latest geometry as reported by the detector.
    pub zone: Zone,
    /// Forward-only status, independent of the detector's per-cycle label.
    pub status: ZoneStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub history: Vec<StatusChange>,
}

impl TrackedZone {
    fn new(zone: &Zone, now: DateTime<Utc>) -> Self {
        let status = ZoneStatus::Looking.advance(zone.status);
        Self {
            zone: zone.clone(),
            status,
            first_seen: now,
            last_seen: now,
            history: vec![StatusChange { status, at: now }],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AlertRecord {
    pub zone_key: ZoneKey,
    pub fired_at: DateTime<Utc>,
}

/// Handed to the alert sinks when a zone first becomes confirmed.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub instrument: String,
    pub detector: DetectorKind,
    pub zone_id: String,
    pub zone: Zone,
    pub message_template: String,
    pub fired_at: DateTime<Utc>,
}

impl AlertEvent {
    fn new(instrument: &str, zone: &Zone, fired_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            detector: zone.detector,
            zone_id: zone.key().fingerprint(instrument),
            zone: zone.clone(),
            message_template: message_template(zone.detector).to_string(),
            fired_at,
        }
    }

    /// Fills the template placeholders with this event's values.
    pub fn render(&self) -> String {
        self.message_template
            .replace("{instrument}", &self.instrument)
            .replace("{kind}", self.zone.kind.as_str())
            .replace("{top}", &format!("{:.5}", self.zone.top))
            .replace("{bottom}", &format!("{:.5}", self.zone.bottom))
            .replace("{start}", &self.zone.start.format("%Y-%m-%d %H:%M UTC").to_string())
    }
}

pub fn message_template(detector: DetectorKind) -> &'static str {
    match detector {
        DetectorKind::Accumulation => {
            "{instrument}: accumulation breakout confirmed, box {bottom} - {top} since {start}"
        }
        DetectorKind::SupplyDemand => {
            "{instrument}: fresh {kind} zone {bottom} - {top} formed {start}"
        }
        DetectorKind::Fvg => "{instrument}: {kind} {bottom} - {top} at {start}",
    }
}

/// Read-only view of one tracked zone for the debug surface.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSnapshot {
    pub zone_id: String,
    pub key: ZoneKey,
    pub zone: Zone,
    pub status: ZoneStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub alerted_at: Option<DateTime<Utc>>,
    /// Every forward status transition, oldest first.
    pub history: Vec<StatusChange>,
}

/// Lifecycle state owned by a single instrument.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub cycle: u64,
    pub weekend: bool,
    pub entries: HashMap<ZoneKey, TrackedZone>,
    pub alerts: HashMap<ZoneKey, AlertRecord>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, key: &ZoneKey) -> Option<ZoneStatus> {
        self.entries.get(key).map(|e| e.status)
    }

    pub fn has_alerted(&self, key: &ZoneKey) -> bool {
        self.alerts.contains_key(key)
    }

    /// Tracked zones ordered by key. During a weekend halt every status reads
    /// as `weekend`.
    pub fn snapshot(&self, instrument: &str) -> Vec<ZoneSnapshot> {
        let mut keys: Vec<&ZoneKey> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| {
                let entry = self.entries.get(key)?;
                Some(ZoneSnapshot {
                    zone_id: key.fingerprint(instrument),
                    key: *key,
                    zone: entry.zone.clone(),
                    status: if self.weekend {
                        ZoneStatus::Weekend
                    } else {
                        entry.status
                    },
                    first_seen: entry.first_seen,
                    last_seen: entry.last_seen,
                    alerted_at: self.alerts.get(key).map(|r| r.fired_at),
                    history: entry.history.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneLifecycleManager;

impl ZoneLifecycleManager {
    pub fn new() -> Self {
        Self
    }

    /// Folds one cycle of detector outcomes into `state` and returns the
    /// alerts that became due. Failed detectors leave their keys untouched.
    pub fn apply(
        &self,
        state: &mut EngineState,
        instrument: &str,
        outcomes: &[DetectorOutcome],
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        state.cycle += 1;

        // Halt freezes everything: nothing is dropped, nothing fires.
        state.weekend = is_weekend_halt(now);
        if state.weekend {
            debug!(
                "[LIFECYCLE] {} cycle {} in weekend halt, {} zones frozen",
                instrument,
                state.cycle,
                state.entries.len()
            );
            return Vec::new();
        }

        for outcome in outcomes {
            if let Some(error) = &outcome.error {
                debug!(
                    "[LIFECYCLE] {} {} failed ({}), keeping its zones",
                    instrument, outcome.result.detector, error
                );
                continue;
            }
            self.merge_detector(state, instrument, outcome, now);
        }

        let mut due: Vec<ZoneKey> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                entry.status == ZoneStatus::Confirmed && !state.alerts.contains_key(*key)
            })
            .map(|(key, _)| *key)
            .collect();
        due.sort();

        let mut events = Vec::with_capacity(due.len());
        for key in due {
            let Some(entry) = state.entries.get(&key) else {
                continue;
            };
            state.alerts.insert(
                key,
                AlertRecord {
                    zone_key: key,
                    fired_at: now,
                },
            );
            let event = AlertEvent::new(instrument, &entry.zone, now);
            info!(
                "🔔 [LIFECYCLE] {} alert {} for {}",
                instrument, event.zone_id, key
            );
            events.push(event);
        }
        events
    }

    fn merge_detector(
        &self,
        state: &mut EngineState,
        instrument: &str,
        outcome: &DetectorOutcome,
        now: DateTime<Utc>,
    ) {
        let detector = outcome.result.detector;
        let mut reported: HashSet<ZoneKey> = HashSet::new();

        for zone in &outcome.result.zones {
            let key = zone.key();
            reported.insert(key);
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    let next = entry.status.advance(zone.status);
                    if next != entry.status {
                        debug!(
                            "[LIFECYCLE] {} {} {} -> {}",
                            instrument, key, entry.status, next
                        );
                        entry.history.push(StatusChange {
                            status: next,
                            at: now,
                        });
                        entry.status = next;
                    }
                    entry.zone = Zone {
                        status: next,
                        ..zone.clone()
                    };
                    entry.last_seen = now;
                }
                None => {
                    debug!(
                        "[LIFECYCLE] {} tracking {} as {}",
                        instrument, key, zone.status
                    );
                    state.entries.insert(key, TrackedZone::new(zone, now));
                }
            }
        }

        let gone: Vec<ZoneKey> = state
            .entries
            .keys()
            .filter(|key| key.detector == detector && !reported.contains(key))
            .copied()
            .collect();
        for key in gone {
            state.entries.remove(&key);
            let cleared = state.alerts.remove(&key).is_some();
            debug!(
                "[LIFECYCLE] {} {} disappeared{}",
                instrument,
                key,
                if cleared { ", alert record cleared" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZoneKind;
    use crate::zones::patterns::{DetectorResult, Diagnostics};
    use chrono::{Duration, TimeZone};

    fn tuesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn zone(minute: i64, status: ZoneStatus) -> Zone {
        let start = tuesday() - Duration::hours(2) + Duration::minutes(minute);
        Zone {
            detector: DetectorKind::Fvg,
            kind: ZoneKind::BullishGap,
            start,
            end: start + Duration::minutes(10),
            top: 1.2,
            bottom: 1.1,
            status,
            is_primary: true,
        }
    }

    fn outcome(zones: Vec<Zone>) -> DetectorOutcome {
        DetectorOutcome {
            result: DetectorResult {
                detector: DetectorKind::Fvg,
                status: ZoneStatus::Looking,
                zones,
                diagnostics: Diagnostics::None,
            },
            error: None,
        }
    }

    #[test]
    fn test_status_never_regresses() {
        let manager = ZoneLifecycleManager::new();
        let mut state = EngineState::new();
        let z = zone(0, ZoneStatus::Active);
        manager.apply(&mut state, "EURUSD", &[outcome(vec![z.clone()])], tuesday());
        let demoted = zone(0, ZoneStatus::Potential);
        manager.apply(&mut state, "EURUSD", &[outcome(vec![demoted])], tuesday());
        assert_eq!(state.status_of(&z.key()), Some(ZoneStatus::Active));
        assert_eq!(state.cycle, 2);
    }

    #[test]
    fn test_failed_detector_keeps_zones() {
        let manager = ZoneLifecycleManager::new();
        let mut state = EngineState::new();
        let z = zone(0, ZoneStatus::Confirmed);
        let fired = manager.apply(&mut state, "EURUSD", &[outcome(vec![z.clone()])], tuesday());
        assert_eq!(fired.len(), 1);

        let failed = DetectorOutcome {
            result: DetectorResult::looking(DetectorKind::Fvg),
            error: Some("boom".to_string()),
        };
        let fired = manager.apply(&mut state, "EURUSD", &[failed], tuesday());
        assert!(fired.is_empty());
        assert!(state.has_alerted(&z.key()));
        assert_eq!(state.status_of(&z.key()), Some(ZoneStatus::Confirmed));
    }

    #[test]
    fn test_multiple_keys_tracked_independently() {
        let manager = ZoneLifecycleManager::new();
        let mut state = EngineState::new();
        let a = zone(0, ZoneStatus::Confirmed);
        let b = zone(30, ZoneStatus::Confirmed);
        let fired = manager.apply(
            &mut state,
            "EURUSD",
            &[outcome(vec![a.clone(), b.clone()])],
            tuesday(),
        );
        assert_eq!(fired.len(), 2);

        // `a` disappears, `b` stays; only `a` loses its record.
        manager.apply(&mut state, "EURUSD", &[outcome(vec![b.clone()])], tuesday());
        assert!(!state.has_alerted(&a.key()));
        assert!(state.has_alerted(&b.key()));
    }

    #[test]
    fn test_other_detectors_keys_untouched() {
        let manager = ZoneLifecycleManager::new();
        let mut state = EngineState::new();
        let fvg_zone = zone(0, ZoneStatus::Active);
        manager.apply(&mut state, "EURUSD", &[outcome(vec![fvg_zone.clone()])], tuesday());

        let other = DetectorOutcome {
            result: DetectorResult::looking(DetectorKind::SupplyDemand),
            error: None,
        };
        manager.apply(&mut state, "EURUSD", &[other], tuesday());
        assert!(state.status_of(&fvg_zone.key()).is_some());
    }

    #[test]
    fn test_rendered_message_fills_placeholders() {
        let event = AlertEvent::new("EURUSD", &zone(0, ZoneStatus::Confirmed), tuesday());
        let text = event.render();
        assert!(text.starts_with("EURUSD: bullish_gap 1.10000 - 1.20000"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_snapshot_reports_weekend() {
        let manager = ZoneLifecycleManager::new();
        let mut state = EngineState::new();
        manager.apply(&mut state, "EURUSD", &[outcome(vec![zone(0, ZoneStatus::Active)])], tuesday());
        let saturday = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        manager.apply(&mut state, "EURUSD", &[outcome(vec![])], saturday);
        let snapshot = state.snapshot("EURUSD");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, ZoneStatus::Weekend);
    }
}
