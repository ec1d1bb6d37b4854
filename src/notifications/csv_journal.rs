// src/notifications/csv_journal.rs
// Daily CSV journal of every fired alert.

use super::notification_manager::AlertSink;
use crate::errors::SinkError;
use crate::zone_lifecycle::AlertEvent;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Serialize)]
struct AlertRow<'a> {
    fired_at: String,
    instrument: &'a str,
    detector: &'a str,
    kind: &'a str,
    zone_id: &'a str,
    start: String,
    end: String,
    bottom: f64,
    top: f64,
    is_primary: bool,
    message: String,
}

impl<'a> AlertRow<'a> {
    fn from_event(event: &'a AlertEvent) -> Self {
        Self {
            fired_at: event.fired_at.to_rfc3339(),
            instrument: &event.instrument,
            detector: event.detector.as_str(),
            kind: event.zone.kind.as_str(),
            zone_id: &event.zone_id,
            start: event.zone.start.to_rfc3339(),
            end: event.zone.end.to_rfc3339(),
            bottom: event.zone.bottom,
            top: event.zone.top,
            is_primary: event.zone.is_primary,
            message: event.render(),
        }
    }
}

#[derive(Debug)]
pub struct CsvAlertJournal {
    logs_dir: PathBuf,
    // Files whose header has already been written by this process. Held for
    // the whole header check and write so concurrent deliveries append in turn.
    initialized: Mutex<HashSet<PathBuf>>,
}

impl CsvAlertJournal {
    pub fn new<P: AsRef<Path>>(logs_dir: P) -> Self {
        Self {
            logs_dir: logs_dir.as_ref().to_path_buf(),
            initialized: Mutex::new(HashSet::new()),
        }
    }

    /// `alerts_YYYY-MM-DD.csv`, dated by the alert's fire time.
    pub fn filename_for(&self, event: &AlertEvent) -> PathBuf {
        self.logs_dir
            .join(format!("alerts_{}.csv", event.fired_at.format("%Y-%m-%d")))
    }

    async fn needs_header(initialized: &HashSet<PathBuf>, path: &Path) -> bool {
        if initialized.contains(path) {
            return false;
        }
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len() == 0,
            Err(_) => true,
        }
    }

    async fn append(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let mut initialized = self.initialized.lock().await;

        if !self.logs_dir.exists() {
            tokio::fs::create_dir_all(&self.logs_dir).await?;
            info!("📁 Created alert journal directory: {}", self.logs_dir.display());
        }

        let path = self.filename_for(event);
        let with_header = Self::needs_header(&initialized, &path).await;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .from_writer(Vec::new());
        writer.serialize(AlertRow::from_event(event))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| SinkError::Delivery {
                sink: "csv_journal",
                message: e.to_string(),
            })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        initialized.insert(path);
        Ok(())
    }
}

impl AlertSink for CsvAlertJournal {
    fn name(&self) -> &'static str {
        "csv_journal"
    }

    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(self.append(event))
    }
}
