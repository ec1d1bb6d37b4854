// src/notifications/notification_manager.rs
use crate::errors::SinkError;
use crate::zone_lifecycle::AlertEvent;
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Receives alert events. Owns its own formatting, transport and retries.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), SinkError>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans each event out to every sink concurrently. Failures are logged and
/// counted, never retried and never propagated.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn dispatch(&self, events: &[AlertEvent]) -> DispatchSummary {
        if events.is_empty() || self.sinks.is_empty() {
            return DispatchSummary::default();
        }

        info!(
            "📢 [ALERTS] Dispatching {} alert(s) to {} sink(s)",
            events.len(),
            self.sinks.len()
        );

        let deliveries = events.iter().flat_map(|event| {
            self.sinks.iter().map(move |sink| async move {
                let result = sink.deliver(event).await;
                (sink.name(), event, result)
            })
        });

        let mut summary = DispatchSummary::default();
        for (sink, event, result) in join_all(deliveries).await {
            match result {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        "❌ [ALERTS] {} failed to deliver {} for {}: {}",
                        sink, event.zone_id, event.instrument, e
                    );
                }
            }
        }
        summary
    }
}

/// Writes each alert to the tracing output.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            info!("🔔 [ALERTS] {} (zone {})", event.render(), event.zone_id);
            Ok(())
        })
    }
}

/// Forwards alerts into a channel for an embedding application.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::Sender<AlertEvent>,
}

impl ChannelAlertSink {
    pub fn new(sender: mpsc::Sender<AlertEvent>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

impl AlertSink for ChannelAlertSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn deliver<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.sender
                .send(event.clone())
                .await
                .map_err(|_| SinkError::Delivery {
                    sink: "channel",
                    message: "receiver dropped".to_string(),
                })
        })
    }
}
