// src/notifications/mod.rs
pub mod csv_journal;
pub mod notification_manager;

pub use csv_journal::CsvAlertJournal;
pub use notification_manager::{
    AlertDispatcher, AlertSink, ChannelAlertSink, DispatchSummary, LogAlertSink,
};
