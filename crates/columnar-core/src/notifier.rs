//! Lifecycle and batch event notifications.

use crate::context::RequestContext;

/// Events emitted by the storage manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Table creation started.
    TableCreateStart {
        /// Table name.
        table: String,
    },
    /// Table creation finished.
    TableCreateEnd {
        /// Table name.
        table: String,
    },
    /// Table creation failed.
    TableCreateError {
        /// Table name.
        table: String,
        /// Failure description.
        message: String,
    },
    /// Table deletion started.
    TableDeleteStart {
        /// Table name.
        table: String,
    },
    /// Table deletion finished.
    TableDeleteEnd {
        /// Table name.
        table: String,
    },
    /// Table deletion failed.
    TableDeleteError {
        /// Table name.
        table: String,
        /// Failure description.
        message: String,
    },
    /// A write batch started.
    BatchWriteStart {
        /// Number of sub-requests.
        request_count: usize,
    },
    /// A write batch finished.
    BatchWriteEnd {
        /// Number of sub-requests.
        request_count: usize,
        /// Number of sub-requests that failed and were handed back.
        unprocessed_count: usize,
    },
}

/// Sink for manager events.
pub trait Notifier: Send + Sync {
    /// Delivers one event.
    fn notify(&self, context: &RequestContext, event: Event);
}

/// Default notifier: events become structured log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, context: &RequestContext, event: Event) {
        match &event {
            Event::TableCreateError { table, message }
            | Event::TableDeleteError { table, message } => {
                tracing::error!(
                    tenant = %context.tenant,
                    request_id = %context.request_id,
                    table = %table,
                    message = %message,
                    "storage event failed"
                );
            }
            _ => {
                tracing::info!(
                    tenant = %context.tenant,
                    request_id = %context.request_id,
                    event = ?event,
                    "storage event"
                );
            }
        }
    }
}
