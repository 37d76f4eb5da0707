//! Event draining into the log

use paygen_events::{AppEvent, EventMessage, PayloadEvent};
use tracing::Level;

/// Logs every event and keeps a tally of payload outcomes.
#[derive(Debug, Default)]
pub struct EventHandler {
    debug: bool,
    uploaded: usize,
    failed: usize,
}

impl EventHandler {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Self::default()
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, message: EventMessage) {
        match &message.event {
            AppEvent::Payload(PayloadEvent::Uploaded { .. }) => self.uploaded += 1,
            AppEvent::Payload(PayloadEvent::Failed { .. }) => self.failed += 1,
            _ => {}
        }

        let level = message.meta.tracing_level();
        if level > Level::INFO && !self.debug {
            return;
        }

        let target = message.event.log_target();
        let correlation = message.meta.correlation_id.as_deref().unwrap_or("-");
        let event = serde_json::to_string(&message.event)
            .unwrap_or_else(|e| format!("<unserializable event: {e}>"));

        match level {
            Level::ERROR => tracing::error!(target: "paygen::events", source = target, correlation, %event),
            Level::WARN => tracing::warn!(target: "paygen::events", source = target, correlation, %event),
            Level::INFO => tracing::info!(target: "paygen::events", source = target, correlation, %event),
            Level::DEBUG => tracing::debug!(target: "paygen::events", source = target, correlation, %event),
            _ => tracing::trace!(target: "paygen::events", source = target, correlation, %event),
        }
    }

    /// Payloads published so far
    pub fn uploaded(&self) -> usize {
        self.uploaded
    }

    /// Payload runs that failed so far
    pub fn failed(&self) -> usize {
        self.failed
    }
}
