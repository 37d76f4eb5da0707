#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in paygen
//!
//! Library crates report what they are doing by emitting typed events over an
//! unbounded channel; the binary decides how to render them. Operational
//! diagnostics still go through `tracing` directly.
//!
//! ## Architecture
//!
//! - **Domain-driven events**: Events grouped by functional domain (Download, Payload, etc.)
//! - **Unified `EventEmitter` trait**: Single, consistent API for all event emissions
//! - **Metadata envelope**: Every event travels with an [`EventMeta`] carrying id, time and level

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, DownloadEvent, FailureContext, PayloadEvent, PayloadStage, PlatformEvent,
    SigningEvent,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// An event together with its emission metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

impl EventMessage {
    #[must_use]
    pub fn new(meta: EventMeta, event: AppEvent) -> Self {
        Self { meta, event }
    }

    /// Wrap an event with metadata derived from its domain and level.
    #[must_use]
    pub fn from_event(event: AppEvent) -> Self {
        let meta = EventMeta::new(event.log_level(), event.event_source());
        Self { meta, event }
    }
}

/// Type alias for the event sender
pub type EventSender = UnboundedSender<EventMessage>;

/// Type alias for the event receiver
pub type EventReceiver = UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout paygen
///
/// This trait provides a single, consistent API for emitting events regardless of
/// whether you have a raw `EventSender` or a struct that contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Correlation id attached to every event from this emitter
    fn correlation_id(&self) -> Option<&str> {
        None
    }

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            let mut message = EventMessage::from_event(event);
            if let Some(id) = self.correlation_id() {
                message.meta = message.meta.with_correlation_id(id);
            }
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(message);
        }
    }

    /// Emit a payload stage started event
    fn emit_stage_started(&self, payload: impl Into<String>, stage: PayloadStage) {
        self.emit(AppEvent::Payload(PayloadEvent::StageStarted {
            payload: payload.into(),
            stage,
        }));
    }

    /// Emit a payload stage completed event
    fn emit_stage_completed(
        &self,
        payload: impl Into<String>,
        stage: PayloadStage,
        duration: std::time::Duration,
    ) {
        self.emit(AppEvent::Payload(PayloadEvent::StageCompleted {
            payload: payload.into(),
            stage,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }));
    }

    /// Emit a payload run failure
    fn emit_payload_failed(
        &self,
        payload: impl Into<String>,
        stage: PayloadStage,
        error: &paygen_errors::Error,
    ) {
        self.emit(AppEvent::Payload(PayloadEvent::Failed {
            payload: payload.into(),
            stage,
            failure: FailureContext::from_error(error),
        }));
    }

    fn emit_cache_hit(&self, uri: impl Into<String>) {
        self.emit(AppEvent::Download(DownloadEvent::CacheHit { uri: uri.into() }));
    }

    fn emit_cache_miss(&self, uri: impl Into<String>) {
        self.emit(AppEvent::Download(DownloadEvent::CacheMiss { uri: uri.into() }));
    }

    fn emit_download_started(&self, uri: impl Into<String>) {
        self.emit(AppEvent::Download(DownloadEvent::Started { uri: uri.into() }));
    }

    fn emit_download_completed(&self, uri: impl Into<String>, size: u64) {
        self.emit(AppEvent::Download(DownloadEvent::Completed {
            uri: uri.into(),
            size,
        }));
    }

    fn emit_download_failed(&self, uri: impl Into<String>, error: &paygen_errors::Error) {
        use paygen_errors::UserFacingError;
        self.emit(AppEvent::Download(DownloadEvent::Failed {
            uri: uri.into(),
            error: error.user_message().into_owned(),
            retryable: error.is_retryable(),
        }));
    }

    fn emit_cache_evicted(&self, key: impl Into<String>, size: u64) {
        self.emit(AppEvent::Download(DownloadEvent::Evicted {
            key: key.into(),
            size,
        }));
    }

    /// Emit a process spawn event
    fn emit_process_started(&self, command: &str, args: &[String], cwd: Option<&std::path::Path>) {
        self.emit(AppEvent::Platform(PlatformEvent::ProcessStarted {
            command: command.to_string(),
            args: args.to_vec(),
            cwd: cwd.map(|p| p.display().to_string()),
        }));
    }

    fn emit_process_completed(
        &self,
        command: &str,
        exit_code: Option<i32>,
        duration: std::time::Duration,
    ) {
        self.emit(AppEvent::Platform(PlatformEvent::ProcessCompleted {
            command: command.to_string(),
            exit_code,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }));
    }

    fn emit_process_failed(
        &self,
        command: &str,
        exit_code: Option<i32>,
        error_message: impl Into<String>,
        duration: std::time::Duration,
    ) {
        self.emit(AppEvent::Platform(PlatformEvent::ProcessFailed {
            command: command.to_string(),
            exit_code,
            error_message: error_message.into(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_events_carry_metadata() {
        let (tx, mut rx) = channel();
        tx.emit_stage_started("payload.bin", PayloadStage::GenerateUnsigned);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.meta.source, EventSource::PAYLOAD);
        assert_eq!(message.meta.level, EventLevel::Info);
        assert!(matches!(
            message.event,
            AppEvent::Payload(PayloadEvent::StageStarted {
                stage: PayloadStage::GenerateUnsigned,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn dropped_receiver_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        tx.emit_cache_miss("gs://bucket/nobody-is-listening.bin");
    }

    #[test]
    fn absent_sender_is_a_no_op() {
        let sender: Option<EventSender> = None;
        sender.emit_cache_hit("gs://bucket/discarded.bin");
    }

    #[tokio::test]
    async fn failure_events_are_error_level() {
        let (tx, mut rx) = channel();
        let error: paygen_errors::Error = paygen_errors::PayloadError::VerificationFailed {
            output: "checker output".into(),
        }
        .into();
        tx.emit_payload_failed("payload.bin", PayloadStage::Verify, &error);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.meta.level, EventLevel::Error);
        let AppEvent::Payload(PayloadEvent::Failed { failure, .. }) = message.event else {
            panic!("unexpected event");
        };
        assert_eq!(failure.code.as_deref(), Some("payload.verification_failed"));
        assert!(!failure.retryable);
    }
}
