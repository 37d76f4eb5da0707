use serde::{Deserialize, Serialize};

use crate::EventSource;
use paygen_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Stable error code, when the error has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod download;
pub mod payload;
pub mod platform;
pub mod signing;

pub use download::*;
pub use payload::*;
pub use platform::*;
pub use signing::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Cache lookups and object transfers
    Download(DownloadEvent),

    /// Payload run stages
    Payload(PayloadEvent),

    /// Hash signing requests and results
    Signing(SigningEvent),

    /// External process execution
    Platform(PlatformEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::Download(_) => EventSource::DOWNLOAD,
            Self::Payload(_) => EventSource::PAYLOAD,
            Self::Signing(_) => EventSource::SIGNING,
            Self::Platform(_) => EventSource::PLATFORM,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::Download(DownloadEvent::Failed { .. })
            | Self::Payload(PayloadEvent::Failed { .. })
            | Self::Signing(SigningEvent::Rejected { .. })
            | Self::Platform(PlatformEvent::ProcessFailed { .. }) => Level::ERROR,

            Self::Download(
                DownloadEvent::CacheHit { .. }
                | DownloadEvent::CacheMiss { .. }
                | DownloadEvent::Joined { .. }
                | DownloadEvent::Evicted { .. },
            )
            | Self::Signing(SigningEvent::Polling { .. })
            | Self::Platform(PlatformEvent::ProcessStarted { .. }) => Level::DEBUG,

            Self::Platform(PlatformEvent::ProcessCompleted { .. }) => Level::TRACE,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::Download(_) => "paygen::events::download",
            Self::Payload(_) => "paygen::events::payload",
            Self::Signing(_) => "paygen::events::signing",
            Self::Platform(_) => "paygen::events::platform",
        }
    }
}
