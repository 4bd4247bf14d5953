//! Application-level errors surfaced to the UI layer
//!
//! Fatal and user-visible failures are turned into an [`AppError`] and pushed
//! on an [`ErrorSink`]. Protocol noise (malformed lines, unexpected
//! transitions) never reaches this channel; it is only logged.

use crate::handoff::HandoffError;
use crate::invitation::InvitationError;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;

/// Numeric codes carried by [`AppError`]
pub mod codes {
    /// Agent initialization or session handoff failed
    pub const AGENT_INITIALIZATION_FAILED: u16 = 1045;
    pub const TRANSPORT_UNAVAILABLE: u16 = 2001;
    pub const INVITATION_CREATION_FAILED: u16 = 2002;
    pub const INVITATION_ACCEPTANCE_FAILED: u16 = 2003;
    pub const CHANNEL_CONFIGURATION_FAILED: u16 = 2004;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{code}] {title}: {message} ({cause})")]
pub struct AppError {
    pub title: String,
    pub message: String,
    /// Display form of the underlying error
    pub cause: String,
    pub code: u16,
}

impl AppError {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<String>,
        code: u16,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            cause: cause.into(),
            code,
        }
    }

    pub fn agent_initialization(cause: &HandoffError) -> Self {
        Self::new(
            "Agent initialization failed",
            "The connection could not be handed to a new agent.",
            cause.to_string(),
            codes::AGENT_INITIALIZATION_FAILED,
        )
    }

    pub fn transport_unavailable(cause: &TransportError) -> Self {
        Self::new(
            "Bluetooth unavailable",
            "Turn on Bluetooth and try again.",
            cause.to_string(),
            codes::TRANSPORT_UNAVAILABLE,
        )
    }

    pub fn invitation_creation(cause: &InvitationError) -> Self {
        Self::new(
            "Invitation failed",
            "An invitation could not be created for the connected device.",
            cause.to_string(),
            codes::INVITATION_CREATION_FAILED,
        )
    }

    pub fn invitation_acceptance(cause: &InvitationError) -> Self {
        Self::new(
            "Invitation failed",
            "The invitation received over Bluetooth could not be accepted.",
            cause.to_string(),
            codes::INVITATION_ACCEPTANCE_FAILED,
        )
    }

    pub fn channel_configuration(cause: &TransportError) -> Self {
        Self::new(
            "Bluetooth setup failed",
            "The Bluetooth service could not be registered.",
            cause.to_string(),
            codes::CHANNEL_CONFIGURATION_FAILED,
        )
    }
}

pub type ErrorSink = mpsc::UnboundedSender<AppError>;

pub fn error_channel() -> (ErrorSink, mpsc::UnboundedReceiver<AppError>) {
    mpsc::unbounded_channel()
}

/// Log and deliver an application error. A closed sink only loses the copy.
pub fn report(sink: &ErrorSink, app_error: AppError) {
    error!("{}", app_error);
    let _ = sink.send(app_error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let handoff = HandoffError::AgentNotInitialized("wallet locked".into());
        assert_eq!(AppError::agent_initialization(&handoff).code, 1045);

        let transport = TransportError::TransportUnavailable("powered off".into());
        assert_eq!(AppError::transport_unavailable(&transport).code, 2001);
        assert_eq!(AppError::channel_configuration(&transport).code, 2004);

        let invitation = InvitationError::CreationFailed("offline".into());
        assert_eq!(AppError::invitation_creation(&invitation).code, 2002);
        assert_eq!(AppError::invitation_acceptance(&invitation).code, 2003);
    }

    #[test]
    fn test_cause_carries_underlying_error() {
        let app_error = AppError::transport_unavailable(&TransportError::TransportUnavailable(
            "powered off".into(),
        ));
        assert_eq!(app_error.cause, "Transport unavailable: powered off");
        assert!(app_error.to_string().starts_with("[2001] Bluetooth unavailable"));
    }

    #[test]
    fn test_report_delivers() {
        let (sink, mut errors) = error_channel();
        report(&sink, AppError::new("t", "m", "c", 1));
        assert_eq!(errors.try_recv().expect("delivered").code, 1);
    }

    #[test]
    fn test_report_on_closed_sink() {
        let (sink, errors) = error_channel();
        drop(errors);
        report(&sink, AppError::new("t", "m", "c", 1));
    }
}
