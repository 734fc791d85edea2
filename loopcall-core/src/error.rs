//! Error types for loopcall

use crate::negotiation::NegotiationState;
use crate::types::{Role, TrackKind};
use thiserror::Error;

/// Result type alias for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Main error type for loopcall operations
#[derive(Error, Debug)]
pub enum CallError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Invalid or missing configuration
    #[error("Invalid configuration for {field}: {reason}")]
    Configuration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The platform refused the capture capability probe
    #[error("Capture unavailable: {reason}")]
    CaptureUnavailable {
        /// Reason reported by the capture subsystem
        reason: String,
    },

    /// A specific capture device could not be opened
    #[error("{kind} device {device_id} unavailable: {reason}")]
    DeviceUnavailable {
        /// Requested device, or `default` when none was named
        device_id: String,
        /// Kind of track that was requested
        kind: TrackKind,
        /// Reason reported by the capture subsystem
        reason: String,
    },

    /// Replace requested for a kind that has no sender
    #[error("No {kind} sender on the {role} endpoint")]
    SenderNotFound {
        /// Endpoint role
        role: Role,
        /// Kind of the replacement track
        kind: TrackKind,
    },

    /// Offer/answer operation requested outside its legal state
    #[error("{operation} is not allowed on the {role} endpoint in state {state}")]
    Negotiation {
        /// Endpoint role
        role: Role,
        /// Operation that was attempted
        operation: &'static str,
        /// Negotiation state at the time of the attempt
        state: NegotiationState,
    },

    /// Negotiation requested before a role's local stream was complete
    #[error("Local stream of {role} has no {missing} track")]
    IncompleteLocalStream {
        /// Role whose setup is incomplete
        role: Role,
        /// First missing kind
        missing: TrackKind,
    },

    /// Connectivity candidate rejected by the transport
    #[error("Invalid candidate '{candidate}': {reason}")]
    InvalidCandidate {
        /// Candidate line as received
        candidate: String,
        /// Why it was rejected
        reason: String,
    },

    /// Transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Operation attempted after the call was ended
    #[error("Call has ended")]
    CallEnded,
}

impl CallError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CallError::Initialization { .. } => "INITIALIZATION_FAILED",
            CallError::Configuration { .. } => "INVALID_CONFIGURATION",
            CallError::CaptureUnavailable { .. } => "CAPTURE_UNAVAILABLE",
            CallError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            CallError::SenderNotFound { .. } => "SENDER_NOT_FOUND",
            CallError::Negotiation { .. } => "NEGOTIATION_ERROR",
            CallError::IncompleteLocalStream { .. } => "INCOMPLETE_LOCAL_STREAM",
            CallError::InvalidCandidate { .. } => "INVALID_CANDIDATE",
            CallError::Transport { .. } => "TRANSPORT_ERROR",
            CallError::CallEnded => "CALL_ENDED",
        }
    }

    /// Whether the caller can reasonably retry, e.g. with another device
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CallError::DeviceUnavailable { .. }
                | CallError::IncompleteLocalStream { .. }
                | CallError::InvalidCandidate { .. }
        )
    }
}
