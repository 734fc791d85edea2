//! Capture backend error types
//!
//! Backends report failures as [`MediaError`]. The device catalog and track
//! factory translate them into the call-level taxonomy
//! ([`CallError::CaptureUnavailable`] and [`CallError::DeviceUnavailable`]).

use loopcall_core::{CallError, TrackKind};
use thiserror::Error;

/// Error reported by a capture backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The platform refused access to capture devices
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Device is held by another session
    #[error("Device busy: {device_id}")]
    DeviceBusy {
        /// Device identifier
        device_id: String,
    },

    /// No device of the requested kind exists
    #[error("No {kind} input device available")]
    NoDeviceForKind {
        /// Requested kind
        kind: TrackKind,
    },

    /// Constraints that cannot be satisfied
    #[error("Invalid constraints: {message}")]
    InvalidConstraints {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::DeviceBusy { .. } => true,
            MediaError::DeviceNotFound { .. } => true,
            MediaError::NoDeviceForKind { .. } => true,
            MediaError::PermissionDenied { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceBusy { .. } => ErrorCategory::Device,
            MediaError::NoDeviceForKind { .. } => ErrorCategory::Device,
            MediaError::InvalidConstraints { .. } => ErrorCategory::Configuration,
        }
    }

    /// Translate into the call taxonomy for a failed acquisition
    pub fn into_device_error(self, kind: TrackKind, device_id: Option<&str>) -> CallError {
        CallError::DeviceUnavailable {
            device_id: device_id.unwrap_or("default").to_string(),
            kind,
            reason: self.to_string(),
        }
    }

    /// Translate into the call taxonomy for a failed capability probe
    pub fn into_capture_error(self) -> CallError {
        CallError::CaptureUnavailable {
            reason: self.to_string(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors
    System,
    /// Permission errors
    Permission,
    /// Configuration and parameter errors
    Configuration,
    /// Device and hardware errors
    Device,
}
