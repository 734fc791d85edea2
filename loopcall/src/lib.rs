//! # loopcall - Two-Party Calls Inside One Process
//!
//! loopcall wires a caller and a callee endpoint together in the same process:
//! it captures one audio and one video track per role, negotiates the session
//! with an offer/answer exchange, relays connectivity candidates between the
//! endpoints and lets either role switch capture devices mid-call without
//! renegotiating.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loopcall::{DeviceSelection, LoopCall, Role, TrackKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loopcall = LoopCall::init()?;
//!     let call = loopcall.call().build().await?;
//!
//!     // Discover capture devices
//!     let devices = call.enumerate_devices().await?;
//!     println!("{} devices", devices.len());
//!
//!     // Capture for both roles, then negotiate
//!     let (caller, callee) = call
//!         .setup_streams(
//!             &DeviceSelection::new().camera("cam-1").microphone("mic-1"),
//!             &DeviceSelection::new().camera("cam-2").microphone("mic-2"),
//!         )
//!         .await;
//!     caller?;
//!     callee?;
//!     call.negotiate().await?;
//!
//!     // Swap the caller's camera
//!     call.switch_device(Role::Caller, TrackKind::Video, "cam-3").await?;
//!
//!     call.hang_up().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use loopcall_core::{
    CallError, CallResult, ConnectionEndpoint, ConnectionState, Direction, EndpointConfig,
    IceCandidate, IceServer, LoopbackNetwork, MediaTrack, NegotiationState, PeerTransport, Role,
    Sender, SessionDescription, TrackInfo, TrackKind, TransportConnector,
};

pub use loopcall_media::{
    CaptureBackend, CaptureConstraints, DeviceList, MediaDevice, MediaError, StreamSnapshot,
    SyntheticCapture,
};

pub use loopcall_signaling::{NegotiationOutcome, RelayOutcome, SignalingEnvelope, SignalingMessage};

#[cfg(feature = "diagnostics")]
pub use loopcall_diagnostics::{CallReport, DebugLogger, EndpointReport};

// Public API modules
pub mod call;
pub mod config;
pub mod event;
pub mod participant;

// Re-export main API types
pub use call::{Call, CallBuilder};
pub use config::{CallConfig, DeviceSelection};
pub use event::{CallEvent, CallEventStream};
pub use participant::RoleContext;

use std::sync::Arc;

/// Main entry point for loopcall
#[derive(Debug, Clone)]
pub struct LoopCall {
    config: Arc<CallConfig>,
}

impl LoopCall {
    /// Initialize loopcall with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use loopcall::LoopCall;
    ///
    /// let loopcall = LoopCall::init()?;
    /// # Ok::<(), loopcall::CallError>(())
    /// ```
    pub fn init() -> CallResult<Self> {
        Self::init_with(CallConfig::default())
    }

    /// Initialize with custom configuration
    pub fn init_with(config: CallConfig) -> CallResult<Self> {
        config.validate()?;

        #[cfg(feature = "diagnostics")]
        if config.debug_logging {
            DebugLogger::init_logging();
        }

        tracing::debug!(
            servers = config.endpoint.ice_servers.len(),
            pool = config.endpoint.ice_candidate_pool_size,
            "loopcall initialized"
        );
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Configuration every call starts from
    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Create a call builder
    ///
    /// # Example
    /// ```rust,no_run
    /// use loopcall::LoopCall;
    ///
    /// # async fn example() -> Result<(), loopcall::CallError> {
    /// let loopcall = LoopCall::init()?;
    /// let call = loopcall.call().build().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn call(&self) -> CallBuilder {
        CallBuilder::new(self.config.as_ref().clone())
    }
}
