//! Connectivity layer consumed by connection endpoints
//!
//! A [`PeerTransport`] generates session descriptions, gathers and applies
//! connectivity candidates and moves media for the tracks attached to it.
//! Endpoints never talk to a concrete transport; they are handed one by a
//! [`TransportConnector`] when they are created.

use crate::config::EndpointConfig;
use crate::endpoint::Sender;
use crate::error::CallResult;
use crate::event::EventSender;
use crate::negotiation::{IceCandidate, SessionDescription};
use crate::track::MediaTrack;
use crate::types::Role;
use async_trait::async_trait;
use std::sync::Arc;

pub mod loopback;

pub use loopback::{LoopbackNetwork, LoopbackTransport};

/// Transport primitives behind one connection endpoint
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Generate an offer describing the attached tracks
    async fn create_offer(&self) -> CallResult<SessionDescription>;

    /// Generate an answer to the applied remote offer
    async fn create_answer(&self) -> CallResult<SessionDescription>;

    /// Apply a local description; candidate gathering starts afterwards
    async fn set_local_description(&self, description: &SessionDescription) -> CallResult<()>;

    /// Apply the peer's description; inbound tracks are announced afterwards
    async fn set_remote_description(&self, description: &SessionDescription) -> CallResult<()>;

    /// Apply one of the peer's connectivity candidates
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> CallResult<()>;

    /// Start transmitting `track` through a new sender
    fn attach_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()>;

    /// Transmit `track` through an existing sender
    fn replace_track(&self, sender: &Sender, track: &MediaTrack) -> CallResult<()>;

    /// Stop transmitting through `sender`
    fn detach_track(&self, sender: &Sender) -> CallResult<()>;

    /// Release the transport
    fn close(&self);
}

/// Creates transports for endpoints
pub trait TransportConnector: Send + Sync {
    /// Create the transport for `role`, reporting events through `events`
    fn connect(
        &self,
        role: Role,
        config: &EndpointConfig,
        events: EventSender,
    ) -> CallResult<Arc<dyn PeerTransport>>;
}
